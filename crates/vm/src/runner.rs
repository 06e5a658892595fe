//! Defines the [`CairoRunner`] type, responsible for driving a full execution: building
//! the builtin set from the layout, initializing segments and the entry stack, running
//! the step loop, proof-mode padding and accounting, and the final relocation of memory
//! and trace.

use log::debug;
use starknet_types_core::felt::Felt;

use crate::builtin::OUTPUT_BUILTIN_NAME;
use crate::error::{BuiltinError, RunnerError};
use crate::hint::{ExecutionScopes, HintProcessor};
use crate::layout::Layout;
use crate::memory::{Pointer, Value};
use crate::program::Program;
use crate::trace::{relocate_trace, RelocatedTraceEntry};
use crate::CairoVM;

/// Drives the execution of a [`Program`] on a [`CairoVM`].
///
/// A runner goes through the following phases, in order:
///
/// 1. [`initialize`](CairoRunner::initialize): builtin reconciliation against the
///    layout, segment allocation, entry stack setup, validation-rule installation.
/// 2. [`run_until_pc`](CairoRunner::run_until_pc): the step loop.
/// 3. [`end_run`](CairoRunner::end_run): effective sizes and, in proof mode, trace
///    padding to a power of two with cell accounting.
/// 4. [`read_return_values`](CairoRunner::read_return_values) and
///    [`finalize_segments`](CairoRunner::finalize_segments): stop pointers and public
///    memory, for proof output.
/// 5. [`relocate`](CairoRunner::relocate): collapse of the segmented memory and trace
///    into a flat address space.
#[derive(Debug)]
pub struct CairoRunner {
    program: Program,
    layout: Layout,
    /// The virtual machine driven by this runner.
    pub vm: CairoVM,
    proof_mode: bool,
    program_base: Option<Pointer>,
    execution_base: Option<Pointer>,
    initial_pc: Option<Pointer>,
    initial_ap: Option<Pointer>,
    initial_fp: Option<Pointer>,
    final_pc: Option<Pointer>,
    /// The execution-segment offsets exposed as public memory, recorded in proof mode.
    execution_public_memory: Option<Vec<usize>>,
    exec_scopes: ExecutionScopes,
    run_ended: bool,
    segments_finalized: bool,
    relocated_memory: Vec<Option<Felt>>,
    relocated_trace: Vec<RelocatedTraceEntry>,
}

impl CairoRunner {
    /// Creates a new [`CairoRunner`] for the provided program.
    ///
    /// The layout is resolved by name; execution does not start until
    /// [`initialize`](CairoRunner::initialize) and the run loop are invoked.
    pub fn new(program: Program, layout: &str, proof_mode: bool) -> Result<Self, RunnerError> {
        Ok(Self {
            program,
            layout: Layout::from_name(layout)?,
            vm: CairoVM::new(true),
            proof_mode,
            program_base: None,
            execution_base: None,
            initial_pc: None,
            initial_ap: None,
            initial_fp: None,
            final_pc: None,
            execution_public_memory: None,
            exec_scopes: ExecutionScopes::new(),
            run_ended: false,
            segments_finalized: false,
            relocated_memory: Vec::new(),
            relocated_trace: Vec::new(),
        })
    }

    /// Returns whether the runner executes in proof mode.
    pub fn proof_mode(&self) -> bool {
        self.proof_mode
    }

    /// Returns the relocated memory, available after [`relocate`](CairoRunner::relocate).
    pub fn relocated_memory(&self) -> &[Option<Felt>] {
        &self.relocated_memory
    }

    /// Returns the relocated trace, available after [`relocate`](CairoRunner::relocate).
    pub fn relocated_trace(&self) -> &[RelocatedTraceEntry] {
        &self.relocated_trace
    }

    /// Performs the initialization phase and returns the end pointer, the program
    /// counter value upon which execution should stop.
    pub fn initialize(&mut self) -> Result<Pointer, RunnerError> {
        debug!(
            "initializing runner: layout={} proof_mode={}",
            self.layout.name, self.proof_mode
        );

        self.initialize_builtins()?;
        self.initialize_segments();
        let end = self.initialize_main_entrypoint()?;
        self.initialize_vm()?;

        Ok(end)
    }

    /// Builds the builtin runner set from the layout and the program's requests.
    ///
    /// Every builtin the program declares must exist in the layout, in the layout's
    /// order. In proof mode, layout builtins the program did not request are
    /// instantiated as well (excluded from the entry stack) so that their segments
    /// exist.
    fn initialize_builtins(&mut self) -> Result<(), RunnerError> {
        for builtin in &self.program.builtins {
            if !self.layout.builtins.iter().any(|slot| slot.name() == builtin) {
                return Err(RunnerError::BuiltinNotInLayout {
                    builtin: builtin.clone(),
                    layout: self.layout.name,
                });
            }
        }

        // The program's list must follow the layout's ordering.
        let mut program_builtins = self.program.builtins.iter().peekable();
        for slot in &self.layout.builtins {
            if program_builtins.peek().is_some_and(|name| *name == slot.name()) {
                program_builtins.next();
            }
        }
        if program_builtins.next().is_some() {
            return Err(RunnerError::DisorderedBuiltins);
        }

        let mut runners = Vec::new();
        for slot in &self.layout.builtins {
            let included = self.program.builtins.iter().any(|name| name == slot.name());
            if included {
                runners.push(slot.instantiate(true));
            } else if self.proof_mode {
                runners.push(slot.instantiate(false));
            }
        }

        self.vm.builtins = runners;
        Ok(())
    }

    /// Allocates the program segment, the execution segment, and one segment per
    /// builtin runner, in declaration order.
    fn initialize_segments(&mut self) {
        self.program_base = Some(self.vm.segments.add());
        self.execution_base = Some(self.vm.segments.add());

        let CairoVM {
            builtins, segments, ..
        } = &mut self.vm;
        for runner in builtins {
            runner.initialize_segments(segments);
        }
    }

    /// Loads the program data and the entry stack, and records the initial pc.
    fn initialize_state(&mut self, entrypoint: usize, stack: &[Value]) -> Result<(), RunnerError> {
        let program_base = self.program_base.ok_or(RunnerError::UninitializedBase)?;
        let execution_base = self.execution_base.ok_or(RunnerError::UninitializedBase)?;

        self.initial_pc = Some(program_base + entrypoint);

        self.vm.segments.load_data(program_base, &self.program.data)?;
        self.vm.segments.load_data(execution_base, stack)?;

        // The whole program is read by the prover, so its cells never count as holes.
        for offset in 0..self.program.data.len() {
            self.vm.segments.memory.mark_accessed(program_base + offset);
        }

        Ok(())
    }

    /// Initializes an execution from an arbitrary entrypoint, with a caller-provided
    /// stack and return frame, and returns the end pointer.
    pub fn initialize_function_entrypoint(
        &mut self,
        entrypoint: usize,
        mut stack: Vec<Value>,
        return_fp: Value,
    ) -> Result<Pointer, RunnerError> {
        let execution_base = self.execution_base.ok_or(RunnerError::UninitializedBase)?;

        let end = self.vm.segments.add();
        stack.push(return_fp);
        stack.push(end.into());

        let initial_fp = execution_base + stack.len();
        self.initial_fp = Some(initial_fp);
        self.initial_ap = Some(initial_fp);
        self.final_pc = Some(end);

        self.initialize_state(entrypoint, &stack)?;
        Ok(end)
    }

    /// Initializes the execution from the program's entrypoint and returns the end
    /// pointer.
    ///
    /// In normal mode the entrypoint is `main` and the run ends on a fresh "return"
    /// segment. In proof mode the entrypoint is the bootstrapper's start label, the
    /// entry stack is prefixed with the dummy return frame `[execution_base + 2, 0]`,
    /// and those two cells are recorded as public memory.
    pub fn initialize_main_entrypoint(&mut self) -> Result<Pointer, RunnerError> {
        let mut stack = Vec::new();
        for runner in &self.vm.builtins {
            stack.extend(runner.initial_stack());
        }

        if self.proof_mode {
            let program_base = self.program_base.ok_or(RunnerError::UninitializedBase)?;
            let execution_base = self.execution_base.ok_or(RunnerError::UninitializedBase)?;

            let mut full_stack = vec![
                Value::from(execution_base + 2),
                Value::from(Felt::ZERO),
            ];
            full_stack.append(&mut stack);

            self.execution_public_memory = Some((0..full_stack.len()).collect());

            let start = self.program.start.ok_or(RunnerError::NoProgramStart)?;
            let end = self.program.end.ok_or(RunnerError::NoProgramEnd)?;
            self.initialize_state(start, &full_stack)?;

            let initial_fp = execution_base + 2;
            self.initial_fp = Some(initial_fp);
            self.initial_ap = Some(initial_fp);

            return Ok(program_base + end);
        }

        let return_fp = self.vm.segments.add();
        let main = self.program.main.ok_or(RunnerError::MissingMain)?;
        self.initialize_function_entrypoint(main, stack, return_fp.into())
    }

    /// Sets the initial register values, installs the builtin validation rules and
    /// validates the pre-loaded memory.
    fn initialize_vm(&mut self) -> Result<(), RunnerError> {
        self.vm.cpu.pc = self.initial_pc.ok_or(RunnerError::UninitializedBase)?;
        self.vm.cpu.ap = self.initial_ap.ok_or(RunnerError::UninitializedBase)?;
        self.vm.cpu.fp = self.initial_fp.ok_or(RunnerError::UninitializedBase)?;

        let CairoVM {
            builtins, segments, ..
        } = &mut self.vm;
        for runner in builtins.iter() {
            runner.add_validation_rule(&mut segments.memory);
        }

        segments.memory.validate_existing_memory()?;
        Ok(())
    }

    /// Runs the hints registered for the current program counter, if any.
    fn execute_hints(&mut self, hint_processor: &mut dyn HintProcessor) -> Result<(), RunnerError> {
        let Some(program_base) = self.program_base else {
            return Ok(());
        };
        if self.vm.cpu.pc.segment != program_base.segment {
            return Ok(());
        }

        let offset = self.vm.cpu.pc.offset;
        let Some(hints) = self.program.hints.get(&offset) else {
            return Ok(());
        };

        // Hints are opaque payloads; cloning them keeps the processor free to mutate
        // the machine while they are in flight.
        for hint in hints.clone() {
            hint_processor
                .execute_hint(&mut self.vm, &mut self.exec_scopes, &hint)
                .map_err(RunnerError::Vm)?;
        }

        Ok(())
    }

    /// Runs the step loop until the program counter reaches `end`.
    pub fn run_until_pc(
        &mut self,
        end: Pointer,
        hint_processor: &mut dyn HintProcessor,
    ) -> Result<(), RunnerError> {
        debug!("running until pc={end}");

        while self.vm.cpu.pc != end {
            self.execute_hints(hint_processor)?;
            self.vm.step()?;
        }

        debug!("reached end pc after {} steps", self.vm.current_step);
        Ok(())
    }

    /// Runs exactly `steps` steps of the program.
    ///
    /// Reaching the program's final pc with steps still remaining fails with
    /// [`RunnerError::EndOfProgram`], preserving the machine state.
    pub fn run_for_steps(
        &mut self,
        steps: usize,
        hint_processor: &mut dyn HintProcessor,
    ) -> Result<(), RunnerError> {
        for remaining in (1..=steps).rev() {
            if self.final_pc == Some(self.vm.cpu.pc) {
                return Err(RunnerError::EndOfProgram(remaining));
            }

            self.execute_hints(hint_processor)?;
            self.vm.step()?;
        }

        Ok(())
    }

    /// Runs until the step counter reaches `steps`.
    pub fn run_until_steps(
        &mut self,
        steps: usize,
        hint_processor: &mut dyn HintProcessor,
    ) -> Result<(), RunnerError> {
        self.run_for_steps(steps.saturating_sub(self.vm.current_step), hint_processor)
    }

    /// Runs until the step counter reaches the next power of two.
    pub fn run_until_next_power_of_two(
        &mut self,
        hint_processor: &mut dyn HintProcessor,
    ) -> Result<(), RunnerError> {
        self.run_until_steps(self.vm.current_step.next_power_of_two(), hint_processor)
    }

    /// Ends the run: computes effective segment sizes and, in proof mode, pads the
    /// trace to a power of two while verifying the layout's cell accounting.
    ///
    /// The accounting loop is the only consumer of the
    /// `InsufficientAllocatedCells` error family: every occurrence is converted into
    /// one extra step followed by re-padding, until the allocation suffices.
    pub fn end_run(
        &mut self,
        disable_trace_padding: bool,
        hint_processor: &mut dyn HintProcessor,
    ) -> Result<(), RunnerError> {
        if self.run_ended {
            return Err(RunnerError::RunnerCalledTwice);
        }

        self.vm.segments.compute_effective_sizes();

        if self.proof_mode && !disable_trace_padding {
            self.run_until_next_power_of_two(hint_processor)?;

            loop {
                match self.check_used_cells() {
                    Ok(()) => break,
                    Err(RunnerError::Builtin(err)) if err.is_insufficient_allocated_cells() => {
                        debug!("insufficient allocated cells, padding further: {err}");
                        self.run_for_steps(1, hint_processor)?;
                        self.run_until_next_power_of_two(hint_processor)?;
                        self.vm.segments.compute_effective_sizes();
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.run_ended = true;
        Ok(())
    }

    /// Verifies that the layout allocated enough cells for the executed step count.
    fn check_used_cells(&self) -> Result<(), RunnerError> {
        for runner in &self.vm.builtins {
            runner.get_used_cells_and_allocated_sizes(&self.vm.segments, self.vm.current_step)?;
        }

        self.check_range_check_usage()?;
        self.check_memory_usage()?;
        self.check_diluted_check_usage()?;

        Ok(())
    }

    /// Verifies that the unused memory units can absorb the run's memory holes.
    fn check_memory_usage(&self) -> Result<(), RunnerError> {
        let mut builtin_memory_units = 0;
        for runner in &self.vm.builtins {
            builtin_memory_units +=
                runner.get_allocated_memory_units(&self.vm.segments, self.vm.current_step)?;
        }

        let total = self.layout.memory_units_per_step * self.vm.current_step;
        let public = total / self.layout.public_memory_fraction;
        if total % self.layout.public_memory_fraction != 0 {
            return Err(RunnerError::MemoryUsageNotDivisible {
                total,
                fraction: self.layout.public_memory_fraction,
            });
        }

        // Each step's instruction occupies four memory units.
        let instruction_memory_units = 4 * self.vm.current_step;

        let holes = self
            .vm
            .segments
            .get_memory_holes(2, self.vm.builtins.len())?;

        let unused = total
            .checked_sub(public + instruction_memory_units + builtin_memory_units)
            .unwrap_or(0);
        if unused < holes {
            return Err(RunnerError::Builtin(
                BuiltinError::InsufficientAllocatedCells {
                    have: unused,
                    needed: holes,
                },
            ));
        }

        Ok(())
    }

    /// Verifies that the layout's range-check units cover the observed 16-bit parts.
    fn check_range_check_usage(&self) -> Result<(), RunnerError> {
        let mut usage = None;
        for runner in &self.vm.builtins {
            if let Some((min, max)) = runner.get_range_check_usage(&self.vm.segments.memory) {
                usage = Some(match usage {
                    None => (min, max),
                    Some((lo, hi)) => (min.min(lo), max.max(hi)),
                });
            }
        }

        let Some((mut rc_min, mut rc_max)) = usage else {
            return Ok(());
        };

        // The offsets decoded by the executor are range-checked as well.
        if let Some((vm_min, vm_max)) = self.vm.rc_limits {
            rc_min = rc_min.min(vm_min as usize);
            rc_max = rc_max.max(vm_max as usize);
        }

        let mut used_by_builtins = 0;
        for runner in &self.vm.builtins {
            used_by_builtins +=
                runner.get_used_perm_range_check_limits(&self.vm.segments, self.vm.current_step)?;
        }

        let unused = ((self.layout.rc_units - 3) * self.vm.current_step)
            .checked_sub(used_by_builtins)
            .unwrap_or(0);
        if unused < rc_max - rc_min {
            return Err(RunnerError::Builtin(
                BuiltinError::InsufficientAllocatedCells {
                    have: unused,
                    needed: rc_max - rc_min,
                },
            ));
        }

        Ok(())
    }

    /// Verifies that the layout's diluted pool covers the builtins' diluted usage.
    fn check_diluted_check_usage(&self) -> Result<(), RunnerError> {
        let Some(pool) = self.layout.diluted_pool else {
            return Ok(());
        };

        let mut used_by_builtins = 0;
        for runner in &self.vm.builtins {
            let units = runner.get_used_diluted_check_units(pool.spacing, pool.n_bits);
            let ratio = runner.ratio().max(1);
            if self.vm.current_step % ratio != 0 {
                return Err(RunnerError::Builtin(BuiltinError::StepsNotDivisibleByRatio {
                    builtin: runner.name(),
                    steps: self.vm.current_step,
                    ratio,
                }));
            }
            used_by_builtins += units * (self.vm.current_step / ratio);
        }

        let diluted_units = pool.units_per_step * self.vm.current_step;
        let unused = diluted_units.checked_sub(used_by_builtins).unwrap_or(0);

        let upper_bound = 1usize << pool.n_bits;
        if unused < upper_bound {
            return Err(RunnerError::Builtin(
                BuiltinError::InsufficientAllocatedCells {
                    have: unused,
                    needed: upper_bound,
                },
            ));
        }

        Ok(())
    }

    /// Consumes the builtins' stop pointers from the return stack, walking the runners
    /// in reverse declaration order.
    ///
    /// In proof mode, the return values left between the last stop pointer and `ap`
    /// are appended to the execution public memory.
    pub fn read_return_values(&mut self) -> Result<(), RunnerError> {
        if !self.run_ended {
            return Err(RunnerError::ReadReturnValuesBeforeEndRun);
        }
        if self.segments_finalized {
            return Err(RunnerError::ReadReturnValuesAfterFinalize);
        }

        let CairoVM {
            builtins,
            segments,
            cpu,
            ..
        } = &mut self.vm;

        let mut pointer = cpu.ap;
        for runner in builtins.iter_mut().rev() {
            pointer = runner.final_stack(segments, pointer)?;
        }

        if self.proof_mode {
            let execution_base = self.execution_base.ok_or(RunnerError::UninitializedBase)?;
            let begin = pointer.offset - execution_base.offset;
            let end = cpu.ap.offset - execution_base.offset;

            self.execution_public_memory
                .as_mut()
                .ok_or(RunnerError::NoExecutionPublicMemory)?
                .extend(begin..end);
        }

        Ok(())
    }

    /// Finalizes the segments for proof output.
    ///
    /// The program segment's public memory covers the whole bytecode, the execution
    /// segment's covers the recorded prefix (and return values), and the output
    /// segment's covers every cell written to it.
    pub fn finalize_segments(&mut self) -> Result<(), RunnerError> {
        if self.segments_finalized {
            return Ok(());
        }
        if !self.run_ended {
            return Err(RunnerError::FinalizeBeforeEndRun);
        }

        let program_base = self.program_base.ok_or(RunnerError::UninitializedBase)?;
        let execution_base = self.execution_base.ok_or(RunnerError::UninitializedBase)?;

        let program_size = self.program.data.len();
        let program_public: Vec<usize> = (0..program_size).collect();
        self.vm.segments.finalize(
            program_base.segment as usize,
            Some(program_size),
            Some(program_public.as_slice()),
        );

        let execution_public: Vec<usize> = self
            .execution_public_memory
            .as_ref()
            .ok_or(RunnerError::NoExecutionPublicMemory)?
            .iter()
            .map(|offset| offset + execution_base.offset)
            .collect();
        self.vm.segments.finalize(
            execution_base.segment as usize,
            None,
            Some(execution_public.as_slice()),
        );

        let CairoVM {
            builtins,
            segments,
            current_step,
            ..
        } = &mut self.vm;
        for runner in builtins.iter() {
            let (_, size) = runner.get_used_cells_and_allocated_sizes(segments, *current_step)?;

            let base = runner.base().segment as usize;
            if runner.name() == OUTPUT_BUILTIN_NAME {
                let public: Vec<usize> = (0..size).collect();
                segments.finalize(base, Some(size), Some(public.as_slice()));
            } else {
                segments.finalize(base, Some(size), None);
            }
        }

        self.segments_finalized = true;
        Ok(())
    }

    /// Collapses the segmented memory and the trace into a flat address space.
    pub fn relocate(&mut self) -> Result<(), RunnerError> {
        self.vm.segments.compute_effective_sizes();
        let bases = self.vm.segments.relocate_segments()?;

        self.relocated_memory = self.vm.segments.relocate_memory(&bases)?;
        self.relocated_trace = relocate_trace(&self.vm.trace, &bases)?;

        debug!(
            "relocated {} memory cells and {} trace entries",
            self.relocated_memory.iter().flatten().count(),
            self.relocated_trace.len()
        );

        Ok(())
    }

    /// Returns the contents of the output builtin's segment, in order.
    pub fn output(&self) -> Vec<Felt> {
        let Some(runner) = self
            .vm
            .builtins
            .iter()
            .find(|runner| runner.name() == OUTPUT_BUILTIN_NAME)
        else {
            return Vec::new();
        };

        let Some(segment) = self.vm.segments.memory.segment(runner.base().segment) else {
            return Vec::new();
        };

        segment
            .iter_known()
            .filter_map(|(_, value)| value.scalar().copied())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::hint::NoopHintProcessor;

    use super::*;

    fn program(data: &[u64], builtins: &[&str], main: usize) -> Program {
        Program::new(
            data.iter().map(|word| Value::from(*word)).collect(),
            builtins.iter().map(|name| name.to_string()).collect(),
            Some(main),
        )
    }

    #[test]
    fn builtin_not_in_layout_is_rejected() {
        let program = program(&[], &["bitwise"], 0);
        let mut runner = CairoRunner::new(program, "small", false).unwrap();
        assert!(matches!(
            runner.initialize(),
            Err(RunnerError::BuiltinNotInLayout { .. })
        ));
    }

    #[test]
    fn disordered_builtins_are_rejected() {
        let program = program(&[], &["pedersen", "output"], 0);
        let mut runner = CairoRunner::new(program, "small", false).unwrap();
        assert!(matches!(
            runner.initialize(),
            Err(RunnerError::DisorderedBuiltins)
        ));
    }

    #[test]
    fn missing_main_is_rejected() {
        let program = Program::new(Vec::new(), Vec::new(), None);
        let mut runner = CairoRunner::new(program, "plain", false).unwrap();
        assert!(matches!(runner.initialize(), Err(RunnerError::MissingMain)));
    }

    #[test]
    fn initialization_lays_out_the_entry_frame() {
        // [ap] = 2; ap++  followed by  ret
        let program = program(&[0x480680017fff8000, 2, 0x208b7fff7fff7ffe], &[], 0);
        let mut runner = CairoRunner::new(program, "plain", false).unwrap();
        let end = runner.initialize().unwrap();

        // Segments: program, execution, return fp, end.
        assert_eq!(runner.vm.segments.num_segments(), 4);
        assert_eq!(runner.vm.cpu().pc, Pointer::new(0, 0));
        // The entry stack is [return_fp, end], so fp = ap = execution_base + 2.
        assert_eq!(runner.vm.cpu().ap, Pointer::new(1, 2));
        assert_eq!(runner.vm.cpu().fp, Pointer::new(1, 2));
        assert_eq!(end, Pointer::new(3, 0));
        // The end pointer sits on top of the stack.
        assert_eq!(
            runner.vm.segments().memory.get(Pointer::new(1, 1)),
            Some(&Value::from(end))
        );
    }

    #[test]
    fn add_immediate_program_runs_to_completion() {
        // [ap] = 2; ap++  followed by  ret
        let program = program(&[0x480680017fff8000, 2, 0x208b7fff7fff7ffe], &[], 0);
        let mut runner = CairoRunner::new(program, "plain", false).unwrap();
        let end = runner.initialize().unwrap();

        let mut hints = NoopHintProcessor;
        runner.run_until_pc(end, &mut hints).unwrap();

        // After the assert-eq step, [ap] holds the immediate and ap has advanced.
        assert_eq!(
            runner.vm.segments().memory.get(Pointer::new(1, 2)),
            Some(&Value::from(2u64))
        );
        // Two steps: the assignment and the return.
        assert_eq!(runner.vm.current_step(), 2);
        assert_eq!(runner.vm.trace().len(), 2);
    }

    #[test]
    fn end_run_twice_is_rejected() {
        let program = program(&[0x480680017fff8000, 2, 0x208b7fff7fff7ffe], &[], 0);
        let mut runner = CairoRunner::new(program, "plain", false).unwrap();
        let end = runner.initialize().unwrap();

        let mut hints = NoopHintProcessor;
        runner.run_until_pc(end, &mut hints).unwrap();
        runner.end_run(false, &mut hints).unwrap();
        assert!(matches!(
            runner.end_run(false, &mut hints),
            Err(RunnerError::RunnerCalledTwice)
        ));
    }

    #[test]
    fn bounded_run_reports_the_end_of_the_program() {
        let program = program(&[0x480680017fff8000, 2, 0x208b7fff7fff7ffe], &[], 0);
        let mut runner = CairoRunner::new(program, "plain", false).unwrap();
        let _end = runner.initialize().unwrap();

        let mut hints = NoopHintProcessor;
        // The program is two steps long; asking for more hits the final pc.
        assert!(matches!(
            runner.run_for_steps(5, &mut hints),
            Err(RunnerError::EndOfProgram(3))
        ));
    }
}
