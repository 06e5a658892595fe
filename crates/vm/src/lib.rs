//! # Zygarde
//!
//! A provable Cairo virtual machine implementation.
//!
//! # Documentation
//!
//! - [The Cairo Whitepaper](https://www.cairo-lang.org/cairo-whitepaper/).
//!
//! # Field
//!
//! Technically, the Cairo language allows any prime field to be used as the underlying
//! field for the virtual machine. However, in practice, the only field that this crate is
//! meant to be used with is the Starknet field element [`Felt`]. For this reason, it is
//! not possible to change the underlying field of the virtual machine.
//!
//! # Components
//!
//! The [`CairoVM`] holds the full state of one execution: the [`Cpu`] register file, the
//! segmented [`Memory`](memory::Memory) behind a
//! [`SegmentManager`](memory::SegmentManager), the [builtin runners](builtin) attached to
//! their segments, and the [trace](trace) of executed steps. The
//! [`CairoRunner`](runner::CairoRunner) drives a full execution: initialization, the run
//! loop, proof-mode padding, and the final relocation into a flat address space.

#![warn(missing_docs, missing_debug_implementations)]

use bitflags::bitflags;
use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;

use builtin::BuiltinRunner;
use cpu::Cpu;
use error::{Error, MemoryError};
use instr::{ApUpdate, FpUpdate, Instruction, OpCode, Op1Source, PcUpdate, ResultLogic};
use memory::{Memory, Pointer, SegmentManager, Value};
use trace::TraceEntry;

pub mod builtin;
pub mod cpu;
pub mod error;
pub mod hint;
pub mod instr;
pub mod layout;
pub mod memory;
pub mod output;
pub mod program;
pub mod runner;
pub mod trace;

/// Contains the full state of a Cairo virtual machine.
///
/// This includes memory, registers, builtins, the execution trace and related statistics.
/// It can be used to execute a Cairo program one [`step`](CairoVM::step) at a time; the
/// [`CairoRunner`](runner::CairoRunner) wraps it with program loading, layout handling
/// and finalization.
#[derive(Debug)]
pub struct CairoVM {
    /// The register file of the virtual machine.
    pub(crate) cpu: Cpu,
    /// The segmented memory of the virtual machine, behind its manager.
    pub(crate) segments: SegmentManager,
    /// The builtin runners attached to the virtual machine, in program declaration
    /// order.
    pub(crate) builtins: Vec<Box<dyn BuiltinRunner>>,
    /// The trace of executed steps, appended to before every register update.
    pub(crate) trace: Vec<TraceEntry>,
    /// The number of steps executed so far.
    pub(crate) current_step: usize,
    /// The smallest and largest biased offsets decoded so far.
    ///
    /// These watermarks participate in proof-mode range-check accounting.
    pub(crate) rc_limits: Option<(u16, u16)>,
    /// Whether trace entries are collected.
    trace_enabled: bool,
}

impl CairoVM {
    /// Creates a new [`CairoVM`] with an empty memory and no builtin runner.
    pub fn new(trace_enabled: bool) -> Self {
        Self {
            cpu: Cpu::default(),
            segments: SegmentManager::new(),
            builtins: Vec::new(),
            trace: Vec::new(),
            current_step: 0,
            rc_limits: None,
            trace_enabled,
        }
    }

    /// Returns the current state of the [`Cpu`].
    #[inline(always)]
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Returns the [`SegmentManager`] of the virtual machine.
    #[inline(always)]
    pub fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    /// Returns a mutable reference to the [`SegmentManager`] of the virtual machine.
    #[inline(always)]
    pub fn segments_mut(&mut self) -> &mut SegmentManager {
        &mut self.segments
    }

    /// Returns the builtin runners attached to the virtual machine.
    #[inline(always)]
    pub fn builtin_runners(&self) -> &[Box<dyn BuiltinRunner>] {
        &self.builtins
    }

    /// Returns the trace entries recorded so far.
    #[inline(always)]
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Returns the number of steps executed so far.
    #[inline(always)]
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Advances the virtual machine by a single step.
    ///
    /// A step fetches the instruction referenced by the program counter, decodes it,
    /// materializes its three operands (consulting memory, builtin deduction and
    /// algebraic deduction, in that order), verifies the opcode assertions, appends a
    /// trace entry and updates the registers.
    pub fn step(&mut self) -> Result<(), Error> {
        let instruction = fetch_instruction(&self.cpu, &self.segments.memory)?;
        self.watch_rc_limits(&instruction);

        let mut ctx = StepContext::initial(instruction);
        compute_dst(&mut ctx, &self.cpu, &self.segments.memory)?;
        compute_op0(&mut ctx, &self.cpu, &self.segments.memory)?;
        compute_op1(&mut ctx, &self.cpu, &self.segments.memory)?;
        run_builtins(&mut ctx, &mut self.builtins, &mut self.segments.memory)?;
        deduce_from_op_code(&mut ctx, &self.cpu)?;
        compute_res(&mut ctx)?;
        deduce_dst(&mut ctx, &self.cpu)?;
        write_back_deduced(&ctx, &mut self.segments.memory)?;
        run_assertions(&ctx, &self.cpu)?;

        if self.trace_enabled {
            self.trace.push(TraceEntry {
                pc: self.cpu.pc,
                ap: self.cpu.ap,
                fp: self.cpu.fp,
            });
        }

        self.segments.memory.mark_accessed(self.cpu.pc);
        self.segments.memory.mark_accessed(ctx.dst_addr);
        self.segments.memory.mark_accessed(ctx.op0_addr);
        self.segments.memory.mark_accessed(ctx.op1_addr);

        compute_register_updates(&mut ctx, &self.cpu)?;
        self.cpu.pc = ctx.next_pc;
        self.cpu.ap = ctx.next_ap;
        self.cpu.fp = ctx.next_fp;

        self.current_step += 1;

        Ok(())
    }

    /// Folds the biased offsets of the provided instruction into the range-check
    /// watermarks.
    fn watch_rc_limits(&mut self, instruction: &Instruction) {
        let biased = [instruction.off0, instruction.off1, instruction.off2]
            .map(|off| (off as i32 + (1 << 15)) as u16);
        let lo = biased.into_iter().min().unwrap_or(0);
        let hi = biased.into_iter().max().unwrap_or(0);

        self.rc_limits = Some(match self.rc_limits {
            None => (lo, hi),
            Some((min, max)) => (min.min(lo), max.max(hi)),
        });
    }
}

/// Attempts to fetch and decode the instruction referenced by the program counter.
///
/// The referenced cell must hold a field element representable as an unsigned 64-bit
/// integer.
#[inline]
fn fetch_instruction(cpu: &Cpu, memory: &Memory) -> Result<Instruction, Error> {
    let word = memory
        .get(cpu.pc)
        .and_then(Value::scalar)
        .and_then(Felt::to_u64)
        .ok_or(Error::InvalidInstructionEncoding)?;

    Instruction::decode(word)
}

/// Determines the address of the destination of an instruction, and fetches its value if
/// it is already known to memory.
#[inline]
fn compute_dst(ctx: &mut StepContext, cpu: &Cpu, memory: &Memory) -> Result<(), Error> {
    let base = cpu.dst_base(ctx.instruction.dst_register);
    ctx.dst_addr = base
        .checked_add_signed(ctx.instruction.off0 as isize)
        .ok_or(Error::CannotComputeAddress("dst"))?;

    if let Some(value) = memory.get(ctx.dst_addr) {
        ctx.dst = *value;
        ctx.flags.insert(StepContextFlags::DST_ASSERTED);
    }

    Ok(())
}

/// Determines the address of the first operand of an instruction, and fetches its value
/// if it is already known to memory.
#[inline]
fn compute_op0(ctx: &mut StepContext, cpu: &Cpu, memory: &Memory) -> Result<(), Error> {
    let base = cpu.op0_base(ctx.instruction.op0_register);
    ctx.op0_addr = base
        .checked_add_signed(ctx.instruction.off1 as isize)
        .ok_or(Error::CannotComputeAddress("op0"))?;

    if let Some(value) = memory.get(ctx.op0_addr) {
        ctx.op0 = *value;
        ctx.flags.insert(StepContextFlags::OP0_ASSERTED);
    }

    Ok(())
}

/// Determines the address of the second operand of an instruction, and fetches its value
/// if it is already known to memory.
///
/// With an immediate source the offset is pinned to one, and with an [`Op1Source::Op0`]
/// source the base of the operand is the *value* of `op0`, which must then be a pointer.
#[inline]
fn compute_op1(ctx: &mut StepContext, cpu: &Cpu, memory: &Memory) -> Result<(), Error> {
    let off2 = ctx.instruction.off2 as isize;

    ctx.op1_addr = match ctx.instruction.op1_source {
        Op1Source::Op0 => {
            if !ctx.flags.has_op0() {
                return Err(Error::CannotComputeAddress("op1"));
            }
            ctx.op0
                .pointer()
                .ok_or(Error::Op0NotRelocatable)?
                .checked_add_signed(off2)
        }
        Op1Source::Imm => {
            if ctx.instruction.off2 != 1 {
                return Err(Error::CannotComputeAddress("op1"));
            }
            Some(cpu.pc + 1)
        }
        Op1Source::FP => cpu.fp.checked_add_signed(off2),
        Op1Source::AP => cpu.ap.checked_add_signed(off2),
    }
    .ok_or(Error::CannotComputeAddress("op1"))?;

    if let Some(value) = memory.get(ctx.op1_addr) {
        ctx.op1 = *value;
        ctx.flags.insert(StepContextFlags::OP1_ASSERTED);
    }

    Ok(())
}

/// Attempts to deduce the value of a memory cell using the builtin runner owning the
/// segment it belongs to, if any.
///
/// A successful deduction is written back into memory so that the deduced cell becomes
/// part of the execution's witness.
fn deduce_with_builtin(
    addr: Pointer,
    builtins: &mut [Box<dyn BuiltinRunner>],
    memory: &mut Memory,
    result: &mut Value,
) -> Result<bool, Error> {
    let Some(runner) = builtins
        .iter_mut()
        .find(|runner| runner.base().segment == addr.segment)
    else {
        return Ok(false);
    };

    match runner.deduce_memory_cell(addr, memory)? {
        Some(value) => {
            memory.insert(addr, value)?;
            *result = value;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Runs the builtins when applicable to deduce the missing operands of an instruction.
fn run_builtins(
    ctx: &mut StepContext,
    builtins: &mut [Box<dyn BuiltinRunner>],
    memory: &mut Memory,
) -> Result<(), Error> {
    if !ctx.flags.has_op0() && deduce_with_builtin(ctx.op0_addr, builtins, memory, &mut ctx.op0)? {
        ctx.flags.insert(StepContextFlags::OP0_ASSERTED);
    }

    if !ctx.flags.has_op1() && deduce_with_builtin(ctx.op1_addr, builtins, memory, &mut ctx.op1)? {
        ctx.flags.insert(StepContextFlags::OP1_ASSERTED);
    }

    Ok(())
}

/// Attempts to deduce the value of `op1` given a result logic and the values of `op0` and
/// `dst`.
fn deduce_op1_from_op0(
    ctx: &mut StepContext,
    res_logic: ResultLogic,
) -> Result<bool, Error> {
    let dst = ctx.dst;

    match res_logic {
        ResultLogic::Op1 => {
            //    dst = op1
            ctx.op1 = dst;
            ctx.set_res(dst);
            Ok(true)
        }
        ResultLogic::Add => {
            if !ctx.flags.has_op0() {
                return Ok(false);
            }

            //     dst = op0 + op1
            // =>  op1 = dst - op0
            ctx.op1 = dst.subtract(&ctx.op0)?;
            ctx.set_res(dst);
            Ok(true)
        }
        ResultLogic::Mul => {
            // Division is only defined over non-zero scalars.
            let divisible = ctx.flags.has_op0()
                && dst.scalar().is_some()
                && ctx.op0.scalar().is_some_and(|op0| op0 != &Felt::ZERO);
            if !divisible {
                return Ok(false);
            }

            //     dst = op0 * op1
            // =>  op1 = dst / op0
            ctx.op1 = dst.divide(&ctx.op0)?;
            ctx.set_res(dst);
            Ok(true)
        }
        ResultLogic::Unconstrained => Ok(false),
    }
}

/// Attempts to deduce the value of `op0` given a result logic and the values of `op1` and
/// `dst`.
fn deduce_op0_from_op1(
    ctx: &mut StepContext,
    res_logic: ResultLogic,
) -> Result<bool, Error> {
    if !ctx.flags.has_dst() || !ctx.flags.has_op1() {
        return Ok(false);
    }

    let dst = ctx.dst;

    match res_logic {
        ResultLogic::Add => {
            //     dst = op0 + op1
            // =>  op0 = dst - op1
            ctx.op0 = dst.subtract(&ctx.op1)?;
            ctx.set_res(dst);
            Ok(true)
        }
        ResultLogic::Mul => {
            let divisible = dst.scalar().is_some()
                && ctx.op1.scalar().is_some_and(|op1| op1 != &Felt::ZERO);
            if !divisible {
                return Ok(false);
            }

            //     dst = op0 * op1
            // =>  op0 = dst / op1
            ctx.op0 = dst.divide(&ctx.op1)?;
            ctx.set_res(dst);
            Ok(true)
        }
        ResultLogic::Op1 | ResultLogic::Unconstrained => Ok(false),
    }
}

/// Attempts to deduce the missing operands of an instruction from its OP code.
fn deduce_from_op_code(ctx: &mut StepContext, cpu: &Cpu) -> Result<(), Error> {
    match ctx.instruction.op_code {
        OpCode::Call => {
            // When in a `Call` instruction, `op0` holds the return pc, which is known
            // without consulting memory.
            if !ctx.flags.has_op0() {
                ctx.op0 = Value::from(cpu.pc + ctx.instruction.size());
                ctx.flags.insert(StepContextFlags::OP0_DEDUCED);
            }

            // Likewise, `dst` holds the caller's frame pointer.
            if !ctx.flags.has_dst() {
                ctx.dst = Value::from(cpu.fp);
                ctx.flags.insert(StepContextFlags::DST_DEDUCED);
            }
        }
        OpCode::AssertEq => {
            // With this OP code, the result of the instruction is asserted to be equal
            // to `dst`, which lets missing operands be recovered from the known ones.
            let res_logic = ctx.instruction.result_logic;

            if !ctx.flags.has_op0() && deduce_op0_from_op1(ctx, res_logic)? {
                ctx.flags.insert(StepContextFlags::OP0_DEDUCED);
            }

            if !ctx.flags.has_op1() && ctx.flags.has_dst() && deduce_op1_from_op0(ctx, res_logic)? {
                ctx.flags.insert(StepContextFlags::OP1_DEDUCED);
            }
        }
        _ => (),
    }

    Ok(())
}

/// Computes the result of the instruction if the deduction passes have not produced it
/// already.
///
/// All operands participating in the result must be known at this point.
fn compute_res(ctx: &mut StepContext) -> Result<(), Error> {
    if ctx.flags.has_res() {
        return Ok(());
    }

    match ctx.instruction.result_logic {
        ResultLogic::Op1 => {
            let op1 = ctx.require_op1()?;
            ctx.set_res(op1);
        }
        ResultLogic::Add => {
            let (op0, op1) = (ctx.require_op0()?, ctx.require_op1()?);
            let res = op0.add(&op1)?;
            ctx.set_res(res);
        }
        ResultLogic::Mul => {
            let (op0, op1) = (ctx.require_op0()?, ctx.require_op1()?);
            let res = op0.multiply(&op1)?;
            ctx.set_res(res);
        }
        ResultLogic::Unconstrained => (),
    }

    Ok(())
}

/// Attempts to deduce the destination of an instruction from its computed result.
fn deduce_dst(ctx: &mut StepContext, cpu: &Cpu) -> Result<(), Error> {
    if ctx.flags.has_dst() {
        return Ok(());
    }

    match ctx.instruction.op_code {
        OpCode::AssertEq if ctx.flags.has_res() => {
            ctx.dst = ctx.res;
            ctx.flags.insert(StepContextFlags::DST_DEDUCED);
        }
        OpCode::Call => {
            ctx.dst = Value::from(cpu.fp);
            ctx.flags.insert(StepContextFlags::DST_DEDUCED);
        }
        _ => return Err(Error::FailedToDeduceOperand("dst")),
    }

    Ok(())
}

/// Writes the operands recovered by deduction back into memory.
///
/// Every operand cell must be part of the memory once the step completes, as the memory
/// is part of the witness of the execution.
fn write_back_deduced(ctx: &StepContext, memory: &mut Memory) -> Result<(), Error> {
    if ctx.flags.contains(StepContextFlags::OP0_DEDUCED) {
        memory.insert(ctx.op0_addr, ctx.op0)?;
    }
    if ctx.flags.contains(StepContextFlags::OP1_DEDUCED) {
        memory.insert(ctx.op1_addr, ctx.op1)?;
    }
    if ctx.flags.contains(StepContextFlags::DST_DEDUCED) {
        memory.insert(ctx.dst_addr, ctx.dst)?;
    }

    // Operands that are still unknown at this point cannot be recovered at all.
    if !ctx.flags.has_op0() {
        return Err(Error::FailedToDeduceOperand("op0"));
    }
    if !ctx.flags.has_op1() {
        return Err(Error::FailedToDeduceOperand("op1"));
    }

    Ok(())
}

/// Verifies the assertions tied to the OP code of the instruction.
fn run_assertions(ctx: &StepContext, cpu: &Cpu) -> Result<(), Error> {
    match ctx.instruction.op_code {
        OpCode::AssertEq => {
            if !ctx.flags.has_res() {
                return Err(Error::UnconstrainedResForAssertEq);
            }
            if ctx.dst != ctx.res {
                return Err(Error::DiffAssertValues {
                    dst: ctx.dst,
                    res: ctx.res,
                });
            }
        }
        OpCode::Call => {
            let ret_pc = Value::from(cpu.pc + ctx.instruction.size());
            if ctx.op0 != ret_pc {
                return Err(Error::CantWriteReturnPc {
                    op0: ctx.op0,
                    ret_pc,
                });
            }

            let fp = Value::from(cpu.fp);
            if ctx.dst != fp {
                return Err(Error::CantWriteReturnFp { dst: ctx.dst, fp });
            }
        }
        _ => (),
    }

    Ok(())
}

/// Computes the next values of the three registers from the current CPU state and the
/// operands of the instruction.
fn compute_register_updates(ctx: &mut StepContext, cpu: &Cpu) -> Result<(), Error> {
    // Program counter.
    ctx.next_pc = match ctx.instruction.pc_update {
        PcUpdate::Regular => cpu.pc + ctx.instruction.size(),
        PcUpdate::AbsoluteJump => {
            if !ctx.flags.has_res() {
                return Err(Error::UnconstrainedResForJump);
            }
            *ctx.res
                .pointer()
                .ok_or(Error::JumpTargetNotRelocatable(ctx.res))?
        }
        PcUpdate::RelativeJump => {
            if !ctx.flags.has_res() {
                return Err(Error::UnconstrainedResForJump);
            }
            let displacement = ctx
                .res
                .scalar()
                .ok_or(Error::RelJumpTargetNotFelt(ctx.res))?;
            cpu.pc.add_felt(displacement).map_err(Error::Memory)?
        }
        PcUpdate::ConditionalJump => {
            if ctx.dst.is_zero() {
                cpu.pc + ctx.instruction.size()
            } else {
                let displacement = ctx
                    .op1
                    .scalar()
                    .ok_or(Error::RelJumpTargetNotFelt(ctx.op1))?;
                cpu.pc.add_felt(displacement).map_err(Error::Memory)?
            }
        }
    };

    // Allocation pointer.
    ctx.next_ap = match ctx.instruction.ap_update {
        ApUpdate::None => cpu.ap,
        ApUpdate::AddResult => {
            if !ctx.flags.has_res() {
                return Err(Error::UnconstrainedResForApUpdate);
            }
            let advance = ctx
                .res
                .scalar()
                .ok_or(Error::Memory(MemoryError::InvalidPointerArithmetic))?;
            cpu.ap.add_felt(advance).map_err(Error::Memory)?
        }
        ApUpdate::Increment => cpu.ap + 1,
        ApUpdate::Increment2 => cpu.ap + 2,
    };

    // Frame pointer.
    ctx.next_fp = match ctx.instruction.fp_update {
        FpUpdate::None => cpu.fp,
        FpUpdate::ApPlusTwo => cpu.ap + 2,
        FpUpdate::Dst => match ctx.dst {
            Value::Pointer(pointer) => pointer,
            Value::Scalar(offset) => cpu.fp.add_felt(&offset).map_err(Error::Memory)?,
        },
    };

    Ok(())
}

bitflags! {
    /// Some flags associated with a [`StepContext`].
    #[derive(Debug, Clone, Copy)]
    struct StepContextFlags: u8 {
        /// The destination of the instruction was deduced from the other operands.
        const DST_DEDUCED = 1 << 0;
        /// The destination of the instruction was asserted by an existing memory cell.
        const DST_ASSERTED = 1 << 1;
        /// The first operand of the instruction was deduced from the other operands.
        const OP0_DEDUCED = 1 << 2;
        /// The first operand of the instruction was asserted by an existing memory cell.
        const OP0_ASSERTED = 1 << 3;
        /// The second operand of the instruction was deduced from the other operands.
        const OP1_DEDUCED = 1 << 4;
        /// The second operand of the instruction was asserted by an existing memory cell.
        const OP1_ASSERTED = 1 << 5;
        /// The result of the instruction has been computed.
        const RES_KNOWN = 1 << 6;
    }
}

impl StepContextFlags {
    /// Returns whether the destination of the instruction is known.
    #[inline(always)]
    pub const fn has_dst(self) -> bool {
        self.intersects(Self::DST_ASSERTED.union(Self::DST_DEDUCED))
    }

    /// Returns whether the first operand of the instruction is known.
    #[inline(always)]
    pub const fn has_op0(self) -> bool {
        self.intersects(Self::OP0_ASSERTED.union(Self::OP0_DEDUCED))
    }

    /// Returns whether the second operand of the instruction is known.
    #[inline(always)]
    pub const fn has_op1(self) -> bool {
        self.intersects(Self::OP1_ASSERTED.union(Self::OP1_DEDUCED))
    }

    /// Returns whether the result of the instruction is known.
    #[inline(always)]
    pub const fn has_res(self) -> bool {
        self.contains(Self::RES_KNOWN)
    }
}

/// Stores the state that must be kept around while executing a single instruction.
struct StepContext {
    /// The instruction being executed.
    pub instruction: Instruction,
    /// The address of the destination of the instruction.
    pub dst_addr: Pointer,
    /// The value of the destination of the instruction, if known.
    ///
    /// Only holds a meaningful value if the `DST_ASSERTED` or `DST_DEDUCED` flag is set.
    pub dst: Value,
    /// The address of the first operand of the instruction.
    pub op0_addr: Pointer,
    /// The value of the first operand of the instruction, if known.
    ///
    /// Only holds a meaningful value if the `OP0_ASSERTED` or `OP0_DEDUCED` flag is set.
    pub op0: Value,
    /// The address of the second operand of the instruction.
    pub op1_addr: Pointer,
    /// The value of the second operand of the instruction, if known.
    ///
    /// Only holds a meaningful value if the `OP1_ASSERTED` or `OP1_DEDUCED` flag is set.
    pub op1: Value,
    /// The result of the instruction, if known.
    ///
    /// Only holds a meaningful value if the `RES_KNOWN` flag is set.
    pub res: Value,
    /// Some flags associated with the context.
    pub flags: StepContextFlags,
    /// The next value of the **Program Counter**.
    pub next_pc: Pointer,
    /// The next value of the **Allocation Pointer**.
    pub next_ap: Pointer,
    /// The next value of the **Frame Pointer**.
    pub next_fp: Pointer,
}

impl StepContext {
    /// Creates a new [`StepContext`] for the provided instruction.
    ///
    /// All other fields are initialized to dummy values and are only meaningful once the
    /// corresponding flag is set.
    pub const fn initial(instruction: Instruction) -> Self {
        Self {
            instruction,
            dst_addr: Pointer::new(0, 0),
            dst: Value::Scalar(Felt::ZERO),
            op0_addr: Pointer::new(0, 0),
            op0: Value::Scalar(Felt::ZERO),
            op1_addr: Pointer::new(0, 0),
            op1: Value::Scalar(Felt::ZERO),
            res: Value::Scalar(Felt::ZERO),
            flags: StepContextFlags::empty(),
            next_pc: Pointer::new(0, 0),
            next_ap: Pointer::new(0, 0),
            next_fp: Pointer::new(0, 0),
        }
    }

    /// Records the result of the instruction.
    fn set_res(&mut self, res: Value) {
        self.res = res;
        self.flags.insert(StepContextFlags::RES_KNOWN);
    }

    /// Returns the first operand, failing if it is not known.
    fn require_op0(&self) -> Result<Value, Error> {
        if self.flags.has_op0() {
            Ok(self.op0)
        } else {
            Err(Error::FailedToDeduceOperand("op0"))
        }
    }

    /// Returns the second operand, failing if it is not known.
    fn require_op1(&self) -> Result<Value, Error> {
        if self.flags.has_op1() {
            Ok(self.op1)
        } else {
            Err(Error::FailedToDeduceOperand("op1"))
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::builtin::PedersenBuiltinRunner;

    use super::*;

    /// A machine with a program segment, an execution segment, and a minimal call frame
    /// below `ap = fp = (1, 2)`.
    fn machine(program: &[u64]) -> CairoVM {
        let mut vm = CairoVM::new(true);
        let program_base = vm.segments.add();
        let execution_base = vm.segments.add();

        for (offset, word) in program.iter().enumerate() {
            vm.segments
                .memory
                .insert(program_base + offset, Felt::from(*word))
                .unwrap();
        }
        vm.segments.memory.insert(execution_base, 0u64).unwrap();
        vm.segments
            .memory
            .insert(execution_base + 1, 0u64)
            .unwrap();

        vm.cpu = Cpu::new(program_base, execution_base + 2, execution_base + 2);
        vm
    }

    #[test]
    fn assert_eq_with_immediate_writes_the_destination() {
        // [ap] = 2; ap++
        let mut vm = machine(&[0x480680017fff8000, 2]);
        vm.step().unwrap();

        assert_eq!(
            vm.segments.memory.get(Pointer::new(1, 2)),
            Some(&Value::from(2u64))
        );
        assert_eq!(vm.cpu.pc, Pointer::new(0, 2));
        assert_eq!(vm.cpu.ap, Pointer::new(1, 3));
        assert_eq!(vm.cpu.fp, Pointer::new(1, 2));
        assert_eq!(vm.current_step, 1);
        assert_eq!(vm.trace.len(), 1);
    }

    #[test]
    fn assert_eq_detects_contradictions() {
        let mut vm = machine(&[0x480680017fff8000, 2]);
        vm.segments
            .memory
            .insert(Pointer::new(1, 2), 7u64)
            .unwrap();

        assert!(matches!(
            vm.step(),
            Err(Error::DiffAssertValues { .. })
        ));
    }

    #[test]
    fn conditional_jump_falls_through_on_zero() {
        // jmp rel 3 if [ap] != 0, with [ap] = 0.
        let mut vm = machine(&[0x020680017fff8000, 3]);
        vm.segments
            .memory
            .insert(Pointer::new(1, 2), 0u64)
            .unwrap();

        vm.step().unwrap();
        assert_eq!(vm.cpu.pc, Pointer::new(0, 2));
    }

    #[test]
    fn conditional_jump_takes_the_branch_on_non_zero() {
        let mut vm = machine(&[0x020680017fff8000, 3]);
        vm.segments
            .memory
            .insert(Pointer::new(1, 2), 5u64)
            .unwrap();

        vm.step().unwrap();
        assert_eq!(vm.cpu.pc, Pointer::new(0, 3));
    }

    #[test]
    fn call_deduces_and_writes_its_return_frame() {
        // call rel 3
        let mut vm = machine(&[0x1104800180018000, 3]);
        vm.step().unwrap();

        // The caller's frame pointer and the return pc were deduced and written.
        assert_eq!(
            vm.segments.memory.get(Pointer::new(1, 2)),
            Some(&Value::from(Pointer::new(1, 2)))
        );
        assert_eq!(
            vm.segments.memory.get(Pointer::new(1, 3)),
            Some(&Value::from(Pointer::new(0, 2)))
        );
        assert_eq!(vm.cpu.pc, Pointer::new(0, 3));
        assert_eq!(vm.cpu.ap, Pointer::new(1, 4));
        assert_eq!(vm.cpu.fp, Pointer::new(1, 4));
    }

    #[test]
    fn fetching_from_an_unknown_cell_is_an_encoding_error() {
        let mut vm = machine(&[]);
        assert_eq!(vm.step(), Err(Error::InvalidInstructionEncoding));
    }

    #[test]
    fn builtin_deduction_feeds_the_operand_and_memory() {
        // [ap] = [[fp - 3]]; ap++ with [fp - 3] pointing at a pedersen output cell.
        let mut vm = CairoVM::new(true);
        let program_base = vm.segments.add();
        let execution_base = vm.segments.add();

        let mut pedersen = Box::new(PedersenBuiltinRunner::new(8, true));
        pedersen.initialize_segments(&mut vm.segments);
        let base = pedersen.base();
        vm.builtins.push(pedersen);

        let memory = &mut vm.segments.memory;
        memory
            .insert(program_base, Felt::from(0x480280007ffd8000u64))
            .unwrap();
        memory.insert(execution_base, base + 2).unwrap();
        memory.insert(base, 1u64).unwrap();
        memory.insert(base + 1, 2u64).unwrap();

        vm.cpu = Cpu::new(program_base, execution_base + 3, execution_base + 3);

        vm.step().unwrap();

        let expected = Felt::from_hex(
            "0x5bb9440e27889a364bcb678b1f679ecd1347acdedcbf36e83494f857cc58026",
        )
        .unwrap();
        // The deduced hash was written back into the builtin segment and asserted at
        // the destination.
        assert_eq!(
            vm.segments.memory.get(base + 2),
            Some(&Value::from(expected))
        );
        assert_eq!(
            vm.segments.memory.get(Pointer::new(1, 3)),
            Some(&Value::from(expected))
        );
    }

    #[test]
    fn rc_limits_watch_the_decoded_offsets() {
        let mut vm = machine(&[0x480680017fff8000, 2]);
        vm.step().unwrap();

        // off0 = 0, off1 = -1, off2 = 1, biased around 2^15.
        assert_eq!(vm.rc_limits, Some((0x7fff, 0x8001)));
    }
}
