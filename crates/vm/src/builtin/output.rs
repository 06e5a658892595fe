//! Defines the output builtin.

use crate::error::BuiltinError;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

use super::{consume_stop_pointer, used_cells, BuiltinRunner, OUTPUT_BUILTIN_NAME};

/// The output builtin.
///
/// The output builtin is the simplest of all: it owns a segment with no validation rule
/// and no deduction. Its size is simply the number of cells the program wrote to it, and
/// its contents form the program's output.
#[derive(Debug)]
pub struct OutputBuiltinRunner {
    base: Pointer,
    included: bool,
    stop_ptr: Option<usize>,
}

impl OutputBuiltinRunner {
    /// Creates a new [`OutputBuiltinRunner`].
    pub fn new(included: bool) -> Self {
        Self {
            base: Pointer::new(0, 0),
            included,
            stop_ptr: None,
        }
    }
}

impl BuiltinRunner for OutputBuiltinRunner {
    fn name(&self) -> &'static str {
        OUTPUT_BUILTIN_NAME
    }

    fn base(&self) -> Pointer {
        self.base
    }

    fn ratio(&self) -> usize {
        0
    }

    fn included(&self) -> bool {
        self.included
    }

    fn cells_per_instance(&self) -> usize {
        1
    }

    fn initialize_segments(&mut self, segments: &mut SegmentManager) {
        self.base = segments.add();
    }

    fn initial_stack(&self) -> Vec<Value> {
        if self.included {
            vec![self.base.into()]
        } else {
            Vec::new()
        }
    }

    fn deduce_memory_cell(
        &mut self,
        _addr: Pointer,
        _memory: &Memory,
    ) -> Result<Option<Value>, BuiltinError> {
        Ok(None)
    }

    fn final_stack(
        &mut self,
        segments: &SegmentManager,
        pointer: Pointer,
    ) -> Result<Pointer, BuiltinError> {
        let used = used_cells(self.base, segments);
        let (pointer, stop_ptr) = consume_stop_pointer(
            self.name(),
            self.base,
            used,
            self.included,
            segments,
            pointer,
        )?;
        self.stop_ptr = Some(stop_ptr);
        Ok(pointer)
    }

    fn stop_ptr(&self) -> Option<usize> {
        self.stop_ptr
    }

    fn get_allocated_memory_units(
        &self,
        _segments: &SegmentManager,
        _current_step: usize,
    ) -> Result<usize, BuiltinError> {
        // The output builtin has no ratio: it occupies no general memory units, and its
        // allocation always matches its usage.
        Ok(0)
    }

    fn get_used_cells_and_allocated_sizes(
        &self,
        segments: &SegmentManager,
        _current_step: usize,
    ) -> Result<(usize, usize), BuiltinError> {
        let used = used_cells(self.base, segments);
        Ok((used, used))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_follows_usage() {
        let mut segments = SegmentManager::new();
        let mut runner = OutputBuiltinRunner::new(true);
        runner.initialize_segments(&mut segments);
        segments.memory.insert(runner.base(), 55u64).unwrap();
        segments.compute_effective_sizes();

        assert_eq!(
            runner.get_used_cells_and_allocated_sizes(&segments, 8),
            Ok((1, 1))
        );
        assert_eq!(runner.get_allocated_memory_units(&segments, 8), Ok(0));
    }

    #[test]
    fn excluded_runner_pushes_no_initial_stack() {
        let runner = OutputBuiltinRunner::new(false);
        assert!(runner.initial_stack().is_empty());
    }

    #[test]
    fn final_stack_consumes_the_stop_pointer() {
        let mut segments = SegmentManager::new();
        let mut runner = OutputBuiltinRunner::new(true);
        runner.initialize_segments(&mut segments);
        let return_stack = segments.add();

        segments.memory.insert(runner.base(), 55u64).unwrap();
        // The return stack holds the stop pointer: base + 1.
        segments
            .memory
            .insert(return_stack, runner.base() + 1)
            .unwrap();
        segments.compute_effective_sizes();

        let pointer = runner
            .final_stack(&segments, return_stack + 1)
            .unwrap();
        assert_eq!(pointer, return_stack);
    }

    #[test]
    fn final_stack_rejects_a_wrong_stop_pointer() {
        let mut segments = SegmentManager::new();
        let mut runner = OutputBuiltinRunner::new(true);
        runner.initialize_segments(&mut segments);
        let return_stack = segments.add();

        segments.memory.insert(runner.base(), 55u64).unwrap();
        segments
            .memory
            .insert(return_stack, runner.base() + 2)
            .unwrap();
        segments.compute_effective_sizes();

        let err = runner.final_stack(&segments, return_stack + 1).unwrap_err();
        assert_eq!(
            err,
            BuiltinError::InvalidStopPointer {
                builtin: OUTPUT_BUILTIN_NAME,
                found: 2,
                expected: 1,
            }
        );
    }
}
