//! Defines the Pedersen hash builtin.

use starknet_types_core::felt::Felt;
use starknet_types_core::hash::{Pedersen, StarkHash};

use crate::error::BuiltinError;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

use super::{
    consume_stop_pointer, ratio_allocated_units, BuiltinRunner, PEDERSEN_BUILTIN_NAME,
};

/// The number of memory cells occupied by one Pedersen instance: two inputs followed by
/// the output.
pub const PEDERSEN_CELLS_PER_INSTANCE: usize = 3;

/// The number of input cells of one Pedersen instance.
pub const PEDERSEN_INPUT_CELLS: usize = 2;

/// The Pedersen hash builtin.
///
/// The builtin's segment is laid out in instances of three cells `[a, b, out]`. Reading
/// an unwritten output cell deduces it as `pedersen(a, b)` over the two input cells of
/// the instance. Deduced addresses are remembered so the hash is computed at most once
/// per cell.
#[derive(Debug)]
pub struct PedersenBuiltinRunner {
    base: Pointer,
    included: bool,
    ratio: usize,
    /// Offsets of the output cells that have already been deduced.
    verified: Vec<bool>,
    stop_ptr: Option<usize>,
}

impl PedersenBuiltinRunner {
    /// Creates a new [`PedersenBuiltinRunner`].
    pub fn new(ratio: usize, included: bool) -> Self {
        Self {
            base: Pointer::new(0, 0),
            included,
            ratio,
            verified: Vec::new(),
            stop_ptr: None,
        }
    }

    /// Returns whether the output cell at `offset` has already been deduced.
    pub fn is_verified(&self, offset: usize) -> bool {
        self.verified.get(offset).copied().unwrap_or(false)
    }

    fn mark_verified(&mut self, offset: usize) {
        if offset >= self.verified.len() {
            self.verified.resize(offset + 1, false);
        }
        self.verified[offset] = true;
    }
}

impl BuiltinRunner for PedersenBuiltinRunner {
    fn name(&self) -> &'static str {
        PEDERSEN_BUILTIN_NAME
    }

    fn base(&self) -> Pointer {
        self.base
    }

    fn ratio(&self) -> usize {
        self.ratio
    }

    fn included(&self) -> bool {
        self.included
    }

    fn cells_per_instance(&self) -> usize {
        PEDERSEN_CELLS_PER_INSTANCE
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
        addr: Pointer,
        memory: &Memory,
    ) -> Result<Option<Value>, BuiltinError> {
        if addr.offset % PEDERSEN_CELLS_PER_INSTANCE != PEDERSEN_INPUT_CELLS
            || self.is_verified(addr.offset)
        {
            return Ok(None);
        }

        // Both inputs must be known felts for the output to be deducible.
        let Ok(a) = memory.get_felt(Pointer::new(addr.segment, addr.offset - 2)) else {
            return Ok(None);
        };
        let Ok(b) = memory.get_felt(Pointer::new(addr.segment, addr.offset - 1)) else {
            return Ok(None);
        };

        self.mark_verified(addr.offset);

        let hash: Felt = Pedersen::hash(&a, &b);
        Ok(Some(Value::from(hash)))
    }

    fn final_stack(
        &mut self,
        segments: &SegmentManager,
        pointer: Pointer,
    ) -> Result<Pointer, BuiltinError> {
        let used = self.get_used_instances(segments) * PEDERSEN_CELLS_PER_INSTANCE;
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
        segments: &SegmentManager,
        current_step: usize,
    ) -> Result<usize, BuiltinError> {
        ratio_allocated_units(
            self.name(),
            self.ratio,
            self.cells_per_instance(),
            self.base,
            segments,
            current_step,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner_with_memory() -> (PedersenBuiltinRunner, SegmentManager) {
        let mut segments = SegmentManager::new();
        let mut runner = PedersenBuiltinRunner::new(8, true);
        runner.initialize_segments(&mut segments);
        (runner, segments)
    }

    #[test]
    fn deduces_hash_of_one_and_two() {
        let (mut runner, mut segments) = runner_with_memory();
        let base = runner.base();
        segments.memory.insert(base, 1u64).unwrap();
        segments.memory.insert(base + 1, 2u64).unwrap();

        let deduced = runner
            .deduce_memory_cell(base + 2, &segments.memory)
            .unwrap()
            .unwrap();

        // pedersen(1, 2), from the reference hash chain.
        let expected = Felt::from_hex(
            "0x5bb9440e27889a364bcb678b1f679ecd1347acdedcbf36e83494f857cc58026",
        )
        .unwrap();
        assert_eq!(deduced, Value::from(expected));
        assert!(runner.is_verified(base.offset + 2));
    }

    #[test]
    fn input_cells_are_not_deduced() {
        let (mut runner, segments) = runner_with_memory();
        let base = runner.base();
        assert_eq!(runner.deduce_memory_cell(base, &segments.memory), Ok(None));
        assert_eq!(
            runner.deduce_memory_cell(base + 1, &segments.memory),
            Ok(None)
        );
    }

    #[test]
    fn missing_inputs_prevent_deduction() {
        let (mut runner, mut segments) = runner_with_memory();
        let base = runner.base();
        segments.memory.insert(base, 1u64).unwrap();

        assert_eq!(
            runner.deduce_memory_cell(base + 2, &segments.memory),
            Ok(None)
        );
        assert!(!runner.is_verified(base.offset + 2));
    }

    #[test]
    fn deduction_is_performed_once_per_cell() {
        let (mut runner, mut segments) = runner_with_memory();
        let base = runner.base();
        segments.memory.insert(base, 1u64).unwrap();
        segments.memory.insert(base + 1, 2u64).unwrap();

        assert!(runner
            .deduce_memory_cell(base + 2, &segments.memory)
            .unwrap()
            .is_some());
        // The verified set short-circuits the second request.
        assert_eq!(
            runner.deduce_memory_cell(base + 2, &segments.memory),
            Ok(None)
        );
    }
}
