//! Defines the Poseidon hash builtin.

use std::collections::HashMap;

use starknet_types_core::felt::Felt;
use starknet_types_core::hash::Poseidon;

use crate::error::BuiltinError;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

use super::{
    consume_stop_pointer, ratio_allocated_units, BuiltinRunner, POSEIDON_BUILTIN_NAME,
};

/// The number of memory cells occupied by one Poseidon instance: three inputs followed by
/// three outputs.
pub const POSEIDON_CELLS_PER_INSTANCE: usize = 6;

/// The number of input cells of one Poseidon instance.
pub const POSEIDON_INPUT_CELLS: usize = 3;

/// The Poseidon hash builtin.
///
/// The builtin's segment is laid out in instances of six cells: three inputs followed by
/// the three outputs of the Hades permutation over them. Deducing any output cell runs
/// the permutation once and caches the whole output triplet, so the other two outputs of
/// the instance come for free.
#[derive(Debug)]
pub struct PoseidonBuiltinRunner {
    base: Pointer,
    included: bool,
    ratio: usize,
    /// Permutation outputs keyed by the base offset of their instance.
    cache: HashMap<usize, [Felt; POSEIDON_INPUT_CELLS]>,
    stop_ptr: Option<usize>,
}

impl PoseidonBuiltinRunner {
    /// Creates a new [`PoseidonBuiltinRunner`].
    pub fn new(ratio: usize, included: bool) -> Self {
        Self {
            base: Pointer::new(0, 0),
            included,
            ratio,
            cache: HashMap::new(),
            stop_ptr: None,
        }
    }
}

impl BuiltinRunner for PoseidonBuiltinRunner {
    fn name(&self) -> &'static str {
        POSEIDON_BUILTIN_NAME
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
        POSEIDON_CELLS_PER_INSTANCE
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
        let index = addr.offset % POSEIDON_CELLS_PER_INSTANCE;
        if index < POSEIDON_INPUT_CELLS {
            return Ok(None);
        }

        let instance = addr.offset - index;

        if let Some(outputs) = self.cache.get(&instance) {
            return Ok(Some(Value::from(outputs[index - POSEIDON_INPUT_CELLS])));
        }

        let mut state = [Felt::ZERO; POSEIDON_INPUT_CELLS];
        for (input, cell) in state.iter_mut().enumerate() {
            let Ok(felt) = memory.get_felt(Pointer::new(addr.segment, instance + input)) else {
                return Ok(None);
            };
            *cell = felt;
        }

        Poseidon::hades_permutation(&mut state);
        self.cache.insert(instance, state);

        Ok(Some(Value::from(state[index - POSEIDON_INPUT_CELLS])))
    }

    fn final_stack(
        &mut self,
        segments: &SegmentManager,
        pointer: Pointer,
    ) -> Result<Pointer, BuiltinError> {
        let used = self.get_used_instances(segments) * POSEIDON_CELLS_PER_INSTANCE;
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
