//! Defines the bitwise builtin.

use num_bigint::BigUint;
use starknet_types_core::felt::Felt;

use crate::error::BuiltinError;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

use super::{
    consume_stop_pointer, ratio_allocated_units, BuiltinRunner, BITWISE_BUILTIN_NAME,
};

/// The number of memory cells occupied by one bitwise instance:
/// `[x, y, x & y, x ^ y, x | y]`.
pub const BITWISE_CELLS_PER_INSTANCE: usize = 5;

/// The number of input cells of one bitwise instance.
pub const BITWISE_INPUT_CELLS: usize = 2;

/// The maximum bit length of a bitwise operand.
pub const BITWISE_TOTAL_N_BITS: u64 = 251;

/// The bitwise builtin.
///
/// The builtin's segment is laid out in instances of five cells: two operands followed by
/// their AND, XOR and OR. Deducing an output cell reads the two operands, which must both
/// fit in [`BITWISE_TOTAL_N_BITS`] bits, and computes the matching operation over their
/// little-endian representation.
#[derive(Debug)]
pub struct BitwiseBuiltinRunner {
    base: Pointer,
    included: bool,
    ratio: usize,
    stop_ptr: Option<usize>,
}

impl BitwiseBuiltinRunner {
    /// Creates a new [`BitwiseBuiltinRunner`].
    pub fn new(ratio: usize, included: bool) -> Self {
        Self {
            base: Pointer::new(0, 0),
            included,
            ratio,
            stop_ptr: None,
        }
    }

    /// Reads a bitwise operand, enforcing the builtin's bit length limit.
    fn operand(&self, addr: Pointer, memory: &Memory) -> Result<Option<BigUint>, BuiltinError> {
        let Ok(felt) = memory.get_felt(addr) else {
            return Ok(None);
        };

        let value = felt.to_biguint();
        if value.bits() > BITWISE_TOTAL_N_BITS {
            return Err(BuiltinError::FeltBiggerThanPowerOfTwo {
                value: felt,
                limit: BITWISE_TOTAL_N_BITS,
            });
        }

        Ok(Some(value))
    }
}

impl BuiltinRunner for BitwiseBuiltinRunner {
    fn name(&self) -> &'static str {
        BITWISE_BUILTIN_NAME
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
        BITWISE_CELLS_PER_INSTANCE
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
        let index = addr.offset % BITWISE_CELLS_PER_INSTANCE;
        if index < BITWISE_INPUT_CELLS {
            return Ok(None);
        }

        let instance = addr.offset - index;
        let Some(x) = self.operand(Pointer::new(addr.segment, instance), memory)? else {
            return Ok(None);
        };
        let Some(y) = self.operand(Pointer::new(addr.segment, instance + 1), memory)? else {
            return Ok(None);
        };

        let result = match index {
            2 => x & y,
            3 => x ^ y,
            _ => x | y,
        };

        Ok(Some(Value::from(Felt::from(result))))
    }

    fn final_stack(
        &mut self,
        segments: &SegmentManager,
        pointer: Pointer,
    ) -> Result<Pointer, BuiltinError> {
        let used = self.get_used_instances(segments) * BITWISE_CELLS_PER_INSTANCE;
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

    fn get_used_diluted_check_units(&self, spacing: usize, n_bits: usize) -> usize {
        let total_n_bits = BITWISE_TOTAL_N_BITS as usize;

        let mut partition = Vec::new();
        for i in (0..total_n_bits).step_by(spacing * n_bits) {
            for j in 0..spacing {
                if i + j < total_n_bits {
                    partition.push(i + j);
                }
            }
        }

        let trimmed = partition
            .iter()
            .filter(|start| *start + spacing * (n_bits - 1) + 1 > total_n_bits)
            .count();

        4 * partition.len() + trimmed
    }
}
