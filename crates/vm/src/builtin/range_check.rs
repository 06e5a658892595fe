//! Defines the range-check builtin.

use std::rc::Rc;

use num_bigint::BigUint;
use num_traits::ToPrimitive;

use crate::error::BuiltinError;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

use super::{
    consume_stop_pointer, ratio_allocated_units, used_cells, BuiltinRunner,
    RANGE_CHECK_BUILTIN_NAME,
};

/// The number of 16-bit parts a range-checked cell decomposes into.
pub const RANGE_CHECK_N_PARTS: usize = 8;

/// The range-check builtin.
///
/// Every cell inserted into the builtin's segment is validated to be a felt of at most
/// `16 * n_parts` bits, which with the standard eight parts means a value in
/// `[0, 2^128)`. The builtin performs no deduction; its whole behavior lives in its
/// validation rule.
#[derive(Debug)]
pub struct RangeCheckBuiltinRunner {
    base: Pointer,
    included: bool,
    ratio: usize,
    n_parts: usize,
    stop_ptr: Option<usize>,
}

impl RangeCheckBuiltinRunner {
    /// Creates a new [`RangeCheckBuiltinRunner`].
    pub fn new(ratio: usize, n_parts: usize, included: bool) -> Self {
        Self {
            base: Pointer::new(0, 0),
            included,
            ratio,
            n_parts,
            stop_ptr: None,
        }
    }

    /// Returns the maximum admissible bit length of a range-checked cell.
    #[inline(always)]
    pub fn bit_limit(&self) -> u64 {
        16 * self.n_parts as u64
    }
}

impl BuiltinRunner for RangeCheckBuiltinRunner {
    fn name(&self) -> &'static str {
        RANGE_CHECK_BUILTIN_NAME
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

    fn add_validation_rule(&self, memory: &mut Memory) {
        let bit_limit = self.bit_limit();

        memory.add_validation_rule(
            self.base.segment as usize,
            Rc::new(move |memory, addr| {
                let Some(value) = memory.get(addr) else {
                    // Validation runs on freshly inserted cells, which always exist.
                    return Ok(Vec::new());
                };

                let felt = value.scalar().ok_or(BuiltinError::NotAFelt {
                    builtin: RANGE_CHECK_BUILTIN_NAME,
                    at: addr,
                })?;

                if felt.to_biguint().bits() > bit_limit {
                    return Err(BuiltinError::OutsideBounds(*felt));
                }

                Ok(vec![addr])
            }),
        );
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

    fn get_range_check_usage(&self, memory: &Memory) -> Option<(usize, usize)> {
        let segment = memory.segment(self.base.segment)?;
        let mask = BigUint::from(u16::MAX);

        let mut usage: Option<(usize, usize)> = None;
        for (_, value) in segment.iter_known() {
            let Some(felt) = value.scalar() else {
                continue;
            };
            let felt = felt.to_biguint();
            for part in 0..self.n_parts {
                let limb = ((&felt >> (16 * part)) & &mask)
                    .to_usize()
                    .unwrap_or_default();
                usage = Some(match usage {
                    None => (limb, limb),
                    Some((min, max)) => (min.min(limb), max.max(limb)),
                });
            }
        }

        usage
    }

    fn get_used_perm_range_check_limits(
        &self,
        segments: &SegmentManager,
        _current_step: usize,
    ) -> Result<usize, BuiltinError> {
        Ok(used_cells(self.base, segments) * self.n_parts)
    }
}

#[cfg(test)]
mod tests {
    use starknet_types_core::felt::Felt;

    use crate::error::MemoryError;

    use super::*;

    fn runner_with_memory() -> (RangeCheckBuiltinRunner, SegmentManager) {
        let mut segments = SegmentManager::new();
        let mut runner = RangeCheckBuiltinRunner::new(8, RANGE_CHECK_N_PARTS, true);
        runner.initialize_segments(&mut segments);
        runner.add_validation_rule(&mut segments.memory);
        (runner, segments)
    }

    #[test]
    fn accepts_felts_up_to_128_bits() {
        let (runner, mut segments) = runner_with_memory();
        // 2^128 - 1, the largest admissible value.
        let limit = Felt::from_hex("0xffffffffffffffffffffffffffffffff").unwrap();

        segments.memory.insert(runner.base(), limit).unwrap();
        segments.memory.insert(runner.base() + 1, 0u64).unwrap();
        assert!(segments.memory.is_validated(runner.base()));
    }

    #[test]
    fn rejects_felts_beyond_128_bits() {
        let (runner, mut segments) = runner_with_memory();
        // 2^128, one past the bound.
        let out_of_bounds = Felt::from_hex("0x100000000000000000000000000000000").unwrap();

        let err = segments
            .memory
            .insert(runner.base(), out_of_bounds)
            .unwrap_err();
        assert_eq!(
            err,
            MemoryError::ValidationFailed(Box::new(BuiltinError::OutsideBounds(out_of_bounds)))
        );
    }

    #[test]
    fn rejects_minus_one() {
        // -1 is P - 1, which has far more than 128 bits.
        let (runner, mut segments) = runner_with_memory();
        let minus_one = Felt::ZERO - Felt::ONE;

        let err = segments
            .memory
            .insert(runner.base(), minus_one)
            .unwrap_err();
        assert_eq!(
            err,
            MemoryError::ValidationFailed(Box::new(BuiltinError::OutsideBounds(minus_one)))
        );
    }

    #[test]
    fn rejects_pointers() {
        let (runner, mut segments) = runner_with_memory();

        let err = segments
            .memory
            .insert(runner.base(), Pointer::new(0, 0))
            .unwrap_err();
        assert_eq!(
            err,
            MemoryError::ValidationFailed(Box::new(BuiltinError::NotAFelt {
                builtin: RANGE_CHECK_BUILTIN_NAME,
                at: runner.base(),
            }))
        );
    }

    #[test]
    fn range_check_usage_tracks_16_bit_parts() {
        let (runner, mut segments) = runner_with_memory();
        segments.memory.insert(runner.base(), 0x8000u64).unwrap();

        let (min, max) = runner.get_range_check_usage(&segments.memory).unwrap();
        assert_eq!(min, 0);
        assert_eq!(max, 0x8000);
    }
}
