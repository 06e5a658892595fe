//! Defines the [`BuiltinRunner`] trait and the builtin implementations shipped with the
//! virtual machine.
//!
//! A builtin is a memory-backed coprocessor: it owns one segment of the virtual machine's
//! memory and extends the interpreter through two mechanisms. *Validation rules* check
//! every value inserted into the builtin's segment (the range-check builtin), and
//! *auto-deduction* synthesizes the value of unwritten cells from their peers within the
//! same instance (the hash and bitwise builtins).
//!
//! Builtin runners also carry the accounting hooks used by proof mode to verify that the
//! layout allocated enough cells for the executed step count.

mod bitwise;
mod output;
mod pedersen;
mod poseidon;
mod range_check;

pub use self::bitwise::*;
pub use self::output::*;
pub use self::pedersen::*;
pub use self::poseidon::*;
pub use self::range_check::*;

use std::fmt;

use crate::error::BuiltinError;
use crate::memory::{Memory, Pointer, SegmentManager, Value};

/// The stable identifier of the output builtin.
pub const OUTPUT_BUILTIN_NAME: &str = "output";
/// The stable identifier of the Pedersen hash builtin.
pub const PEDERSEN_BUILTIN_NAME: &str = "pedersen";
/// The stable identifier of the range-check builtin.
pub const RANGE_CHECK_BUILTIN_NAME: &str = "range_check";
/// The stable identifier of the bitwise builtin.
pub const BITWISE_BUILTIN_NAME: &str = "bitwise";
/// The stable identifier of the Poseidon hash builtin.
pub const POSEIDON_BUILTIN_NAME: &str = "poseidon";

/// A builtin that may be attached to the virtual machine.
///
/// Runners live in a homogeneous vector ordered as in the program header, and each one
/// owns exactly one memory segment, allocated by
/// [`initialize_segments`](BuiltinRunner::initialize_segments).
pub trait BuiltinRunner: fmt::Debug {
    /// Returns the stable string identifier of the builtin.
    fn name(&self) -> &'static str;

    /// Returns the base address of the segment owned by the builtin.
    fn base(&self) -> Pointer;

    /// Returns the ratio of execution steps per builtin instance, or zero when the
    /// builtin's allocation simply follows its usage.
    fn ratio(&self) -> usize;

    /// Returns whether the builtin was requested by the program.
    ///
    /// In proof mode, layouts instantiate their whole builtin set; runners the program
    /// did not ask for exist (so that their segments are laid out) but are not included
    /// in the entry stack.
    fn included(&self) -> bool;

    /// Returns the number of memory cells occupied by one instance of the builtin.
    fn cells_per_instance(&self) -> usize;

    /// Allocates the segment owned by this builtin.
    fn initialize_segments(&mut self, segments: &mut SegmentManager);

    /// Returns the bootstrap arguments pushed onto the execution stack for this builtin,
    /// typically its base address.
    fn initial_stack(&self) -> Vec<Value>;

    /// Attempts to synthesize the value of an unwritten cell of the builtin's segment
    /// from its peer cells.
    ///
    /// Returns `Ok(None)` when the cell is not one the builtin can deduce, such as an
    /// instance input.
    fn deduce_memory_cell(
        &mut self,
        addr: Pointer,
        memory: &Memory,
    ) -> Result<Option<Value>, BuiltinError>;

    /// Installs the builtin's validation rule on its segment, if it carries one.
    fn add_validation_rule(&self, _memory: &mut Memory) {}

    /// Consumes the builtin's stop pointer from the return stack.
    ///
    /// `pointer` is the first unread slot of the return stack; the method returns the
    /// new first unread slot.
    fn final_stack(
        &mut self,
        segments: &SegmentManager,
        pointer: Pointer,
    ) -> Result<Pointer, BuiltinError>;

    /// Returns the stop offset consumed from the return stack, once
    /// [`final_stack`](BuiltinRunner::final_stack) has run.
    fn stop_ptr(&self) -> Option<usize>;

    /// Returns the number of memory cells the layout allocates for this builtin after
    /// `current_step` execution steps.
    fn get_allocated_memory_units(
        &self,
        segments: &SegmentManager,
        current_step: usize,
    ) -> Result<usize, BuiltinError>;

    /// Returns the number of cells used by the builtin together with its allocated size,
    /// failing when usage exceeds the allocation.
    fn get_used_cells_and_allocated_sizes(
        &self,
        segments: &SegmentManager,
        current_step: usize,
    ) -> Result<(usize, usize), BuiltinError> {
        let used = used_cells(self.base(), segments);
        let allocated = self.get_allocated_memory_units(segments, current_step)?;

        if used > allocated {
            return Err(BuiltinError::InsufficientAllocatedCellsForBuiltin {
                builtin: self.name(),
                used,
                allocated,
            });
        }

        Ok((used, allocated))
    }

    /// Returns the smallest and largest 16-bit parts observed by the builtin, if it
    /// participates in range checks.
    fn get_range_check_usage(&self, _memory: &Memory) -> Option<(usize, usize)> {
        None
    }

    /// Returns the number of diluted-check units used by the builtin for the provided
    /// diluted pool shape.
    fn get_used_diluted_check_units(&self, _spacing: usize, _n_bits: usize) -> usize {
        0
    }

    /// Returns the number of range-check units the builtin consumes from the layout's
    /// permanent range-check allocation.
    fn get_used_perm_range_check_limits(
        &self,
        _segments: &SegmentManager,
        _current_step: usize,
    ) -> Result<usize, BuiltinError> {
        Ok(0)
    }

    /// Returns every address of the builtin's segment, for memory-access accounting.
    fn get_memory_accesses(&self, segments: &SegmentManager) -> Vec<Pointer> {
        let base = self.base();
        let size = segments
            .get_segment_size(base.segment as usize)
            .unwrap_or(0);
        (0..size).map(|offset| base + offset).collect()
    }

    /// Returns the number of complete or partial instances written to the builtin's
    /// segment.
    fn get_used_instances(&self, segments: &SegmentManager) -> usize {
        used_cells(self.base(), segments).div_ceil(self.cells_per_instance())
    }
}

/// Returns the number of cells used in the segment starting at `base`.
pub(crate) fn used_cells(base: Pointer, segments: &SegmentManager) -> usize {
    segments
        .get_segment_used_size(base.segment as usize)
        .unwrap_or(0)
}

/// Computes the number of cells a ratio-driven builtin is allocated after
/// `current_step` steps.
///
/// A zero ratio means the builtin belongs to a dynamic layout, which allocates exactly
/// the used instances rounded up to a power of two.
pub(crate) fn ratio_allocated_units(
    name: &'static str,
    ratio: usize,
    cells_per_instance: usize,
    base: Pointer,
    segments: &SegmentManager,
    current_step: usize,
) -> Result<usize, BuiltinError> {
    if ratio == 0 {
        let instances = used_cells(base, segments) / cells_per_instance;
        return Ok(cells_per_instance * instances.next_power_of_two());
    }

    if current_step < ratio {
        return Err(BuiltinError::MinStepNotReached {
            builtin: name,
            min_step: ratio,
        });
    }

    if current_step % ratio != 0 {
        return Err(BuiltinError::StepsNotDivisibleByRatio {
            builtin: name,
            steps: current_step,
            ratio,
        });
    }

    Ok(cells_per_instance * (current_step / ratio))
}

/// Consumes a builtin's stop pointer from the return stack.
///
/// For an included builtin, the cell right below `pointer` must hold a pointer into the
/// builtin's segment whose offset equals `used`; the returned pointer is the address of
/// that cell. For an excluded builtin the stack is left untouched.
pub(crate) fn consume_stop_pointer(
    name: &'static str,
    base: Pointer,
    used: usize,
    included: bool,
    segments: &SegmentManager,
    pointer: Pointer,
) -> Result<(Pointer, usize), BuiltinError> {
    if !included {
        return Ok((pointer, 0));
    }

    let stop_ptr_addr = pointer
        .checked_add_signed(-1)
        .ok_or(BuiltinError::NoStopPointer(name))?;

    let stop_ptr = segments.memory.get_pointer(stop_ptr_addr)?;

    if stop_ptr.segment != base.segment {
        return Err(BuiltinError::InvalidStopPointerIndex {
            builtin: name,
            found: stop_ptr.segment,
            expected: base.segment,
        });
    }

    if stop_ptr.offset != used {
        return Err(BuiltinError::InvalidStopPointer {
            builtin: name,
            found: stop_ptr.offset,
            expected: used,
        });
    }

    Ok((stop_ptr_addr, stop_ptr.offset))
}
