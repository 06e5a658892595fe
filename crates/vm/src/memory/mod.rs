//! Defines the [`Memory`] type, responsible for representing the memory of a Cairo virtual
//! machine.
//!
//! # Immutable Memory
//!
//! Note that the memory of a Cairo virtual machine does not work in the same way regular
//! computer memory does. Instead, it is mathematically immutable, and every operation that
//! would normally mutate memory instead *asserts* a memory cell to a specific value. The
//! value was previously unknown, and now it is defined to a specific value. Any access to
//! that memory cell must now confirm its value is the same as the one it was asserted to.
//!
//! # Segments
//!
//! Each cell of the memory holds an element of a field (in this case, the Starknet field
//! is used). Because it is not possible to represent an address space of that size in a
//! regular computer's memory, Cairo programs split their memory into *segments*. Each
//! segment is a contiguous block of memory that is located *somewhere* in the virtual
//! machine's address space. The final location of segments is not decided until the
//! program has finished running, meaning that a program can never rely on the final
//! location of a segment.
//!
//! Negative segment indices reference *temporary* segments, whose cells are admitted but
//! never relocated by this crate.
//!
//! # Validation
//!
//! A segment may carry at most one *validation rule*, installed by the builtin that owns
//! the segment. The rule is invoked on every successful insertion into the segment and
//! returns the set of addresses it considers validated; validated addresses are memoized
//! and never revalidated.

mod manager;
mod pointer;
mod segment;
mod value;

pub use self::manager::*;
pub use self::pointer::*;
pub use self::segment::*;
pub use self::value::*;

use std::collections::HashSet;
use std::rc::Rc;

use starknet_types_core::felt::Felt;

use crate::error::{BuiltinError, MemoryError};

/// A validation rule attached to a segment.
///
/// The rule receives the memory and the address of a freshly inserted cell, and returns
/// the set of addresses it considers validated.
pub type ValidationRule = dyn Fn(&Memory, Pointer) -> Result<Vec<Pointer>, BuiltinError>;

/// Represents the memory of the Cairo virtual machine.
///
/// More information on memory can be found in the [module-level documentation](self).
#[derive(Default, Clone)]
pub struct Memory {
    /// The segments that have been allocated in the memory.
    segments: Vec<Segment>,
    /// The temporary segments that have been allocated in the memory.
    ///
    /// Temporary segment `-1` lives at index `0`, `-2` at index `1`, and so on.
    temp_segments: Vec<Segment>,
    /// The validation rules installed on regular segments, indexed by segment.
    validation_rules: Vec<Option<Rc<ValidationRule>>>,
    /// The addresses that have already been validated by a validation rule.
    validated: HashSet<Pointer>,
}

impl Memory {
    /// Creates a new empty [`Memory`] with no allocated segment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of regular segments allocated in the memory.
    #[inline(always)]
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Returns the number of temporary segments allocated in the memory.
    #[inline(always)]
    pub fn num_temp_segments(&self) -> usize {
        self.temp_segments.len()
    }

    /// Allocates a new segment and returns a pointer to its base.
    pub fn add_segment(&mut self) -> Pointer {
        let base = Pointer::new(self.segments.len() as isize, 0);
        self.segments.push(Segment::new());
        self.validation_rules.push(None);
        base
    }

    /// Allocates a new temporary segment and returns a pointer to its base.
    ///
    /// Temporary segments are identified by negative segment indices.
    pub fn add_temporary_segment(&mut self) -> Pointer {
        self.temp_segments.push(Segment::new());
        Pointer::new(-(self.temp_segments.len() as isize), 0)
    }

    /// Returns the [`Segment`] referenced by the provided index, if it has been allocated.
    pub fn segment(&self, index: isize) -> Option<&Segment> {
        if index < 0 {
            self.temp_segments.get((-index - 1) as usize)
        } else {
            self.segments.get(index as usize)
        }
    }

    fn segment_mut(&mut self, index: isize) -> Option<&mut Segment> {
        if index < 0 {
            self.temp_segments.get_mut((-index - 1) as usize)
        } else {
            self.segments.get_mut(index as usize)
        }
    }

    /// Asserts that the memory cell at `addr` holds `value`.
    ///
    /// The target segment must have been allocated beforehand. Asserting a cell that
    /// already holds a different value is a write-once violation and fails with
    /// [`MemoryError::InconsistentMemory`], leaving memory unchanged.
    ///
    /// On success, the segment's validation rule (if any) runs on the inserted address.
    pub fn insert(&mut self, addr: Pointer, value: impl Into<Value>) -> Result<(), MemoryError> {
        let value = value.into();
        let num_segments = self.segments.len();

        let segment = self
            .segment_mut(addr.segment)
            .ok_or(MemoryError::UnallocatedSegment {
                segment: addr.segment,
                num_segments,
            })?;

        segment
            .assert_eq(addr.offset, value)
            .map_err(|existing| MemoryError::InconsistentMemory {
                at: addr,
                existing,
                attempted: value,
            })?;

        self.validate_cell(addr)
            .map_err(|err| MemoryError::ValidationFailed(Box::new(err)))
    }

    /// Returns the value asserted at `addr`, if any.
    ///
    /// An unknown cell and an unallocated segment both read as "absent"; only insertions
    /// distinguish the two.
    pub fn get(&self, addr: Pointer) -> Option<&Value> {
        self.segment(addr.segment)?.get(addr.offset)
    }

    /// Returns the felt asserted at `addr`.
    pub fn get_felt(&self, addr: Pointer) -> Result<Felt, MemoryError> {
        match self.get(addr) {
            Some(Value::Scalar(felt)) => Ok(*felt),
            Some(Value::Pointer(_)) => Err(MemoryError::ExpectedFelt(addr)),
            None => Err(MemoryError::UnknownMemoryCell(addr)),
        }
    }

    /// Returns the pointer asserted at `addr`.
    pub fn get_pointer(&self, addr: Pointer) -> Result<Pointer, MemoryError> {
        match self.get(addr) {
            Some(Value::Pointer(pointer)) => Ok(*pointer),
            Some(Value::Scalar(_)) => Err(MemoryError::ExpectedRelocatable(addr)),
            None => Err(MemoryError::UnknownMemoryCell(addr)),
        }
    }

    /// Installs a validation rule on the provided segment.
    ///
    /// Each segment carries at most one rule; installing a second rule replaces the
    /// first.
    pub fn add_validation_rule(&mut self, segment: usize, rule: Rc<ValidationRule>) {
        if segment >= self.validation_rules.len() {
            self.validation_rules.resize(segment + 1, None);
        }
        self.validation_rules[segment] = Some(rule);
    }

    /// Runs the segment validation rules against every known cell of the memory.
    ///
    /// Cells that have already been validated are skipped.
    pub fn validate_existing_memory(&mut self) -> Result<(), BuiltinError> {
        for segment in 0..self.segments.len() {
            let Some(rule) = self.validation_rules[segment].clone() else {
                continue;
            };

            let pending: Vec<Pointer> = self.segments[segment]
                .iter_known()
                .map(|(offset, _)| Pointer::new(segment as isize, offset))
                .filter(|addr| !self.validated.contains(addr))
                .collect();

            for addr in pending {
                let validated = rule(self, addr)?;
                self.validated.extend(validated);
            }
        }

        Ok(())
    }

    /// Marks the cell at `addr` as accessed by the interpreter.
    ///
    /// Accessed cells are accounted when counting memory holes. Marking a cell in an
    /// unallocated segment is a no-op.
    pub fn mark_accessed(&mut self, addr: Pointer) {
        if let Some(segment) = self.segment_mut(addr.segment) {
            segment.mark_accessed(addr.offset);
        }
    }

    /// Returns whether the provided address has been validated by a validation rule.
    pub fn is_validated(&self, addr: Pointer) -> bool {
        self.validated.contains(&addr)
    }

    /// Runs the validation rule covering `addr`, if any, memoizing the validated set.
    fn validate_cell(&mut self, addr: Pointer) -> Result<(), BuiltinError> {
        if addr.segment < 0 || self.validated.contains(&addr) {
            return Ok(());
        }

        let Some(Some(rule)) = self.validation_rules.get(addr.segment as usize) else {
            return Ok(());
        };

        let rule = Rc::clone(rule);
        let validated = rule(self, addr)?;
        self.validated.extend(validated);
        Ok(())
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memory")
            .field("segments", &self.segments.len())
            .field("temp_segments", &self.temp_segments.len())
            .field("validated", &self.validated.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_always_ok() -> Rc<ValidationRule> {
        Rc::new(|_, addr| Ok(vec![addr]))
    }

    fn rule_always_err() -> Rc<ValidationRule> {
        Rc::new(|_, addr| {
            Err(BuiltinError::NotAFelt {
                builtin: "test",
                at: addr,
            })
        })
    }

    #[test]
    fn insert_into_unallocated_segment_fails() {
        let mut memory = Memory::new();
        let err = memory.insert(Pointer::new(0, 0), 5u64).unwrap_err();
        assert_eq!(
            err,
            MemoryError::UnallocatedSegment {
                segment: 0,
                num_segments: 0
            }
        );
    }

    #[test]
    fn insert_and_get() {
        let mut memory = Memory::new();
        memory.add_segment();
        memory.add_segment();
        let addr = Pointer::new(1, 0);
        memory.insert(addr, 5u64).unwrap();
        assert_eq!(memory.get(addr), Some(&Value::from(5u64)));
    }

    #[test]
    fn insert_with_holes() {
        let mut memory = Memory::new();
        memory.add_segment();
        memory.add_segment();
        let addr = Pointer::new(1, 2);
        memory.insert(addr, 5u64).unwrap();
        assert_eq!(memory.get(addr), Some(&Value::from(5u64)));
        assert_eq!(memory.get(Pointer::new(1, 0)), None);
    }

    #[test]
    fn write_once_violation() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.insert(base, 7u64).unwrap();
        // Same value is a no-op success.
        memory.insert(base, 7u64).unwrap();
        // A different value is a contradiction, and memory is unchanged.
        let err = memory.insert(base, 8u64).unwrap_err();
        assert!(matches!(err, MemoryError::InconsistentMemory { .. }));
        assert_eq!(memory.get(base), Some(&Value::from(7u64)));
    }

    #[test]
    fn temporary_segments_are_addressable() {
        let mut memory = Memory::new();
        let base = memory.add_temporary_segment();
        assert_eq!(base, Pointer::new(-1, 0));
        memory.insert(base, 3u64).unwrap();
        assert_eq!(memory.get(base), Some(&Value::from(3u64)));
    }

    #[test]
    fn validation_rule_runs_on_insert() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.add_validation_rule(0, rule_always_ok());
        memory.insert(base, 5u64).unwrap();
        assert!(memory.is_validated(base));
    }

    #[test]
    fn failing_validation_rule_rejects_insert() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.add_validation_rule(0, rule_always_err());
        assert!(memory.insert(base, 5u64).is_err());
    }

    #[test]
    fn validate_existing_memory_covers_preloaded_cells() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.insert(base, 5u64).unwrap();
        memory.add_validation_rule(0, rule_always_ok());
        assert!(!memory.is_validated(base));
        memory.validate_existing_memory().unwrap();
        assert!(memory.is_validated(base));
    }

    #[test]
    fn typed_getters() {
        let mut memory = Memory::new();
        let base = memory.add_segment();
        memory.insert(base, 5u64).unwrap();
        memory.insert(base + 1, Pointer::new(0, 0)).unwrap();

        assert_eq!(memory.get_felt(base), Ok(Felt::from(5u64)));
        assert_eq!(
            memory.get_felt(base + 1),
            Err(MemoryError::ExpectedFelt(base + 1))
        );
        assert_eq!(memory.get_pointer(base + 1), Ok(Pointer::new(0, 0)));
        assert_eq!(
            memory.get_pointer(base),
            Err(MemoryError::ExpectedRelocatable(base))
        );
        assert_eq!(
            memory.get_felt(base + 2),
            Err(MemoryError::UnknownMemoryCell(base + 2))
        );
    }
}
