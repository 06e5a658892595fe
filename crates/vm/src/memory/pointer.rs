//! Defines the [`Pointer`] type.

use std::fmt;

use num_traits::ToPrimitive;
use starknet_types_core::felt::Felt;

use crate::error::MemoryError;

/// A pointer within a [`Memory`](super::Memory) segment.
///
/// Segment indices are signed: non-negative indices reference regular segments, while
/// negative indices reference temporary segments whose final location is deferred until
/// relocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer {
    /// The index of the segment in the memory.
    ///
    /// This can be thought of as the provenance of the pointer.
    pub segment: isize,
    /// The offset within the segment.
    pub offset: usize,
}

impl Pointer {
    /// Creates a new [`Pointer`] from a segment index and an offset.
    #[inline(always)]
    pub const fn new(segment: isize, offset: usize) -> Self {
        Self { segment, offset }
    }

    /// Returns the distance between `self` and `other`, given that both refer to the same
    /// segment and that `other` does not lie past `self`.
    pub fn subtract(&self, other: &Self) -> Result<usize, MemoryError> {
        if self.segment != other.segment {
            Err(MemoryError::IncoherentProvenance)
        } else {
            self.offset
                .checked_sub(other.offset)
                .ok_or(MemoryError::NegativePointerOffset)
        }
    }

    /// Adds a felt to the offset of this pointer.
    pub fn add_felt(&self, rhs: &Felt) -> Result<Self, MemoryError> {
        let rhs = rhs.to_usize().ok_or(MemoryError::PointerTooLarge(*rhs))?;
        let offset = self
            .offset
            .checked_add(rhs)
            .ok_or(MemoryError::PointerTooLarge(Felt::from(rhs as u64)))?;
        Ok(Self::new(self.segment, offset))
    }

    /// Subtracts a felt from the offset of this pointer.
    pub fn sub_felt(&self, rhs: &Felt) -> Result<Self, MemoryError> {
        let rhs = rhs.to_usize().ok_or(MemoryError::PointerTooLarge(*rhs))?;
        let offset = self
            .offset
            .checked_sub(rhs)
            .ok_or(MemoryError::NegativePointerOffset)?;
        Ok(Self::new(self.segment, offset))
    }

    /// Applies a signed displacement to the offset of this pointer.
    ///
    /// Returns `None` when the resulting offset would be negative or would overflow the
    /// addressable range.
    #[inline]
    pub fn checked_add_signed(&self, rhs: isize) -> Option<Self> {
        self.offset
            .checked_add_signed(rhs)
            .map(|offset| Self::new(self.segment, offset))
    }
}

impl std::ops::Add<usize> for Pointer {
    type Output = Pointer;

    #[inline(always)]
    fn add(self, rhs: usize) -> Pointer {
        Pointer::new(self.segment, self.offset + rhs)
    }
}

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.segment, self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subtract_same_segment() {
        let a = Pointer::new(1, 7);
        let b = Pointer::new(1, 5);
        assert_eq!(a.subtract(&b), Ok(2));
    }

    #[test]
    fn subtract_underflow() {
        let a = Pointer::new(1, 5);
        let b = Pointer::new(1, 7);
        assert_eq!(a.subtract(&b), Err(MemoryError::NegativePointerOffset));
    }

    #[test]
    fn subtract_different_segments() {
        let a = Pointer::new(1, 5);
        let b = Pointer::new(2, 5);
        assert_eq!(a.subtract(&b), Err(MemoryError::IncoherentProvenance));
    }

    #[test]
    fn add_then_sub_felt_is_identity() {
        let p = Pointer::new(3, 11);
        let k = Felt::from(42u64);
        assert_eq!(p.add_felt(&k).unwrap().sub_felt(&k).unwrap(), p);
    }

    #[test]
    fn add_felt_too_large() {
        let p = Pointer::new(0, 0);
        assert!(matches!(
            p.add_felt(&(Felt::MAX - Felt::ONE)),
            Err(MemoryError::PointerTooLarge(_))
        ));
    }

    #[test]
    fn checked_add_signed_negative_result() {
        let p = Pointer::new(0, 1);
        assert_eq!(p.checked_add_signed(-2), None);
        assert_eq!(p.checked_add_signed(-1), Some(Pointer::new(0, 0)));
    }
}
