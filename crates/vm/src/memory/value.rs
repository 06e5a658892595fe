//! Defines the [`Value`] type.

use std::fmt;

use num_traits::Zero;
use starknet_types_core::felt::{Felt, NonZeroFelt};

use crate::error::MemoryError;

use super::Pointer;

/// A value that may be stored in a [`Memory`](super::Memory) segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    /// A scalar with no provenance information.
    ///
    /// In that case, the value simply carries a specific field element without any more
    /// information.
    Scalar(Felt),
    /// A pointer with an associated segment.
    ///
    /// In that case, the value is actually a pointer within a specific segment.
    Pointer(Pointer),
}

impl Value {
    /// Attempts to add two [`Value`]s.
    ///
    /// Scalar + scalar yields a scalar, pointer + scalar (in either order) moves the
    /// pointer forward, and pointer + pointer is not defined.
    pub fn add(&self, other: &Self) -> Result<Self, MemoryError> {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => Ok(Self::Scalar(left + right)),
            (Self::Scalar(left), Self::Pointer(right)) => right.add_felt(left).map(Self::Pointer),
            (Self::Pointer(left), Self::Scalar(right)) => left.add_felt(right).map(Self::Pointer),
            (Self::Pointer(_), Self::Pointer(_)) => Err(MemoryError::InvalidPointerArithmetic),
        }
    }

    /// Attempts to subtract two [`Value`]s.
    ///
    /// Subtracting a pointer from a scalar is not defined, and subtracting two pointers is
    /// only defined within a single segment.
    pub fn subtract(&self, other: &Self) -> Result<Self, MemoryError> {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => Ok(Self::Scalar(left - right)),
            (Self::Scalar(_), Self::Pointer(_)) => Err(MemoryError::InvalidPointerArithmetic),
            (Self::Pointer(left), Self::Scalar(right)) => left.sub_felt(right).map(Self::Pointer),
            (Self::Pointer(left), Self::Pointer(right)) => left
                .subtract(right)
                .map(|dist| Self::Scalar(Felt::from(dist as u64))),
        }
    }

    /// Attempts to multiply two values.
    ///
    /// Only scalars can be multiplied.
    pub fn multiply(&self, other: &Self) -> Result<Self, MemoryError> {
        match (self, other) {
            (Self::Scalar(left), Self::Scalar(right)) => Ok(Self::Scalar(left * right)),
            _ => Err(MemoryError::InvalidPointerArithmetic),
        }
    }

    /// Attempts to divide two values.
    ///
    /// Only scalars can be divided, and the divisor must not be zero. Division is field
    /// division: `(a / b) * b == a` for any non-zero `b`.
    pub fn divide(&self, other: &Self) -> Result<Self, MemoryError> {
        match (self, other) {
            (Self::Scalar(n), Self::Scalar(d)) => match NonZeroFelt::try_from(*d) {
                Ok(d) => Ok(Self::Scalar(n.field_div(&d))),
                Err(_) => Err(MemoryError::DivideByZero),
            },
            _ => Err(MemoryError::InvalidPointerArithmetic),
        }
    }

    /// Attempts to view this value as a scalar.
    #[inline(always)]
    pub const fn scalar(&self) -> Option<&Felt> {
        match self {
            Self::Scalar(element) => Some(element),
            Self::Pointer(_) => None,
        }
    }

    /// Attempts to view this value as a pointer.
    #[inline(always)]
    pub const fn pointer(&self) -> Option<&Pointer> {
        match self {
            Self::Scalar(_) => None,
            Self::Pointer(pointer) => Some(pointer),
        }
    }

    /// Returns whether this [`Value`] equals the scalar zero.
    ///
    /// Pointers are never zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Scalar(value) => value.is_zero(),
            Self::Pointer(_) => false,
        }
    }
}

impl From<Felt> for Value {
    #[inline(always)]
    fn from(value: Felt) -> Self {
        Self::Scalar(value)
    }
}

impl From<u64> for Value {
    #[inline(always)]
    fn from(value: u64) -> Self {
        Self::Scalar(Felt::from(value))
    }
}

impl From<Pointer> for Value {
    #[inline(always)]
    fn from(value: Pointer) -> Self {
        Self::Pointer(value)
    }
}

impl PartialEq<Pointer> for Value {
    fn eq(&self, other: &Pointer) -> bool {
        match self {
            Self::Scalar(_) => false,
            Self::Pointer(pointer) => pointer == other,
        }
    }
}

impl PartialEq<Felt> for Value {
    fn eq(&self, other: &Felt) -> bool {
        match self {
            Self::Scalar(value) => value == other,
            Self::Pointer(_) => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => write!(f, "{value}"),
            Self::Pointer(pointer) => write!(f, "{pointer}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_addition() {
        let a = Value::from(Felt::from(2u64));
        let b = Value::from(Felt::from(3u64));
        assert_eq!(a.add(&b), Ok(Value::from(Felt::from(5u64))));
    }

    #[test]
    fn felt_plus_pointer_commutes() {
        let k = Value::from(Felt::from(4u64));
        let p = Value::from(Pointer::new(2, 1));
        let expected = Value::from(Pointer::new(2, 5));
        assert_eq!(k.add(&p), Ok(expected));
        assert_eq!(p.add(&k), Ok(expected));
    }

    #[test]
    fn pointer_plus_pointer_fails() {
        let p = Value::from(Pointer::new(1, 0));
        assert_eq!(p.add(&p), Err(MemoryError::InvalidPointerArithmetic));
    }

    #[test]
    fn pointer_difference_is_scalar() {
        let a = Value::from(Pointer::new(1, 9));
        let b = Value::from(Pointer::new(1, 4));
        assert_eq!(a.subtract(&b), Ok(Value::from(Felt::from(5u64))));
    }

    #[test]
    fn scalar_minus_pointer_fails() {
        let a = Value::from(Felt::from(9u64));
        let b = Value::from(Pointer::new(1, 4));
        assert_eq!(a.subtract(&b), Err(MemoryError::InvalidPointerArithmetic));
    }

    #[test]
    fn field_division_round_trips() {
        let a = Value::from(Felt::from(7u64));
        let b = Value::from(Felt::from(3u64));
        let q = a.divide(&b).unwrap();
        assert_eq!(q.multiply(&b), Ok(a));
    }

    #[test]
    fn division_by_zero_fails() {
        let a = Value::from(Felt::from(7u64));
        let zero = Value::from(Felt::ZERO);
        assert_eq!(a.divide(&zero), Err(MemoryError::DivideByZero));
    }

    #[test]
    fn zero_check() {
        assert!(Value::from(Felt::ZERO).is_zero());
        assert!(!Value::from(Felt::ONE).is_zero());
        assert!(!Value::from(Pointer::new(0, 0)).is_zero());
    }
}
