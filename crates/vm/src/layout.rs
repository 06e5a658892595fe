//! Defines the proof layouts the virtual machine can run under.
//!
//! A layout fixes the set of builtins available to programs, their ratios (the number of
//! execution steps backing one builtin instance) and the accounting constants used by
//! proof mode to verify that enough cells were allocated for the executed step count.

use crate::builtin::{
    BitwiseBuiltinRunner, BuiltinRunner, OutputBuiltinRunner, PedersenBuiltinRunner,
    PoseidonBuiltinRunner, RangeCheckBuiltinRunner, BITWISE_BUILTIN_NAME, OUTPUT_BUILTIN_NAME,
    PEDERSEN_BUILTIN_NAME, POSEIDON_BUILTIN_NAME, RANGE_CHECK_BUILTIN_NAME,
    RANGE_CHECK_N_PARTS,
};
use crate::error::RunnerError;

/// The shape of a layout's diluted check pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DilutedPool {
    /// The number of diluted units available per execution step.
    pub units_per_step: usize,
    /// The spacing between consecutive bits of a diluted form.
    pub spacing: usize,
    /// The number of bits covered by one diluted form.
    pub n_bits: usize,
}

/// A builtin slot of a layout: which builtin, and with which instance parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutBuiltin {
    /// The output builtin.
    Output,
    /// The Pedersen hash builtin, with its step ratio.
    Pedersen {
        /// Steps per instance.
        ratio: usize,
    },
    /// The range-check builtin, with its step ratio and part count.
    RangeCheck {
        /// Steps per instance.
        ratio: usize,
        /// 16-bit parts per cell.
        n_parts: usize,
    },
    /// The bitwise builtin, with its step ratio.
    Bitwise {
        /// Steps per instance.
        ratio: usize,
    },
    /// The Poseidon hash builtin, with its step ratio.
    Poseidon {
        /// Steps per instance.
        ratio: usize,
    },
}

impl LayoutBuiltin {
    /// Returns the stable identifier of the builtin occupying this slot.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Output => OUTPUT_BUILTIN_NAME,
            Self::Pedersen { .. } => PEDERSEN_BUILTIN_NAME,
            Self::RangeCheck { .. } => RANGE_CHECK_BUILTIN_NAME,
            Self::Bitwise { .. } => BITWISE_BUILTIN_NAME,
            Self::Poseidon { .. } => POSEIDON_BUILTIN_NAME,
        }
    }

    /// Instantiates the runner described by this slot.
    pub(crate) fn instantiate(&self, included: bool) -> Box<dyn BuiltinRunner> {
        match *self {
            Self::Output => Box::new(OutputBuiltinRunner::new(included)),
            Self::Pedersen { ratio } => Box::new(PedersenBuiltinRunner::new(ratio, included)),
            Self::RangeCheck { ratio, n_parts } => {
                Box::new(RangeCheckBuiltinRunner::new(ratio, n_parts, included))
            }
            Self::Bitwise { ratio } => Box::new(BitwiseBuiltinRunner::new(ratio, included)),
            Self::Poseidon { ratio } => Box::new(PoseidonBuiltinRunner::new(ratio, included)),
        }
    }
}

/// A proof layout: the builtins it provides, in their canonical order, and its
/// accounting constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// The name of the layout.
    pub name: &'static str,
    /// The builtins provided by the layout, in the order their segments are laid out.
    pub builtins: Vec<LayoutBuiltin>,
    /// The number of range-check units available per step.
    pub rc_units: usize,
    /// The number of memory units available per step.
    pub memory_units_per_step: usize,
    /// The denominator of the fraction of memory units reserved for public memory.
    pub public_memory_fraction: usize,
    /// The diluted check pool of the layout, if it has one.
    pub diluted_pool: Option<DilutedPool>,
}

impl Layout {
    /// The `plain` layout: no builtins at all.
    pub fn plain() -> Self {
        Self {
            name: "plain",
            builtins: Vec::new(),
            rc_units: 16,
            memory_units_per_step: 8,
            public_memory_fraction: 4,
            diluted_pool: None,
        }
    }

    /// The `small` layout: output, Pedersen and range-check.
    pub fn small() -> Self {
        Self {
            name: "small",
            builtins: vec![
                LayoutBuiltin::Output,
                LayoutBuiltin::Pedersen { ratio: 8 },
                LayoutBuiltin::RangeCheck {
                    ratio: 8,
                    n_parts: RANGE_CHECK_N_PARTS,
                },
            ],
            rc_units: 16,
            memory_units_per_step: 8,
            public_memory_fraction: 4,
            diluted_pool: None,
        }
    }

    /// The `all_cairo` layout: every builtin this crate implements.
    pub fn all_cairo() -> Self {
        Self {
            name: "all_cairo",
            builtins: vec![
                LayoutBuiltin::Output,
                LayoutBuiltin::Pedersen { ratio: 256 },
                LayoutBuiltin::RangeCheck {
                    ratio: 8,
                    n_parts: RANGE_CHECK_N_PARTS,
                },
                LayoutBuiltin::Bitwise { ratio: 16 },
                LayoutBuiltin::Poseidon { ratio: 32 },
            ],
            rc_units: 4,
            memory_units_per_step: 8,
            public_memory_fraction: 8,
            diluted_pool: Some(DilutedPool {
                units_per_step: 16,
                spacing: 4,
                n_bits: 16,
            }),
        }
    }

    /// Resolves a layout by name.
    pub fn from_name(name: &str) -> Result<Self, RunnerError> {
        match name {
            "plain" => Ok(Self::plain()),
            "small" => Ok(Self::small()),
            "all_cairo" => Ok(Self::all_cairo()),
            _ => Err(RunnerError::InvalidLayoutName(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layouts_resolve_by_name() {
        assert_eq!(Layout::from_name("plain").unwrap(), Layout::plain());
        assert_eq!(Layout::from_name("small").unwrap(), Layout::small());
        assert_eq!(Layout::from_name("all_cairo").unwrap(), Layout::all_cairo());
        assert!(matches!(
            Layout::from_name("dex"),
            Err(RunnerError::InvalidLayoutName(_))
        ));
    }

    #[test]
    fn slots_instantiate_their_builtin() {
        for slot in Layout::all_cairo().builtins {
            let runner = slot.instantiate(true);
            assert_eq!(runner.name(), slot.name());
            assert!(runner.included());
        }
    }
}
