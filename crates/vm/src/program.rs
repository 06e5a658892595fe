//! Defines the [`Program`] type: the parsed form of a compiled Cairo program.

use std::collections::HashMap;
use std::path::Path;

use num_bigint::BigUint;
use serde::Deserialize;
use starknet_types_core::felt::Felt;

use crate::error::ProgramError;
use crate::hint::HintData;
use crate::memory::Value;

/// The identifier exposing the main entrypoint of a program.
const MAIN_IDENTIFIER: &str = "__main__.main";
/// The identifier exposing the bootstrapper entry offset, in proof mode.
const START_IDENTIFIER: &str = "__start__";
/// The identifier exposing the bootstrapper end offset, in proof mode.
const END_IDENTIFIER: &str = "__end__";

/// A compiled Cairo program, ready to be loaded by the
/// [`CairoRunner`](crate::runner::CairoRunner).
///
/// This is the parsed form of the JSON file produced by the Cairo compiler; only the
/// parts the virtual machine consumes are kept. Hints are carried verbatim for an
/// eventual [`HintProcessor`](crate::hint::HintProcessor) and are otherwise opaque.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// The program bytecode: instruction words and their immediate values.
    pub data: Vec<Value>,
    /// The builtins the program requires, in declaration order.
    pub builtins: Vec<String>,
    /// The offset of the `main` function within the bytecode, if the program has one.
    pub main: Option<usize>,
    /// The offset execution starts from in proof mode.
    pub start: Option<usize>,
    /// The offset execution ends at in proof mode.
    pub end: Option<usize>,
    /// The hints of the program, keyed by the bytecode offset they are attached to.
    pub hints: HashMap<usize, Vec<HintData>>,
}

impl Program {
    /// Creates a bare [`Program`] from its bytecode, builtins and main offset.
    pub fn new(data: Vec<Value>, builtins: Vec<String>, main: Option<usize>) -> Self {
        Self {
            data,
            builtins,
            main,
            ..Self::default()
        }
    }

    /// Parses a compiled program from its JSON serialization.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProgramError> {
        let json: ProgramJson = serde_json::from_slice(bytes)?;
        json.try_into()
    }

    /// Reads and parses a compiled program file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ProgramError> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

/// The raw JSON shape of a compiled program.
#[derive(Debug, Deserialize)]
struct ProgramJson {
    prime: String,
    data: Vec<String>,
    #[serde(default)]
    builtins: Vec<String>,
    #[serde(default)]
    identifiers: HashMap<String, Identifier>,
    #[serde(default)]
    hints: HashMap<String, Vec<HintData>>,
}

#[derive(Debug, Deserialize)]
struct Identifier {
    #[serde(default)]
    pc: Option<usize>,
}

impl TryFrom<ProgramJson> for Program {
    type Error = ProgramError;

    fn try_from(json: ProgramJson) -> Result<Self, ProgramError> {
        let prime = parse_biguint(&json.prime)
            .ok_or_else(|| ProgramError::PrimeMismatch(json.prime.clone()))?;
        if prime != field_prime() {
            return Err(ProgramError::PrimeMismatch(json.prime));
        }

        let data = json
            .data
            .iter()
            .map(|word| {
                Felt::from_hex(word)
                    .map(Value::from)
                    .map_err(|_| ProgramError::InvalidFelt(word.clone()))
            })
            .collect::<Result<Vec<Value>, ProgramError>>()?;

        let pc_of = |name: &str| json.identifiers.get(name).and_then(|id| id.pc);

        let hints = json
            .hints
            .into_iter()
            .filter_map(|(offset, hints)| Some((offset.parse::<usize>().ok()?, hints)))
            .collect();

        Ok(Program {
            data,
            builtins: json.builtins,
            main: pc_of(MAIN_IDENTIFIER),
            start: pc_of(START_IDENTIFIER),
            end: pc_of(END_IDENTIFIER),
            hints,
        })
    }
}

/// Returns the order of the field the virtual machine computes over.
fn field_prime() -> BigUint {
    Felt::MAX.to_biguint() + 1u32
}

/// Parses a decimal or `0x`-prefixed hexadecimal big integer.
fn parse_biguint(literal: &str) -> Option<BigUint> {
    match literal.strip_prefix("0x") {
        Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
        None => BigUint::parse_bytes(literal.as_bytes(), 10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIME: &str = "0x800000000000011000000000000000000000000000000000000000000000001";

    #[test]
    fn parses_a_minimal_program() {
        let json = format!(
            r#"{{
                "prime": "{PRIME}",
                "data": ["0x480680017fff8000", "0x2", "0x208b7fff7fff7ffe"],
                "builtins": ["output"],
                "identifiers": {{
                    "__main__.main": {{ "pc": 0, "type": "function" }}
                }}
            }}"#
        );

        let program = Program::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(program.data.len(), 3);
        assert_eq!(program.data[1], Value::from(2u64));
        assert_eq!(program.builtins, vec!["output".to_string()]);
        assert_eq!(program.main, Some(0));
        assert_eq!(program.start, None);
    }

    #[test]
    fn rejects_a_foreign_prime() {
        let json = r#"{
            "prime": "0x3",
            "data": [],
            "builtins": []
        }"#;

        assert!(matches!(
            Program::from_bytes(json.as_bytes()),
            Err(ProgramError::PrimeMismatch(_))
        ));
    }

    #[test]
    fn rejects_invalid_bytecode_words() {
        let json = format!(
            r#"{{
                "prime": "{PRIME}",
                "data": ["not-a-felt"],
                "builtins": []
            }}"#
        );

        assert!(matches!(
            Program::from_bytes(json.as_bytes()),
            Err(ProgramError::InvalidFelt(_))
        ));
    }

    #[test]
    fn collects_proof_mode_identifiers() {
        let json = format!(
            r#"{{
                "prime": "{PRIME}",
                "data": [],
                "builtins": [],
                "identifiers": {{
                    "__start__": {{ "pc": 0 }},
                    "__end__": {{ "pc": 4 }}
                }}
            }}"#
        );

        let program = Program::from_bytes(json.as_bytes()).unwrap();
        assert_eq!(program.start, Some(0));
        assert_eq!(program.end, Some(4));
    }
}
