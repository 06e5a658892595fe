//! Defines the pre-step extension point of the virtual machine.
//!
//! Cairo programs may carry *hints*: scripted, non-provable computations attached to a
//! program counter that run right before the instruction at that counter executes,
//! typically to seed memory cells the instruction will then assert. The virtual machine
//! treats hint payloads as opaque; interpreting them is the job of an external
//! [`HintProcessor`] installed by the caller.

use std::collections::HashMap;

use crate::error::Error;
use crate::CairoVM;

/// An opaque hint payload, forwarded verbatim from the compiled program.
pub type HintData = serde_json::Value;

/// A processor invoked before each step for which the program registers hints.
///
/// Implementations may mutate the virtual machine's memory and the execution scopes;
/// the core makes no assumption about what a hint does.
pub trait HintProcessor {
    /// Executes a single hint registered at the current program counter.
    fn execute_hint(
        &mut self,
        vm: &mut CairoVM,
        scopes: &mut ExecutionScopes,
        hint: &HintData,
    ) -> Result<(), Error>;
}

/// An implementation of [`HintProcessor`] that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHintProcessor;

impl HintProcessor for NoopHintProcessor {
    fn execute_hint(
        &mut self,
        _vm: &mut CairoVM,
        _scopes: &mut ExecutionScopes,
        _hint: &HintData,
    ) -> Result<(), Error> {
        Ok(())
    }
}

/// A stack of name/value scopes shared by the hints of a run.
///
/// Hints communicate with each other through these scopes; the virtual machine itself
/// never reads them.
#[derive(Debug)]
pub struct ExecutionScopes {
    scopes: Vec<HashMap<String, HintData>>,
}

impl ExecutionScopes {
    /// Creates a new [`ExecutionScopes`] with a single root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    /// Pushes a fresh scope onto the stack.
    pub fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Pops the innermost scope.
    ///
    /// The root scope is never popped.
    pub fn exit_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Binds a value in the innermost scope.
    pub fn insert(&mut self, name: impl Into<String>, value: HintData) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), value);
        }
    }

    /// Looks a value up in the innermost scope binding it.
    pub fn get(&self, name: &str) -> Option<&HintData> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }
}

impl Default for ExecutionScopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_shadow_and_unwind() {
        let mut scopes = ExecutionScopes::new();
        scopes.insert("n", HintData::from(1));
        scopes.enter_scope();
        scopes.insert("n", HintData::from(2));
        assert_eq!(scopes.get("n"), Some(&HintData::from(2)));
        scopes.exit_scope();
        assert_eq!(scopes.get("n"), Some(&HintData::from(1)));
        // The root scope survives a spurious exit.
        scopes.exit_scope();
        assert_eq!(scopes.get("n"), Some(&HintData::from(1)));
    }
}
