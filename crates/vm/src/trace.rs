//! Defines the execution trace of the virtual machine.
//!
//! The trace is the ordered sequence of register snapshots taken before every executed
//! step. Together with the relocated memory it forms the witness handed to the prover.

use crate::error::MemoryError;
use crate::memory::Pointer;

/// A snapshot of the three registers, taken right before a step's register update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceEntry {
    /// The **Program Counter** at the beginning of the step.
    pub pc: Pointer,
    /// The **Allocation Pointer** at the beginning of the step.
    pub ap: Pointer,
    /// The **Frame Pointer** at the beginning of the step.
    pub fp: Pointer,
}

/// A [`TraceEntry`] whose registers have been resolved to flat addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocatedTraceEntry {
    /// The relocated **Program Counter**.
    pub pc: usize,
    /// The relocated **Allocation Pointer**.
    pub ap: usize,
    /// The relocated **Frame Pointer**.
    pub fp: usize,
}

/// Resolves every entry of a trace against the provided relocation base table.
pub fn relocate_trace(
    trace: &[TraceEntry],
    bases: &[usize],
) -> Result<Vec<RelocatedTraceEntry>, MemoryError> {
    trace
        .iter()
        .map(|entry| {
            Ok(RelocatedTraceEntry {
                pc: relocate_register(entry.pc, bases)?,
                ap: relocate_register(entry.ap, bases)?,
                fp: relocate_register(entry.fp, bases)?,
            })
        })
        .collect()
}

/// Resolves a single register value to its flat address.
fn relocate_register(pointer: Pointer, bases: &[usize]) -> Result<usize, MemoryError> {
    if pointer.segment < 0 {
        return Err(MemoryError::TemporarySegmentInRelocation(pointer.segment));
    }

    let base = bases
        .get(pointer.segment as usize)
        .ok_or(MemoryError::UnallocatedSegment {
            segment: pointer.segment,
            num_segments: bases.len().saturating_sub(1),
        })?;

    Ok(base + pointer.offset)
}
