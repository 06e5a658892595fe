//! Binary encodings of the relocated trace and memory.
//!
//! Both encodings are fixed-width little-endian records:
//!
//! - The trace file holds one `(ap, fp, pc)` triple of unsigned 64-bit integers per
//!   executed step.
//! - The memory file holds one `(address, value)` pair per populated flat address, the
//!   address as an unsigned 64-bit integer and the value as a 32-byte field element.
//!   Pairs are emitted in ascending address order and holes are omitted.

use std::io::{self, Write};

use starknet_types_core::felt::Felt;

use crate::trace::RelocatedTraceEntry;

/// Writes the relocated trace in its binary encoding.
pub fn write_encoded_trace(
    trace: &[RelocatedTraceEntry],
    writer: &mut impl Write,
) -> io::Result<()> {
    for entry in trace {
        writer.write_all(&(entry.ap as u64).to_le_bytes())?;
        writer.write_all(&(entry.fp as u64).to_le_bytes())?;
        writer.write_all(&(entry.pc as u64).to_le_bytes())?;
    }

    Ok(())
}

/// Writes the relocated memory in its binary encoding.
///
/// `memory` is indexed by flat address, as produced by
/// [`SegmentManager::relocate_memory`](crate::memory::SegmentManager::relocate_memory).
pub fn write_encoded_memory(
    memory: &[Option<Felt>],
    writer: &mut impl Write,
) -> io::Result<()> {
    for (address, value) in memory.iter().enumerate() {
        let Some(value) = value else { continue };
        writer.write_all(&(address as u64).to_le_bytes())?;
        writer.write_all(&value.to_bytes_le())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_encoding_is_24_bytes_per_entry() {
        let trace = [
            RelocatedTraceEntry { pc: 1, ap: 9, fp: 9 },
            RelocatedTraceEntry {
                pc: 3,
                ap: 10,
                fp: 9,
            },
        ];

        let mut encoded = Vec::new();
        write_encoded_trace(&trace, &mut encoded).unwrap();

        assert_eq!(encoded.len(), 48);
        // Each record is (ap, fp, pc), little endian.
        assert_eq!(&encoded[0..8], &9u64.to_le_bytes());
        assert_eq!(&encoded[8..16], &9u64.to_le_bytes());
        assert_eq!(&encoded[16..24], &1u64.to_le_bytes());
        assert_eq!(&encoded[24..32], &10u64.to_le_bytes());
    }

    #[test]
    fn memory_encoding_skips_holes() {
        let memory = [
            None,
            Some(Felt::from(7u64)),
            None,
            Some(Felt::from(1u64) - Felt::from(2u64)),
        ];

        let mut encoded = Vec::new();
        write_encoded_memory(&memory, &mut encoded).unwrap();

        // Two pairs of 8 + 32 bytes.
        assert_eq!(encoded.len(), 80);
        assert_eq!(&encoded[0..8], &1u64.to_le_bytes());
        assert_eq!(encoded[8], 7);
        assert_eq!(&encoded[40..48], &3u64.to_le_bytes());
        // -1 is P - 1, whose little-endian encoding starts with P's low limb minus one.
        assert_eq!(encoded[48], 0);
    }
}
