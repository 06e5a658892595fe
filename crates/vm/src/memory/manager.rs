//! Defines the [`SegmentManager`] type, responsible for segment bookkeeping on top of the
//! raw [`Memory`] store: effective sizes, finalized sizes and public memory, and the
//! relocation of the segmented address space into a flat one.

use std::collections::HashMap;

use starknet_types_core::felt::Felt;

use crate::error::MemoryError;

use super::{Memory, Pointer, Value};

/// Owns the [`Memory`] of a virtual machine and tracks everything needed to collapse the
/// segmented address space into a contiguous one once execution has finished.
#[derive(Default, Debug)]
pub struct SegmentManager {
    /// The memory managed by this instance.
    pub memory: Memory,
    /// The effective (used) size of every segment, computed on demand after execution.
    segment_used_sizes: Option<Vec<usize>>,
    /// Sizes imposed at finalization time, overriding the effective sizes.
    segment_sizes: HashMap<usize, usize>,
    /// The public memory offsets declared for each finalized segment.
    public_memory_offsets: HashMap<usize, Vec<usize>>,
}

impl SegmentManager {
    /// Creates a new [`SegmentManager`] with an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of segments allocated so far.
    #[inline(always)]
    pub fn num_segments(&self) -> usize {
        self.memory.num_segments()
    }

    /// Allocates a new segment and returns a pointer to its base.
    pub fn add(&mut self) -> Pointer {
        self.memory.add_segment()
    }

    /// Allocates a new temporary segment and returns its (negative-indexed) base.
    pub fn add_temporary(&mut self) -> Pointer {
        self.memory.add_temporary_segment()
    }

    /// Writes `data` into consecutive cells starting at `base`, returning the first
    /// address past the written data.
    pub fn load_data(&mut self, base: Pointer, data: &[Value]) -> Result<Pointer, MemoryError> {
        for (index, value) in data.iter().enumerate() {
            self.memory.insert(base + index, *value)?;
        }
        Ok(base + data.len())
    }

    /// Computes and caches the effective size of every segment.
    ///
    /// The effective size of a segment is one past its highest known cell. Sizes are
    /// recomputed on every call, so accounting that runs while execution keeps going
    /// (the proof-mode padding loop) can refresh them.
    pub fn compute_effective_sizes(&mut self) -> &Vec<usize> {
        let sizes = (0..self.memory.num_segments())
            .map(|index| {
                self.memory
                    .segment(index as isize)
                    .map_or(0, |segment| segment.len())
            })
            .collect();

        self.segment_used_sizes.insert(sizes)
    }

    /// Returns the used size of the provided segment, if effective sizes have been
    /// computed.
    pub fn get_segment_used_size(&self, index: usize) -> Option<usize> {
        self.segment_used_sizes.as_ref()?.get(index).copied()
    }

    /// Returns the size of the provided segment, preferring a finalized size over the
    /// effective one.
    pub fn get_segment_size(&self, index: usize) -> Option<usize> {
        self.segment_sizes
            .get(&index)
            .copied()
            .or_else(|| self.get_segment_used_size(index))
    }

    /// Finalizes a segment with an optional imposed size and an optional list of public
    /// memory offsets.
    pub fn finalize(
        &mut self,
        index: usize,
        size: Option<usize>,
        public_memory: Option<&[usize]>,
    ) {
        if let Some(size) = size {
            self.segment_sizes.insert(index, size);
        }
        self.public_memory_offsets
            .insert(index, public_memory.map(<[usize]>::to_vec).unwrap_or_default());
    }

    /// Returns the public memory offsets recorded for the provided segment.
    pub fn public_memory_offsets(&self, index: usize) -> Option<&Vec<usize>> {
        self.public_memory_offsets.get(&index)
    }

    /// Builds the relocation base table.
    ///
    /// Segment 0 is assigned base address 1, and every subsequent segment starts right
    /// after the previous one. The returned table carries one extra trailing entry: the
    /// first address past the relocated memory.
    pub fn relocate_segments(&self) -> Result<Vec<usize>, MemoryError> {
        let sizes = self
            .segment_used_sizes
            .as_ref()
            .ok_or(MemoryError::EffectiveSizesNotComputed)?;

        let mut bases = Vec::with_capacity(sizes.len() + 1);
        let mut base = 1;
        for size in sizes {
            bases.push(base);
            base += size;
        }
        bases.push(base);

        Ok(bases)
    }

    /// Resolves a segmented value into its flat representation.
    ///
    /// Felts are unchanged; pointers become the felt `bases[segment] + offset`.
    pub fn relocate_value(value: &Value, bases: &[usize]) -> Result<Felt, MemoryError> {
        match value {
            Value::Scalar(felt) => Ok(*felt),
            Value::Pointer(pointer) => {
                if pointer.segment < 0 {
                    return Err(MemoryError::TemporarySegmentInRelocation(pointer.segment));
                }
                let base = bases
                    .get(pointer.segment as usize)
                    .ok_or(MemoryError::UnallocatedSegment {
                        segment: pointer.segment,
                        num_segments: bases.len().saturating_sub(1),
                    })?;
                Ok(Felt::from((base + pointer.offset) as u64))
            }
        }
    }

    /// Collapses the segmented memory into a flat address space.
    ///
    /// The returned vector is indexed by flat address; address 0 is never populated, and
    /// holes within segments read as `None`.
    pub fn relocate_memory(&self, bases: &[usize]) -> Result<Vec<Option<Felt>>, MemoryError> {
        let total = bases.last().copied().unwrap_or(1);
        let mut relocated = vec![None; total];

        for index in 0..self.memory.num_segments() {
            let Some(segment) = self.memory.segment(index as isize) else {
                continue;
            };
            let base = bases[index];
            for (offset, value) in segment.iter_known() {
                relocated[base + offset] = Some(Self::relocate_value(value, bases)?);
            }
        }

        Ok(relocated)
    }

    /// Counts the memory holes of the run: cells lying below their segment's effective
    /// size that were never accessed by the interpreter.
    ///
    /// Builtin segments are excluded: their cells are deduced on demand and legitimately
    /// sparse. The runner allocates builtin segments contiguously starting at
    /// `first_builtin_segment`.
    pub fn get_memory_holes(
        &self,
        first_builtin_segment: usize,
        builtin_count: usize,
    ) -> Result<usize, MemoryError> {
        let sizes = self
            .segment_used_sizes
            .as_ref()
            .ok_or(MemoryError::EffectiveSizesNotComputed)?;

        let builtin_segments = first_builtin_segment..first_builtin_segment + builtin_count;

        let mut holes = 0;
        for (index, size) in sizes.iter().enumerate() {
            if builtin_segments.contains(&index) {
                continue;
            }
            let accessed = self
                .memory
                .segment(index as isize)
                .map_or(0, |segment| segment.accessed_count());
            holes += size.saturating_sub(accessed);
        }

        Ok(holes)
    }
}
