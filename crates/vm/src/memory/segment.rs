//! Defines the [`Segment`] type.

use bitflags::bitflags;

use super::Value;

bitflags! {
    /// Metadata bits attached to a single memory cell.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct CellFlags: u8 {
        /// The cell has been asserted to a specific value.
        const KNOWN = 1 << 0;
        /// The cell has been read or written by the interpreter.
        const ACCESSED = 1 << 1;
    }
}

/// A relocatable segment of memory accessible by the Cairo virtual machine.
///
/// # Representation
///
/// A program running in the Cairo virtual machine is technically allowed to access any
/// value within the address space of the machine, which has the size of the field itself
/// and is not realistically representable in a computer's memory. For this reason, Cairo
/// programs split their memory into *segments*: contiguous blocks of memory located
/// *somewhere* in the address space, with the final location of each segment decided only
/// after the program has finished running.
///
/// Because a program can never observe the final location of a segment, fragmentation
/// within a segment stays small in practice, and a flat array representation works well.
/// Gaps ("holes") may still appear; a hole is a cell whose metadata carries no
/// [`CellFlags::KNOWN`] bit. Cell metadata is kept in a separate array from the values so
/// the flag byte does not inflate every 32-byte cell to its alignment.
#[derive(Default, Debug, Clone)]
pub struct Segment {
    /// Metadata for every cell up to the highest touched offset.
    flags: Vec<CellFlags>,
    /// Cell values, synchronized with `flags`.
    ///
    /// An entry holds a meaningful value if and only if the corresponding entry in
    /// `flags` carries the `KNOWN` bit.
    cells: Vec<Value>,
}

/// A placeholder stored in `cells` for offsets that have no known value.
const HOLE: Value = Value::Scalar(starknet_types_core::felt::Felt::ZERO);

impl Segment {
    /// Creates a new empty [`Segment`].
    ///
    /// No memory is allocated until a cell is asserted.
    pub const fn new() -> Self {
        Self {
            flags: Vec::new(),
            cells: Vec::new(),
        }
    }

    /// Returns the logical size of the segment: one past the highest known cell, or zero
    /// if no cell is known.
    pub fn len(&self) -> usize {
        self.flags
            .iter()
            .rposition(|f| f.contains(CellFlags::KNOWN))
            .map_or(0, |index| index + 1)
    }

    /// Returns whether the segment holds no known cell.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the memory cell at offset `index` in the segment, if it has been asserted
    /// to a specific value.
    pub fn get(&self, index: usize) -> Option<&Value> {
        let flags = self.flags.get(index)?;
        flags
            .contains(CellFlags::KNOWN)
            .then(|| &self.cells[index])
    }

    /// Attempts to assert that a memory cell in the segment has a given value.
    ///
    /// # Returns
    ///
    /// - If the cell is unknown, it is asserted to the given value and the function
    ///   succeeds.
    ///
    /// - If the cell is known and holds the same value, the function succeeds without
    ///   touching memory.
    ///
    /// - If the cell is known and holds a different value, the function fails and returns
    ///   the conflicting value.
    pub fn assert_eq(&mut self, index: usize, value: Value) -> Result<(), Value> {
        self.grow_to(index);

        if self.flags[index].contains(CellFlags::KNOWN) {
            if self.cells[index] != value {
                return Err(self.cells[index]);
            }
        } else {
            self.flags[index].insert(CellFlags::KNOWN);
            self.cells[index] = value;
        }

        Ok(())
    }

    /// Marks the cell at offset `index` as accessed by the interpreter.
    pub fn mark_accessed(&mut self, index: usize) {
        self.grow_to(index);
        self.flags[index].insert(CellFlags::ACCESSED);
    }

    /// Returns the number of cells of this segment that have been accessed.
    pub fn accessed_count(&self) -> usize {
        self.flags
            .iter()
            .filter(|f| f.contains(CellFlags::ACCESSED))
            .count()
    }

    /// Iterates over the known cells of the segment in ascending offset order.
    pub fn iter_known(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.flags
            .iter()
            .zip(self.cells.iter())
            .enumerate()
            .filter_map(|(index, (flags, cell))| {
                flags.contains(CellFlags::KNOWN).then_some((index, cell))
            })
    }

    /// Extends the metadata and cell arrays so that `index` is in bounds.
    fn grow_to(&mut self, index: usize) {
        if index >= self.flags.len() {
            self.flags.resize(index + 1, CellFlags::empty());
            self.cells.resize(index + 1, HOLE);
        }
    }
}

#[cfg(test)]
mod tests {
    use starknet_types_core::felt::Felt;

    use super::*;

    #[test]
    fn empty_segment_has_no_size() {
        let segment = Segment::new();
        assert_eq!(segment.len(), 0);
        assert!(segment.get(0).is_none());
    }

    #[test]
    fn assert_and_read_back() {
        let mut segment = Segment::new();
        segment.assert_eq(0, Value::from(7u64)).unwrap();
        assert_eq!(segment.get(0), Some(&Value::from(7u64)));
        assert_eq!(segment.len(), 1);
    }

    #[test]
    fn holes_do_not_count_as_known() {
        let mut segment = Segment::new();
        segment.assert_eq(4, Value::from(1u64)).unwrap();
        assert_eq!(segment.len(), 5);
        assert!(segment.get(2).is_none());
        assert_eq!(segment.iter_known().count(), 1);
    }

    #[test]
    fn reassert_same_value_is_noop() {
        let mut segment = Segment::new();
        segment.assert_eq(1, Value::from(3u64)).unwrap();
        segment.assert_eq(1, Value::from(3u64)).unwrap();
        assert_eq!(segment.get(1), Some(&Value::from(3u64)));
    }

    #[test]
    fn reassert_other_value_fails() {
        let mut segment = Segment::new();
        segment.assert_eq(1, Value::from(3u64)).unwrap();
        let conflict = segment.assert_eq(1, Value::from(4u64)).unwrap_err();
        assert_eq!(conflict, Value::from(Felt::from(3u64)));
        // The original value must survive the failed insertion.
        assert_eq!(segment.get(1), Some(&Value::from(3u64)));
    }

    #[test]
    fn accessed_marking_does_not_change_size() {
        let mut segment = Segment::new();
        segment.assert_eq(0, Value::from(1u64)).unwrap();
        segment.mark_accessed(0);
        segment.mark_accessed(3);
        assert_eq!(segment.len(), 1);
        assert_eq!(segment.accessed_count(), 2);
    }
}
