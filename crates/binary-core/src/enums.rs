#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    /// Bytes written by the user, held on the heap.
    Owned,
    /// Read-only window onto the memory-mapped source file.
    Mapped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EditKind {
    Insert,
    Delete,
    Overwrite,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

/// What a store mutation did, in the coordinates of the content right
/// after it was applied.
///
/// For a deletion `range` is the removed span measured before removal;
/// nothing of it remains afterwards but everything past `range.start`
/// has shifted left.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub kind: EditKind,
    pub range: std::ops::Range<u64>,
}

impl Change {
    #[must_use]
    pub fn new(kind: EditKind, offset: u64, length: u64) -> Self {
        Self {
            kind,
            range: offset..offset + length,
        }
    }
}
