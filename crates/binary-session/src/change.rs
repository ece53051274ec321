#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Deleted,
    Overwritten,
    /// New content was opened; everything should be redrawn.
    Reloaded,
    /// Content was written to disk; only the dirty flag changed.
    Saved,
    /// The session was disposed. No further events follow.
    Closed,
}

impl From<binary_core::enums::EditKind> for ChangeKind {
    fn from(kind: binary_core::enums::EditKind) -> Self {
        match kind {
            binary_core::enums::EditKind::Insert => ChangeKind::Inserted,
            binary_core::enums::EditKind::Delete => ChangeKind::Deleted,
            binary_core::enums::EditKind::Overwrite => ChangeKind::Overwritten,
        }
    }
}

/// Sent to subscribers after every operation that changes content or the
/// dirty state.
///
/// `range` is the span a display has to redraw. For `Deleted` it is the span
/// that disappeared; content after `range.start` has moved left, which a
/// display can tell from `total_length`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentChange {
    pub kind: ChangeKind,
    pub range: std::ops::Range<u64>,
    pub total_length: u64,
    pub dirty: bool,
}
