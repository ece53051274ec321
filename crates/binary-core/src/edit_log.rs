use crate::chunk_store::{Chunk, ChunkStore};
use crate::enums::{Change, EditKind};
use crate::errors::EngineResult;

/// One undoable mutation, carrying exactly what is needed to reverse it.
///
/// Removed content is kept as chunks rather than bytes: a deleted region of
/// the mapped source costs a range, not a copy.
#[derive(Clone, Debug)]
pub enum Command {
    Insert {
        offset: u64,
        bytes: Vec<u8>,
    },
    Delete {
        offset: u64,
        removed: Vec<Chunk>,
    },
    Overwrite {
        offset: u64,
        bytes: Vec<u8>,
        original: Vec<Chunk>,
    },
}

impl Command {
    #[must_use]
    pub fn kind(&self) -> EditKind {
        match self {
            Command::Insert { .. } => EditKind::Insert,
            Command::Delete { .. } => EditKind::Delete,
            Command::Overwrite { .. } => EditKind::Overwrite,
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        match self {
            Command::Insert { offset, .. }
            | Command::Delete { offset, .. }
            | Command::Overwrite { offset, .. } => *offset,
        }
    }

    /// Number of bytes the command inserted, removed or replaced.
    #[must_use]
    pub fn len(&self) -> u64 {
        match self {
            Command::Insert { bytes, .. } | Command::Overwrite { bytes, .. } => bytes.len() as u64,
            Command::Delete { removed, .. } => Chunk::total_len(removed),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-applies the command to a store in the state it had before the
    /// command first ran.
    pub fn apply(&self, store: &mut ChunkStore) -> EngineResult<Change> {
        let offset = self.offset();
        let len = self.len();

        match self {
            Command::Insert { bytes, .. } => store.insert(offset, bytes)?,
            Command::Delete { .. } => {
                store.delete(offset, len)?;
            }
            Command::Overwrite { bytes, .. } => {
                store.overwrite(offset, bytes)?;
            }
        }

        Ok(Change::new(self.kind(), offset, len))
    }

    /// Reverses the command on a store in the state it had right after the
    /// command ran.
    pub fn revert(&self, store: &mut ChunkStore) -> EngineResult<Change> {
        let offset = self.offset();
        let len = self.len();

        match self {
            Command::Insert { .. } => {
                store.delete(offset, len)?;

                Ok(Change::new(EditKind::Delete, offset, len))
            }
            Command::Delete { removed, .. } => {
                store.insert_chunks(offset, removed.clone())?;

                Ok(Change::new(EditKind::Insert, offset, len))
            }
            Command::Overwrite { original, .. } => {
                store.replace(offset, len, original.clone())?;

                Ok(Change::new(EditKind::Overwrite, offset, len))
            }
        }
    }

    /// Folds `next` into `self` when it continues the same run of edits.
    /// Hands `next` back untouched otherwise.
    fn absorb(&mut self, next: Command) -> Option<Command> {
        match (self, next) {
            (
                Command::Insert { offset, bytes },
                Command::Insert {
                    offset: next_offset,
                    bytes: next_bytes,
                },
            ) if *offset + bytes.len() as u64 == next_offset => {
                bytes.extend_from_slice(&next_bytes);

                None
            }
            (
                Command::Overwrite {
                    offset,
                    bytes,
                    original,
                },
                Command::Overwrite {
                    offset: next_offset,
                    bytes: next_bytes,
                    original: next_original,
                },
            ) if *offset + bytes.len() as u64 == next_offset => {
                bytes.extend_from_slice(&next_bytes);
                original.extend(next_original);

                None
            }
            (
                Command::Delete { offset, removed },
                Command::Delete {
                    offset: next_offset,
                    removed: mut next_removed,
                },
            ) => {
                // Forward delete: the next removal starts where this one did.
                if next_offset == *offset {
                    removed.append(&mut next_removed);

                    return None;
                }

                // Backspace: the next removal ends where this one started.
                if next_offset + Chunk::total_len(&next_removed) == *offset {
                    next_removed.append(removed);
                    *removed = next_removed;
                    *offset = next_offset;

                    return None;
                }

                Some(Command::Delete {
                    offset: next_offset,
                    removed: next_removed,
                })
            }
            (_, next) => Some(next),
        }
    }
}

/// Undo and redo stacks of [`Command`]s with coalescing of small edits.
#[derive(Debug)]
pub struct EditLog {
    undo_stack: Vec<Command>,
    redo_stack: Vec<Command>,
    /// Whether the top of the undo stack may still absorb the next edit.
    mergeable: bool,
    /// Undo depth at the last save. `None` once that state can no longer be
    /// reached by undo/redo.
    saved_depth: Option<usize>,
    coalesce_limit: usize,
}

impl Default for EditLog {
    fn default() -> Self {
        Self::new(crate::config::EngineConfig::default().coalesce_limit)
    }
}

impl EditLog {
    #[must_use]
    pub fn new(coalesce_limit: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            mergeable: false,
            saved_depth: Some(0),
            coalesce_limit,
        }
    }

    /// Records a command that has already been applied to the store.
    pub fn record(&mut self, command: Command) {
        self.redo_stack.clear();

        let depth = self.undo_stack.len();
        let small = command.len() <= self.coalesce_limit as u64;

        if let Some(saved) = self.saved_depth
            && saved > depth
        {
            // The saved state lived on the redo stack we just dropped.
            self.saved_depth = None;
        }

        let command = if self.mergeable && small {
            match self.undo_stack.last_mut() {
                Some(top) => match top.absorb(command) {
                    None => {
                        if self.saved_depth == Some(depth) {
                            self.saved_depth = None;
                        }
                        tracing::trace!(depth, "coalesced edit into previous command");

                        return;
                    }
                    Some(command) => command,
                },
                None => command,
            }
        } else {
            command
        };

        self.mergeable = small;
        self.undo_stack.push(command);
    }

    /// Reverts the most recent command. Returns `None` when there is nothing
    /// to undo.
    pub fn undo(&mut self, store: &mut ChunkStore) -> EngineResult<Option<Change>> {
        let Some(command) = self.undo_stack.pop() else {
            return Ok(None);
        };

        match command.revert(store) {
            Ok(change) => {
                self.redo_stack.push(command);
                self.mergeable = false;

                Ok(Some(change))
            }
            Err(err) => {
                self.undo_stack.push(command);

                Err(err)
            }
        }
    }

    /// Re-applies the most recently undone command. Returns `None` when there
    /// is nothing to redo.
    pub fn redo(&mut self, store: &mut ChunkStore) -> EngineResult<Option<Change>> {
        let Some(command) = self.redo_stack.pop() else {
            return Ok(None);
        };

        match command.apply(store) {
            Ok(change) => {
                self.undo_stack.push(command);
                self.mergeable = false;

                Ok(Some(change))
            }
            Err(err) => {
                self.redo_stack.push(command);

                Err(err)
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[inline]
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    #[must_use]
    pub fn peek_undo(&self) -> Option<&Command> {
        self.undo_stack.last()
    }

    /// Stops the next edit from merging into the current top command.
    pub fn commit_boundary(&mut self) {
        self.mergeable = false;
    }

    /// Marks the current history position as the persisted state.
    pub fn mark_saved(&mut self) {
        self.saved_depth = Some(self.undo_stack.len());
        self.mergeable = false;
    }

    #[inline]
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.saved_depth != Some(self.undo_stack.len())
    }

    /// Forgets all history and treats the current state as saved.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.mergeable = false;
        self.saved_depth = Some(0);
    }
}
