use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use binary_core::chunk_store::ChunkStore;
use binary_core::config::EngineConfig;
use binary_core::edit_log::{Command, EditLog};
use binary_core::enums::{Change, Direction};
use binary_core::errors::{EngineError, EngineResult};
use binary_core::finder::Finder;
use util::cancel::CancelToken;

use crate::change::{ChangeKind, ContentChange};
use crate::search::{SearchRegistry, SearchTask};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing opened yet.
    Empty,
    Clean,
    Dirty,
    Disposed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Empty,
    Loaded,
    Disposed,
}

/// One open document: its content, its edit history and the searches
/// running over it.
///
/// The store sits behind an `RwLock` shared with background searches. Every
/// operation that changes content first cancels all registered searches and
/// only then takes the write lock, so an edit never waits for a scan to run
/// to completion and a scan never sees content change underneath it.
#[derive(Debug)]
pub struct ContentSession {
    config: EngineConfig,
    store: Arc<RwLock<ChunkStore>>,
    log: EditLog,
    path: Option<PathBuf>,
    phase: Phase,
    searches: SearchRegistry,
    events: util::broadcast::Broadcaster<ContentChange>,
}

impl Default for ContentSession {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/*

=============================
========= LIFECYCLE =========
=============================

*/

impl ContentSession {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();

        Self {
            store: Arc::new(RwLock::new(ChunkStore::new(config.clone()))),
            log: EditLog::new(config.coalesce_limit),
            config,
            path: None,
            phase: Phase::Empty,
            searches: SearchRegistry::default(),
            events: util::broadcast::Broadcaster::default(),
        }
    }

    /// Creates a session and opens `path` in it.
    pub fn open_file(path: impl AsRef<Path>, config: EngineConfig) -> EngineResult<Self> {
        let mut session = Self::new(config);
        session.open(Some(path.as_ref()))?;

        Ok(session)
    }

    /// Replaces the current content with the file at `source`, or with an
    /// empty unnamed document when `source` is `None`.
    ///
    /// History is discarded. On failure the session is left as it was.
    pub fn open(&mut self, source: Option<&Path>) -> EngineResult<()> {
        if self.phase == Phase::Disposed {
            return Err(EngineError::Disposed);
        }

        let store = match source {
            Some(path) => Self::load(path, &self.config)?,
            None => ChunkStore::new(self.config.clone()),
        };
        let total = store.len();

        *Self::lock_for_write(&self.store, &self.searches) = store;
        self.log = EditLog::new(self.config.coalesce_limit);
        self.path = source.map(Path::to_path_buf);
        self.phase = Phase::Loaded;

        tracing::info!(path = ?self.path, length = total, "opened content");
        self.emit(ChangeKind::Reloaded, 0..total);

        Ok(())
    }

    fn load(path: &Path, config: &EngineConfig) -> EngineResult<ChunkStore> {
        // Zero-length files cannot be mapped.
        if std::fs::metadata(path)?.len() == 0 {
            return Ok(ChunkStore::new(config.clone()));
        }

        let file = Arc::new(io::mmap::MappedFile::open(path)?);

        ChunkStore::from_mapped(file, config.clone())
    }

    /// Writes the whole content to `target` atomically and makes `target`
    /// the session's path.
    ///
    /// Mapped chunks keep referring to the file that was opened, which stays
    /// readable after `target` replaces it. History survives a save; undoing
    /// past it makes the session dirty again.
    pub fn save(&mut self, target: impl AsRef<Path>) -> EngineResult<()> {
        self.ensure_loaded()?;
        let target = target.as_ref();

        let written = {
            let store = self.read_store();
            let slices = store.slices(0, store.len())?;

            io::atomic::write_atomically(target, |writer| -> EngineResult<()> {
                for slice in slices {
                    writer.write_all(slice?)?;
                }

                Ok(())
            })?
        };

        self.path = Some(target.to_path_buf());
        self.log.mark_saved();

        tracing::info!(path = %target.display(), bytes = written, "saved content");
        self.emit(ChangeKind::Saved, 0..0);

        Ok(())
    }

    /// Saves to the current path.
    pub fn save_in_place(&mut self) -> EngineResult<()> {
        self.ensure_loaded()?;

        let Some(path) = self.path.clone() else {
            return Err(EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "content has no associated path",
            )));
        };

        self.save(path)
    }

    /// Writes `length` bytes at `offset` to `target`. Neither the path nor
    /// the dirty state changes.
    pub fn save_range(
        &self,
        target: impl AsRef<Path>,
        offset: u64,
        length: u64,
    ) -> EngineResult<()> {
        self.ensure_loaded()?;

        let store = self.read_store();
        let slices = store.slices(offset, length)?;

        let written = io::atomic::write_atomically(target.as_ref(), |writer| -> EngineResult<()> {
            for slice in slices {
                writer.write_all(slice?)?;
            }

            Ok(())
        })?;

        tracing::debug!(path = %target.as_ref().display(), offset, bytes = written, "saved range");

        Ok(())
    }

    /// Cancels searches, drops all content and history, and closes every
    /// subscription. Any later call fails with [`EngineError::Disposed`].
    pub fn dispose(&mut self) {
        if self.phase == Phase::Disposed {
            return;
        }

        Self::lock_for_write(&self.store, &self.searches).clear();
        self.log.clear();
        self.path = None;
        self.phase = Phase::Disposed;

        self.events.send(&ContentChange {
            kind: ChangeKind::Closed,
            range: 0..0,
            total_length: 0,
            dirty: false,
        });
        self.events.close();

        tracing::debug!("session disposed");
    }
}

/*

===========================
========= EDITING =========
===========================

*/

impl ContentSession {
    pub fn insert(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<()> {
        self.ensure_loaded()?;

        if bytes.is_empty() {
            return self.check_range(offset, 0);
        }

        Self::lock_for_write(&self.store, &self.searches).insert(offset, bytes)?;
        self.log.record(Command::Insert {
            offset,
            bytes: bytes.to_vec(),
        });

        self.emit(ChangeKind::Inserted, offset..offset + bytes.len() as u64);

        Ok(())
    }

    pub fn delete(&mut self, offset: u64, length: u64) -> EngineResult<()> {
        self.ensure_loaded()?;

        if length == 0 {
            return self.check_range(offset, 0);
        }

        let removed = Self::lock_for_write(&self.store, &self.searches).delete(offset, length)?;
        self.log.record(Command::Delete { offset, removed });

        self.emit(ChangeKind::Deleted, offset..offset + length);

        Ok(())
    }

    /// Replaces bytes in place. The region must lie inside the content; use
    /// [`ContentSession::insert`] to append.
    pub fn overwrite(&mut self, offset: u64, bytes: &[u8]) -> EngineResult<()> {
        self.ensure_loaded()?;

        if bytes.is_empty() {
            return self.check_range(offset, 0);
        }

        let original = Self::lock_for_write(&self.store, &self.searches).overwrite(offset, bytes)?;
        self.log.record(Command::Overwrite {
            offset,
            bytes: bytes.to_vec(),
            original,
        });

        self.emit(ChangeKind::Overwritten, offset..offset + bytes.len() as u64);

        Ok(())
    }

    /// Returns `false` when there was nothing to undo.
    pub fn undo(&mut self) -> EngineResult<bool> {
        self.ensure_loaded()?;

        if !self.log.can_undo() {
            return Ok(false);
        }

        let change = {
            let mut store = Self::lock_for_write(&self.store, &self.searches);
            self.log.undo(&mut store)?
        };

        Ok(self.report(change))
    }

    /// Returns `false` when there was nothing to redo.
    pub fn redo(&mut self) -> EngineResult<bool> {
        self.ensure_loaded()?;

        if !self.log.can_redo() {
            return Ok(false);
        }

        let change = {
            let mut store = Self::lock_for_write(&self.store, &self.searches);
            self.log.redo(&mut store)?
        };

        Ok(self.report(change))
    }

    /// Ends the current coalescing run; the next edit starts its own undo step.
    pub fn commit_boundary(&mut self) {
        self.log.commit_boundary();
    }

    fn report(&mut self, change: Option<Change>) -> bool {
        match change {
            Some(change) => {
                self.emit(change.kind.into(), change.range);
                true
            }
            None => false,
        }
    }
}

/*

===========================
========= QUERIES =========
===========================

*/

impl ContentSession {
    pub fn read(&self, offset: u64, length: u64) -> EngineResult<Vec<u8>> {
        self.ensure_loaded()?;

        self.read_store().read(offset, length)
    }

    pub fn len(&self) -> EngineResult<u64> {
        self.ensure_loaded()?;

        Ok(self.read_store().len())
    }

    pub fn is_empty(&self) -> EngineResult<bool> {
        Ok(self.len()? == 0)
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Empty => SessionState::Empty,
            Phase::Disposed => SessionState::Disposed,
            Phase::Loaded if self.log.is_dirty() => SessionState::Dirty,
            Phase::Loaded => SessionState::Clean,
        }
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state() == SessionState::Dirty
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        self.phase == Phase::Loaded && self.log.can_undo()
    }

    #[must_use]
    pub fn can_redo(&self) -> bool {
        self.phase == Phase::Loaded && self.log.can_redo()
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn chunk_count(&self) -> EngineResult<usize> {
        self.ensure_loaded()?;

        Ok(self.read_store().chunk_count())
    }

    /// Searches currently registered against this session.
    #[must_use]
    pub fn active_searches(&self) -> usize {
        self.searches.active()
    }

    /// Receives a [`ContentChange`] after every edit, undo, redo, open and
    /// save. The channel disconnects when the session is disposed.
    pub fn subscribe(&mut self) -> crossbeam_channel::Receiver<ContentChange> {
        self.events.subscribe()
    }
}

/*

==========================
========= SEARCH =========
==========================

*/

impl ContentSession {
    /// Searches on the calling thread. `cancel` is also fired by any edit
    /// made through this session while the search runs.
    pub fn find(
        &self,
        pattern: &[u8],
        from: u64,
        direction: Direction,
        wrap: bool,
        cancel: &CancelToken,
    ) -> EngineResult<Option<u64>> {
        self.ensure_loaded()?;

        let finder = Finder::new(pattern, self.config.scan_block)?;
        let _registration = self.searches.register(cancel);

        finder.find(&self.read_store(), from, direction, wrap, cancel)
    }

    /// Starts a search on a worker thread.
    ///
    /// The worker holds the read lock while it scans; the next edit cancels
    /// it and the task then reports [`EngineError::Cancelled`].
    pub fn find_in_background(
        &self,
        pattern: Vec<u8>,
        from: u64,
        direction: Direction,
        wrap: bool,
    ) -> EngineResult<SearchTask> {
        self.ensure_loaded()?;

        if pattern.is_empty() {
            return Err(EngineError::InvalidPattern(
                "search pattern is empty".to_string(),
            ));
        }

        let token = CancelToken::new();
        let registration = self.searches.register(&token);
        let store = Arc::clone(&self.store);
        let block = self.config.scan_block;
        let worker_token = token.clone();
        let (sender, receiver) = crossbeam_channel::bounded(1);

        let handle = std::thread::Builder::new()
            .name("content-search".to_string())
            .spawn(move || {
                let _registration = registration;

                let result = Finder::new(&pattern, block).and_then(|finder| {
                    let store = store.read().unwrap_or_else(PoisonError::into_inner);
                    finder.find(&store, from, direction, wrap, &worker_token)
                });

                // The task may already be gone.
                let _ = sender.send(result);
            })?;

        Ok(SearchTask::new(token, receiver, handle))
    }
}

/*

=============================
========= INTERNALS =========
=============================

*/

impl ContentSession {
    fn ensure_loaded(&self) -> EngineResult<()> {
        match self.phase {
            Phase::Loaded => Ok(()),
            Phase::Empty => Err(EngineError::NotLoaded),
            Phase::Disposed => Err(EngineError::Disposed),
        }
    }

    fn check_range(&self, offset: u64, length: u64) -> EngineResult<()> {
        let total = self.read_store().len();

        match offset.checked_add(length) {
            Some(end) if end <= total => Ok(()),
            _ => Err(EngineError::out_of_range(offset, length, total)),
        }
    }

    fn read_store(&self) -> RwLockReadGuard<'_, ChunkStore> {
        self.store.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancels every in-flight search, then waits for the write lock.
    fn lock_for_write<'a>(
        store: &'a RwLock<ChunkStore>,
        searches: &SearchRegistry,
    ) -> RwLockWriteGuard<'a, ChunkStore> {
        searches.cancel_all();

        store.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&mut self, kind: ChangeKind, range: std::ops::Range<u64>) {
        let change = ContentChange {
            kind,
            range,
            total_length: self.read_store().len(),
            dirty: self.log.is_dirty(),
        };

        self.events.send(&change);
    }
}
