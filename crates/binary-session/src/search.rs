use binary_core::errors::{EngineError, EngineResult};
use util::cancel::CancelToken;

/// Tokens of the searches currently running against one session.
///
/// Mutations call [`SearchRegistry::cancel_all`] before taking the write
/// lock, so a scan holding the read lock stops at its next poll.
#[derive(Clone, Debug, Default)]
pub struct SearchRegistry {
    active: std::sync::Arc<std::sync::Mutex<Vec<CancelToken>>>,
}

impl SearchRegistry {
    fn tokens(&self) -> std::sync::MutexGuard<'_, Vec<CancelToken>> {
        self.active
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Tracks `token` until the returned guard is dropped.
    pub fn register(&self, token: &CancelToken) -> Registration {
        self.tokens().push(token.clone());

        Registration {
            registry: self.clone(),
            token: token.clone(),
        }
    }

    /// Cancels every tracked search and forgets it. Returns how many there were.
    pub fn cancel_all(&self) -> usize {
        let cancelled: Vec<CancelToken> = self.tokens().drain(..).collect();

        for token in &cancelled {
            token.cancel();
        }

        if !cancelled.is_empty() {
            tracing::debug!(count = cancelled.len(), "cancelled in-flight searches");
        }

        cancelled.len()
    }

    #[must_use]
    pub fn active(&self) -> usize {
        self.tokens().len()
    }
}

#[derive(Debug)]
pub struct Registration {
    registry: SearchRegistry,
    token: CancelToken,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry
            .tokens()
            .retain(|other| !other.same_as(&self.token));
    }
}

/// A search running on a worker thread.
///
/// Dropping the task cancels the search.
#[derive(Debug)]
pub struct SearchTask {
    token: CancelToken,
    result: crossbeam_channel::Receiver<EngineResult<Option<u64>>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SearchTask {
    pub(crate) fn new(
        token: CancelToken,
        result: crossbeam_channel::Receiver<EngineResult<Option<u64>>>,
        handle: std::thread::JoinHandle<()>,
    ) -> Self {
        Self {
            token,
            result,
            handle: Some(handle),
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    /// The result if the search has already finished.
    #[must_use]
    pub fn try_result(&self) -> Option<EngineResult<Option<u64>>> {
        self.result.try_recv().ok()
    }

    /// Blocks until the worker reports back.
    pub fn wait(mut self) -> EngineResult<Option<u64>> {
        let result = self.result.recv().unwrap_or_else(|_| {
            Err(EngineError::Io(std::io::Error::other(
                "search worker stopped without a result",
            )))
        });

        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("search worker panicked");
        }

        result
    }
}

impl Drop for SearchTask {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
        }
    }
}
