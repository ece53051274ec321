use std::sync::atomic::{AtomicBool, Ordering};

/// Anything a long-running scan can poll to learn it should stop.
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

/// Shared, clonable cancellation flag.
///
/// Every clone observes the same flag, so a caller can hand one clone to a
/// worker and keep another to call [`CancelToken::cancel`] from any thread.
/// Cancellation is sticky: once set it is never cleared.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: std::sync::Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// True when both tokens share the same flag.
    #[inline]
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        std::sync::Arc::ptr_eq(&self.flag, &other.flag)
    }
}

impl CancelSignal for CancelToken {
    #[inline]
    fn is_cancelled(&self) -> bool {
        CancelToken::is_cancelled(self)
    }
}

/// A signal that never fires.
#[derive(Clone, Copy, Debug, Default)]
pub struct NeverCancel;

impl CancelSignal for NeverCancel {
    #[inline]
    fn is_cancelled(&self) -> bool {
        false
    }
}
