//! Shared cancellation flag for one pipeline run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One-writer, many-reader stop flag shared by every worker of a run.
///
/// The flag goes from `false` to `true` at most once and is never reset;
/// start each run with a fresh signal.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    cancelled: Arc<AtomicBool>,
}

impl CancellationSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every worker observing this signal to stop.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
