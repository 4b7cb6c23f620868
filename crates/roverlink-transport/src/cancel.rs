use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative shutdown flag shared by the link worker threads.
///
/// Cloning is cheap; every clone observes the same flag. Blocking reads poll
/// it between read timeouts, so a cancelled token is noticed within one
/// timeout period.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token in the running (not cancelled) state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// True once [`cancel`](Self::cancel) has been called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// True while the token has not been cancelled.
    pub fn is_running(&self) -> bool {
        !self.is_cancelled()
    }
}
