//! Cancellation for the capture loop.
//!
//! Ctrl+C flips a shared token instead of unwinding the process, so the
//! capture loop can return normally and the recording still gets saved.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag checked by blocking receives between waits.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup. The handler only cancels
/// `token`; it never exits the process.
pub fn setup_ctrlc_handler(token: CancelToken) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        if !token.is_cancelled() {
            log::debug!("Received Ctrl+C");
        }
        token.cancel();
    })
}
