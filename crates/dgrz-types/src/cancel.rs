use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{DgrzError, DgrzResult};

/// Cooperative cancellation flag shared between a caller and an operation.
///
/// Operations that may block (file I/O, object-store round trips) call
/// [`CancelToken::check`] at each suspension point.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation has been requested.
    pub fn check(&self) -> DgrzResult<()> {
        if self.is_cancelled() {
            Err(DgrzError::cancelled())
        } else {
            Ok(())
        }
    }
}
