use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Token for cooperative cancellation of in-flight backend calls.
///
/// Cancelled when the operator navigates away, switches project or changes the active box; a
/// response that arrives afterwards is dropped instead of being applied. Clone is cheap and
/// shares state.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled).
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns `Err(SampleError::Cancelled)` once cancelled.
    pub fn check(&self) -> crate::SampleResult<()> {
        if self.is_cancelled() {
            return Err(crate::SampleError::Cancelled);
        }
        Ok(())
    }
}
