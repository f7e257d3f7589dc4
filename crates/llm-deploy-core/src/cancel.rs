//! Cooperative cancellation for a deployment run.
//!
//! A single token is created per run and cloned into the command layer.
//! Cancelling any clone (typically from the Ctrl-C handler) makes the
//! in-flight external command abort, and the run terminates through the
//! normal failure path with a terminal error event.

use crate::error::DeployError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Poll interval for the async wait. Cancellation latency, not correctness.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A cancellation token shared across the deployment run.
///
/// Clones share state: cancelling one cancels all.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request cancellation. All clones observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Error out if cancellation has been requested.
    pub fn check(&self) -> Result<(), DeployError> {
        if self.is_cancelled() {
            Err(DeployError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once cancellation is requested. Used in `select!` against
    /// a running external command.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
