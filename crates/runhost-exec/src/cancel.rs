//! Cancellation of in-flight remote executions

use std::sync::Arc;

use tokio::sync::watch;

/// Lets a caller abort a remote execution from another task
///
/// Pass it to [`RemoteExecutor::execute`](crate::ssh::RemoteExecutor::execute)
/// and call [`cancel`](Self::cancel) from anywhere; the running channel is
/// force-closed and the execution returns [`UNKNOWN_STATUS`](crate::UNKNOWN_STATUS).
/// A handle that is already cancelled aborts every execution it is passed to.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    state: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a handle that has not been cancelled
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
