//! Cooperative cancellation for workflow runs

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable cancellation signal shared by a run and everything it awaits
///
/// Once cancelled a token stays cancelled; callers make a new token for the
/// next run.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// True when both tokens are clones of the same signal
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives in self, so wait_for cannot observe a closed channel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
