//! Cooperative cancellation for queued and running commands.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

/// Shared cancellation flag attached to a [`Command`](crate::Command).
///
/// Clones observe the same flag. Cancelling is sticky and idempotent. The
/// scheduler checks the token before a routine starts, at every `put`, and
/// races it against every outstanding `call`.
#[derive(Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Wakes every task awaiting [`cancelled`](Self::cancelled).
    pub fn cancel(&self) {
        // `send_replace` succeeds even with no live receivers.
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the token is cancelled. Resolves immediately if it
    /// already was.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so `wait_for` only returns once the
        // flag flips.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
