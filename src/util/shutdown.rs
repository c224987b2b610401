//! Graceful shutdown handling.

use tokio_util::sync::CancellationToken;

/// Engine-wide shutdown signal.
///
/// Clones share the same underlying token, so triggering any clone stops
/// every task observing the signal.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
}

impl ShutdownSignal {
    /// Create a new shutdown signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger shutdown.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until shutdown is requested.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// Create a token that is cancelled on shutdown, or earlier by its owner.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }
}
