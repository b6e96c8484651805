//! Cancellation handle shared by the caller, the rate limiter, the dispatcher and the
//! stream consumer.

use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Caller-owned cancellation signal for one request.
///
/// Clones observe the same token. Cancelling after the request finished is a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Observers stop at their next suspension point and the
    /// in-flight HTTP stream is dropped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clones_share_the_signal() {
        let handle = CancelHandle::new();
        let observer = handle.clone();
        assert!(!observer.is_cancelled());

        handle.cancel();
        observer.cancelled().await;
        assert!(observer.is_cancelled());
    }
}
