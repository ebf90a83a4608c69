//! Cooperative cancellation.
//!
//! One token is threaded explicitly through every long-running call: the
//! network fetches, the decryptions, and the tool-process wait. Nothing
//! is ambient; whoever holds a clone can cancel, and every suspension
//! point checks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::FlashError;

#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation. Safe to call from any thread, repeatedly.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail fast at a suspension point.
    pub fn ensure_active(&self) -> Result<(), FlashError> {
        if self.is_cancelled() {
            Err(FlashError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the token is cancelled. Used in `select!` against a
    /// child-process wait.
    pub async fn cancelled_wait(&self) {
        while !self.is_cancelled() {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_active() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(token.ensure_active().is_ok());
    }

    #[test]
    fn test_cancel_is_sticky_and_shared_across_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();

        assert!(token.is_cancelled());
        assert!(matches!(
            token.ensure_active().unwrap_err(),
            FlashError::Cancelled
        ));
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wait_resolves_after_cancel() {
        let token = CancelToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled_wait().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!handle.is_finished());

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("cancelled_wait should resolve")
            .unwrap();
    }
}
