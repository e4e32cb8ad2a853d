//! Explicit cancellation tokens
//!
//! Every long operation accepts a token and checks it at each suspension
//! point. Cancellation and deadline expiry both resolve to a rollback for
//! the candidate; they never unwind a ledger append that already sealed.

use crate::OrchestratorError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct TokenInner {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

/// Cloneable cancellation handle
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// A token that never expires on its own
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                deadline: None,
            }),
        }
    }

    /// A token that expires after `timeout`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                deadline: Some(Instant::now() + timeout),
            }),
        }
    }

    /// Request cancellation; idempotent
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.inner
            .deadline
            .map(|deadline| Instant::now() > deadline)
            .unwrap_or(false)
    }

    /// Error out if cancelled or past the deadline
    pub fn check(&self, stage: &'static str) -> Result<(), OrchestratorError> {
        if self.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }
        if self.is_expired() {
            return Err(OrchestratorError::Timeout(stage));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_passes() {
        CancellationToken::new().check("test").unwrap();
    }

    #[test]
    fn cancelled_token_fails() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            token.check("test"),
            Err(OrchestratorError::Cancelled)
        ));
        // Clones observe the same cancellation.
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn expired_token_times_out() {
        let token = CancellationToken::with_timeout(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            token.check("append"),
            Err(OrchestratorError::Timeout("append"))
        ));
    }
}
