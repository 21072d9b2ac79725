//! Execution context - the cancellation token shared by every phase

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Cancellable token handed to every executor phase
///
/// Cloning shares the same token. A context is cancelled at most once;
/// [`ExecutionContext::cancel`] reports whether the call was the one that
/// fired.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl ExecutionContext {
    /// Create a new, live context
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive a context that is cancelled whenever this one is
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the context; returns `true` only for the first call
    pub fn cancel(&self) -> bool {
        if self.fired.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.token.cancel();
        true
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the context is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Underlying token, for collaborators that speak `tokio-util`
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
