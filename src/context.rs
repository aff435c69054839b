//! Cancellation and deadlines for one logical call chain.
//!
//! Every store operation takes a [`Context`]. The operation races against the context's
//! cancellation token and deadline; when either fires the in-flight future is dropped, which
//! returns any checked-out connection to the pool.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a child context that expires after `timeout`, or at the parent's deadline if that
    /// comes first. Cancelling the parent cancels the child.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Derive a child context that can be cancelled independently of its parent.
    #[must_use]
    pub fn with_cancel(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancel this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Drive `fut` until it completes, the context is cancelled, or the deadline passes.
    ///
    /// # Errors
    /// Returns `StoreError::Cancelled` or `StoreError::DeadlineExceeded` when the context fires
    /// first, otherwise whatever `fut` returns.
    pub async fn run<F, T>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        if self.token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let expiry = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(StoreError::Cancelled),
            () = expiry => Err(StoreError::DeadlineExceeded),
            res = fut => res,
        }
    }
}
