//! Composable cancellation with a recorded reason.
//!
//! Every long-running operation in the crate accepts a [`CancelToken`].
//! Tokens form a tree: cancelling a parent cancels all children, while a
//! child can be cancelled independently. The whole tree shares one reason
//! slot; the first reason written wins.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct CancelToken {
    inner: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            inner: CancellationToken::new(),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    /// Child token linked to this one. Cancelling `self` cancels the child;
    /// cancelling the child leaves `self` untouched.
    pub fn child(&self) -> Self {
        Self {
            inner: self.inner.child_token(),
            reason: Arc::clone(&self.reason),
        }
    }

    /// Request cancellation. The first recorded reason is retained.
    pub fn cancel(&self, reason: impl Into<String>) {
        {
            let mut slot = self.reason.lock();
            if slot.is_none() {
                *slot = Some(reason.into());
            }
        }
        self.inner.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// The recorded reason. Only meaningful once [`is_cancelled`] is true.
    ///
    /// [`is_cancelled`]: CancelToken::is_cancelled
    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }

    /// Resolves when this token (or an ancestor) is cancelled.
    pub async fn cancelled(&self) {
        self.inner.cancelled().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &*self.reason.lock())
            .finish()
    }
}
