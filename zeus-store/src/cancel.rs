//! Cooperative cancellation
//!
//! One token is shared between a caller and every store operation and
//! engine pass it drives. The contract is deliberately small: engines are
//! synchronous and poll [`CancelToken::is_cancelled`] at the entry of each
//! detector, BFS/DFS pass and store syscall; the async store side can also
//! await [`CancelToken::cancelled`] while parked on a lock. Cancellation is
//! one-way and sticky — once fired, every clone observes it forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// A token for cooperative cancellation
///
/// Clones share one flag; firing any clone fires them all. There is no
/// hierarchy and no reset: one engine call gets one token.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Default)]
struct CancelInner {
    /// Sticky cancellation flag
    cancelled: AtomicBool,

    /// Wakes async waiters parked in [`CancelToken::cancelled`]
    notify: Notify,
}

impl CancelToken {
    /// Create a new, un-cancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token.
    ///
    /// Every clone observes the cancellation and all parked waiters wake.
    /// Firing an already-cancelled token is a no-op.
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            self.inner.notify.notify_waiters();
        }
    }

    /// Cheap synchronous check, safe to poll in tight loops
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait for the token to fire
    ///
    /// Returns immediately when already cancelled.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }

        let notified = self.inner.notify.notified();

        // The flag may have flipped between the check above and registering
        // the waiter; re-check before parking.
        if self.is_cancelled() {
            return;
        }

        notified.await;
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
