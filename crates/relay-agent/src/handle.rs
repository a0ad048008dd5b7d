//! A cloneable handle for poking a session from external code.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

/// A cloneable handle for poking a session from external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct SessionHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) idle_notify: Arc<tokio::sync::Notify>,
    pub(crate) is_running: Arc<AtomicBool>,
    pub(crate) retrying: Arc<AtomicBool>,
}

impl SessionHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            idle_notify: Arc::new(tokio::sync::Notify::new()),
            is_running: Arc::new(AtomicBool::new(false)),
            retrying: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claim the session for one query.
    ///
    /// Returns `None` when a query is already running. The claim and the
    /// installation of the query's cancellation token happen under the token
    /// lock, so an `abort` either precedes the claim or cancels the new token.
    pub(crate) fn try_begin(&self) -> Option<RunGuard> {
        let mut slot = self.cancel.lock();
        if self.is_running.swap(true, Ordering::AcqRel) {
            return None;
        }
        let token = CancellationToken::new();
        *slot = token.clone();
        drop(slot);
        Some(RunGuard {
            handle: self.clone(),
            token,
        })
    }

    pub(crate) fn set_retrying(&self, retrying: bool) {
        self.retrying.store(retrying, Ordering::Release);
    }

    /// Abort the current query.
    pub fn abort(&self) {
        self.cancel.lock().cancel();
    }

    /// Wait until the session becomes idle (finishes running).
    pub async fn wait_for_idle(&self) {
        let notified = self.idle_notify.notified();
        if !self.is_running.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }

    /// Wait until the session becomes idle, with a timeout.
    /// Returns `true` if idle was reached, `false` on timeout.
    pub async fn wait_for_idle_timeout(&self, timeout: std::time::Duration) -> bool {
        if !self.is_running.load(Ordering::Acquire) {
            return true;
        }
        tokio::time::timeout(timeout, self.wait_for_idle())
            .await
            .is_ok()
    }

    /// Whether a query is currently running.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    /// Whether the running query is recovering from a token-limit failure.
    pub fn is_retrying(&self) -> bool {
        self.retrying.load(Ordering::Acquire)
    }
}

/// Marks a query as running; dropping it returns the session to idle.
pub(crate) struct RunGuard {
    handle: SessionHandle,
    token: CancellationToken,
}

impl RunGuard {
    /// The cancellation token of the claimed query.
    pub(crate) fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        *self.handle.cancel.lock() = CancellationToken::new();
        self.handle.retrying.store(false, Ordering::Release);
        self.handle.is_running.store(false, Ordering::Release);
        self.handle.idle_notify.notify_waiters();
    }
}
