//! Cooperative cancellation
//!
//! A [`CancelToken`] is checked at every loop iteration of request
//! preparation and toolpath synthesis, and awaited by the engine adapter
//! while the subprocess runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::error::SynthesisError;

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Shared cancellation flag with async notification
///
/// Cloning yields a handle to the same flag. Once cancelled a token stays
/// cancelled; a fresh token is created for every pipeline run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create a new, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation and wake every waiter
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::SeqCst) {
            tracing::debug!("Cancellation requested");
        }
        self.inner.notify.notify_waiters();
    }

    /// Check whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Return `Err(Cancelled)` once cancellation was requested
    ///
    /// Intended for `?` inside synchronous loops.
    pub fn check(&self) -> Result<(), SynthesisError> {
        if self.is_cancelled() {
            Err(SynthesisError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
