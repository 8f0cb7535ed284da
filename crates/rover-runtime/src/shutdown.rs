//! Cooperative shutdown for the orchestration loop.
//!
//! [`ShutdownSignal`] is a latch: once triggered it stays triggered. Every
//! blocking phase call and every hold or cooldown sleep is raced against it
//! through [`ShutdownSignal::guard`], so a Ctrl-C is seen within one poll
//! whatever state the machine is in.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rover_types::RoverError;
use tokio::sync::Notify;
use tracing::info;

#[derive(Debug, Default)]
struct Latch {
    triggered: AtomicBool,
    notify: Notify,
}

/// Cloneable handle; all clones share one latch.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    latch: Arc<Latch>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Safe to call from a signal handler thread and more
    /// than once.
    pub fn trigger(&self) {
        if !self.latch.triggered.swap(true, Ordering::SeqCst) {
            info!("shutdown requested");
        }
        self.latch.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.latch.triggered.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.latch.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a trigger in between is
            // not missed.
            notified.as_mut().enable();
            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` unless shutdown is (or becomes) requested first.
    ///
    /// # Errors
    ///
    /// [`RoverError::Cancelled`] when shutdown won the race; `fut` is dropped.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, RoverError> {
        tokio::select! {
            biased;
            () = self.wait() => Err(RoverError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `duration`, waking early on shutdown.
    pub async fn sleep(&self, duration: Duration) -> Result<(), RoverError> {
        self.guard(tokio::time::sleep(duration)).await
    }
}
