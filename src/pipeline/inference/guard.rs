//! Timeout and cancellation for external model calls.
//!
//! Every call to a generative or inference service goes through [`guarded`],
//! so a hung service fails the request instead of blocking it forever.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use super::InferenceError;

/// Caller side of a cancellation pair.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by in-flight calls. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a linked handle/token pair.
pub fn cancel_pair() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx: Some(rx) })
}

impl CancelToken {
    /// A token that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once cancellation is requested. Never resolves if the
    /// handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        let closed = rx.wait_for(|cancelled| *cancelled).await.is_err();
        if closed {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::never()
    }
}

/// Run `call` bounded by `timeout`, aborting early if `cancel` fires.
pub async fn guarded<T, F>(
    call: F,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<T, InferenceError>
where
    F: Future<Output = Result<T, InferenceError>>,
{
    if cancel.is_cancelled() {
        return Err(InferenceError::Cancelled);
    }
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(InferenceError::Cancelled),
        result = tokio::time::timeout(timeout, call) => match result {
            Ok(inner) => inner,
            Err(_) => Err(InferenceError::Timeout(timeout)),
        },
    }
}
