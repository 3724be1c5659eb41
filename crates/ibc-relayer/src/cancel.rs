// Cancellation signal shared by every blocking step of the pipeline
use std::future::Future;

use tokio::sync::watch;

use crate::error::RelayerError;

/// Sender side of a cancellation signal.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiver side, cheap to clone and hand to spawned tasks.
///
/// A dropped [`CancelHandle`] never counts as cancellation.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    rx: Option<watch::Receiver<bool>>,
}

/// Create a connected handle/signal pair
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx: Some(rx) })
}

impl Cancellation {
    /// A signal that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once the signal fires; pends forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return std::future::pending().await;
        };
        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// Race `fut` against the signal; cancellation wins ties.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, RelayerError>
    where
        F: Future<Output = Result<T, RelayerError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(RelayerError::Cancelled),
            res = fut => res,
        }
    }
}
