//! Process-wide cancellation signal.
//!
//! `main` holds the [`ShutdownTrigger`] and fires it on Ctrl-C / SIGTERM. Every
//! long-running task holds a cloned [`Shutdown`] and selects on
//! [`Shutdown::triggered`] around its await points.

use tokio::sync::watch;

/// Fires the shutdown signal for every [`Shutdown`] cloned from the same channel.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving half of the shutdown signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

/// Create a linked trigger/listener pair.
pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, Shutdown { rx })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        // send_replace succeeds even when every listener is gone
        self.tx.send_replace(true);
    }
}

impl Shutdown {
    /// A listener that can never fire. Used by one-shot commands and tests.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown has been requested.
    ///
    /// If the trigger was dropped without firing, this never resolves.
    pub async fn triggered(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
