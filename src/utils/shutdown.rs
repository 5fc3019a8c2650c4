//! Cooperative shutdown signalling.
//!
//! A single [`ShutdownController`] is the root of cancellation for the whole
//! process. Every long-running task holds a [`ShutdownSignal`] and races its
//! suspension points against [`ShutdownSignal::cancelled`].

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Root of cancellation. Dropping the controller cancels every signal.
#[derive(Debug)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Get a signal that resolves once shutdown is triggered.
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut stream) => {
                    stream.recv().await;
                }
                Err(_) => std::future::pending::<()>().await,
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        let signal = self.subscribe();
        tokio::select! {
            _ = ctrl_c => info!("received SIGINT, shutting down"),
            _ = terminate => info!("received SIGTERM, shutting down"),
            _ = signal.cancelled() => return,
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable view of the root cancellation state.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    /// True once shutdown was triggered or the controller is gone.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolves once shutdown has been triggered (or the controller is gone).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means the controller was dropped, which also counts as shutdown.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn programmatic_shutdown_notifies_subscribers() {
        let controller = ShutdownController::new();
        let signal = controller.subscribe();
        assert!(!signal.is_cancelled());

        controller.shutdown();

        signal.cancelled().await;
        assert!(signal.is_cancelled());
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn late_subscribers_see_shutdown() {
        let controller = ShutdownController::new();
        controller.shutdown();

        let signal = controller.subscribe();
        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn dropping_controller_cancels() {
        let controller = ShutdownController::new();
        let signal = controller.subscribe();
        drop(controller);

        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("signal should resolve when controller drops");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_until_triggered() {
        let controller = ShutdownController::new();
        let signal = controller.subscribe();

        let waited = tokio::time::timeout(Duration::from_secs(5), signal.cancelled()).await;
        assert!(waited.is_err(), "signal must not resolve before shutdown");
    }

    #[tokio::test]
    async fn dropped_controller_reads_as_cancelled() {
        let controller = ShutdownController::new();
        let signal = controller.subscribe();
        assert!(!signal.is_cancelled());

        drop(controller);

        assert!(signal.is_cancelled());
        signal.cancelled().await;
    }

    #[tokio::test]
    async fn wait_for_signal_returns_on_programmatic_shutdown() {
        let controller = std::sync::Arc::new(ShutdownController::new());
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.wait_for_signal().await })
        };

        tokio::task::yield_now().await;
        controller.shutdown();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("wait_for_signal should return after shutdown")
            .unwrap();
        assert!(controller.is_shutdown());
    }
}
