//! Shutdown signal handling (SIGTERM/SIGINT).

use tokio::sync::watch;

/// A signal handler that listens for OS signals and broadcasts shutdown.
pub struct SignalHandler {
    shutdown_tx: watch::Sender<bool>,
}

impl SignalHandler {
    /// Create a new signal handler and a receiver that becomes `true` on shutdown.
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    /// Run the signal loop. Returns once a shutdown signal is received.
    pub async fn run(self) {
        wait_for_signal().await;
        let _ = self.shutdown_tx.send(true);
    }

    /// Trigger shutdown without an OS signal.
    pub fn trigger(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            tracing::error!("failed to install SIGTERM handler: {e}, listening for Ctrl+C only");
            ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT, initiating shutdown...");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM, initiating shutdown...");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C, initiating shutdown..."),
        Err(e) => {
            tracing::error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}

/// Resolves once `rx` observes a shutdown.
pub async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|v| *v).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_handler_construction() {
        let (handler, rx) = SignalHandler::new();
        assert!(!*rx.borrow());
        handler.trigger();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves() {
        let (handler, rx) = SignalHandler::new();
        let waiter = tokio::spawn(wait_for_shutdown(rx));
        handler.trigger();
        waiter.await.unwrap();
    }
}
