// Batch Shutdown Token

use tokio::sync::watch;

/// Shutdown signal shared by the batch and every running job
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    /// Token that never fires (tests, one-off runs)
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Check if shutdown was requested
    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait for shutdown signal
    ///
    /// Resolves immediately if shutdown was already requested. Pends forever
    /// once the sender is gone without having signalled.
    pub async fn wait(&mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Shutdown sender
pub struct ShutdownSender {
    tx: watch::Sender<bool>,
}

impl ShutdownSender {
    /// Signal shutdown to the batch
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }

    /// Another token bound to this sender
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.tx.subscribe(),
        }
    }
}

/// Create a shutdown channel
pub fn shutdown_channel() -> (ShutdownSender, ShutdownToken) {
    let (tx, rx) = watch::channel(false);
    (ShutdownSender { tx }, ShutdownToken { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_after_shutdown_returns() {
        let (tx, _rx) = shutdown_channel();
        tx.shutdown();

        let mut late = tx.token();
        assert!(late.is_shutdown());
        tokio::time::timeout(Duration::from_millis(100), late.wait())
            .await
            .expect("wait should resolve once shutdown was sent");
    }

    #[tokio::test]
    async fn test_never_token_pends() {
        let mut token = ShutdownToken::never();
        assert!(!token.is_shutdown());
        let waited = tokio::time::timeout(Duration::from_millis(50), token.wait()).await;
        assert!(waited.is_err());
    }
}
