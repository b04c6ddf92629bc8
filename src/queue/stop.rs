use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation signal for one in-flight recording.
///
/// Observed at loop-iteration granularity by the capture session; signalling
/// is idempotent. Exactly one token exists per active task, registered when
/// the worker begins the task and removed when it finishes.
#[derive(Debug, Clone)]
pub struct StopToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl StopToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn signal(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_signalled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the token is signalled; returns immediately if it already was.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        let _ = rx.wait_for(|&stopped| stopped).await;
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}
