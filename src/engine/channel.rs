use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::EngineSession;

/// Engine session backed by an in-process channel.
///
/// Each received string is treated as one finalized segment; the session
/// ends when the sender side is dropped.
pub struct ChannelSession {
    rx: mpsc::Receiver<String>,
}

impl ChannelSession {
    pub fn new(rx: mpsc::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Create a connected sender/session pair.
    pub fn pair(buffer: usize) -> (mpsc::Sender<String>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl EngineSession for ChannelSession {
    async fn next_segment(&mut self) -> Result<Option<String>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> Result<()> {
        self.rx.close();
        Ok(())
    }
}
