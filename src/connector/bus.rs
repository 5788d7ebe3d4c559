//! Control bus seam

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Pull-style subscription to the control bus
#[async_trait]
pub trait ControlBus: Send {
    /// Next raw message, or `None` once the bus is closed
    ///
    /// Must be cancel-safe: the runtime drops a pending pull when a session
    /// failure or a signal arrives first.
    async fn pull(&mut self) -> Option<String>;
}

/// Control bus fed through an in-process channel
pub struct ChannelBus {
    receiver: mpsc::Receiver<String>,
}

impl ChannelBus {
    pub fn new(receiver: mpsc::Receiver<String>) -> Self {
        Self { receiver }
    }

    /// A bus and the sender that feeds it
    pub fn channel(capacity: usize) -> (mpsc::Sender<String>, Self) {
        let (sender, receiver) = mpsc::channel(capacity);
        (sender, Self::new(receiver))
    }
}

#[async_trait]
impl ControlBus for ChannelBus {
    async fn pull(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}
