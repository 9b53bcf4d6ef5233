//! Window message bus
//!
//! Carries raw, untyped message events posted by the authorization window
//! or its redirect page. Payloads are validated by the message channel,
//! not here.

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use oauthlink_core::ConnectedMessage;

const DEFAULT_CAPACITY: usize = 32;

#[derive(Clone)]
pub struct WindowMessageBus {
    sender: broadcast::Sender<Value>,
}

impl WindowMessageBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender }
    }

    /// Post a raw message. Returns how many listeners saw it.
    pub fn post(&self, message: Value) -> usize {
        match self.sender.send(message) {
            Ok(count) => count,
            Err(_) => {
                debug!("[MessageBus] Message posted with no listeners");
                0
            }
        }
    }

    pub fn post_connected(&self, message: &ConnectedMessage) -> usize {
        self.post(message.to_value())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WindowMessageBus {
    fn default() -> Self {
        Self::new()
    }
}
