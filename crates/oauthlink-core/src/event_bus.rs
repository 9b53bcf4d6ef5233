//! Event Bus - connection event distribution
//!
//! The coordinator and status refresher emit [`ConnectionEvent`]s here;
//! UI surfaces (toasts, status badges) subscribe and react.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                Event Bus (broadcast channel)              │
//! │                                                           │
//! │  Producers:                  Consumers:                   │
//! │  ├─ ConnectionCoordinator    ├─ Notification presenter    │
//! │  └─ StatusRefresher          └─ Settings status badges    │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ConnectionEvent;

/// Default channel capacity for the event bus
const DEFAULT_CAPACITY: usize = 64;

/// Central hub for connection events.
///
/// Each subscriber gets its own copy of every event emitted after it subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ConnectionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Get a sender for emitting events
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.sender.clone(),
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Cheaply cloneable handle used by producers
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<ConnectionEvent>,
}

impl EventSender {
    /// Emit an event. Returns the number of receivers; 0 is not an error.
    pub fn emit(&self, event: ConnectionEvent) -> usize {
        let type_name = event.type_name();
        let provider = event.provider();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    provider = %provider,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                debug!(
                    event_type = type_name,
                    provider = %provider,
                    "[EventBus] No receivers for event"
                );
                0
            }
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Receiving side for consumers
pub struct EventReceiver {
    receiver: broadcast::Receiver<ConnectionEvent>,
}

impl EventReceiver {
    /// Receive the next event. Returns `None` once the bus is gone.
    ///
    /// Lag is logged and skipped over.
    pub async fn recv(&mut self) -> Option<ConnectionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Option<ConnectionEvent> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped_events = skipped, "[EventBus] Receiver lagged on try_recv");
                }
                Err(_) => return None,
            }
        }
    }

    /// Drain everything currently buffered
    pub fn drain(&mut self) -> Vec<ConnectionEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

pub type SharedEventBus = Arc<EventBus>;

pub fn create_shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
