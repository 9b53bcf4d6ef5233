//! # OAuthLink Core Library
//!
//! Domain types, ports and configuration for the third-party authorization
//! connection coordinator.
//!
//! ## Modules
//!
//! - `domain` - Core entities (Provider, ConnectionAttempt, AuthorizationOutcome, ConnectionStatus)
//! - `store` - Shared key/value store trait and in-memory implementation
//! - `clock` - Wall-clock abstraction used for record recency checks
//! - `config` - Coordinator, provider and logging configuration
//! - `event_bus` - Connection event distribution

pub mod clock;
pub mod config;
pub mod domain;
pub mod event_bus;
pub mod store;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, CoordinatorConfig, LoggingConfig, PopupFeatures, ProviderConfig};
pub use domain::*;
pub use event_bus::{create_shared_event_bus, EventBus, EventReceiver, EventSender, SharedEventBus};
pub use store::{MemoryStore, SharedStore, StoreError, StoreResult};
