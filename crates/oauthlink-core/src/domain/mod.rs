//! Domain entities for the authorization handshake

pub mod attempt;
pub mod event;
pub mod outcome;
pub mod provider;
pub mod status;

pub use attempt::{CancelReason, ConnectionAttempt, CorrelationToken, ResolutionKind, SignalSource};
pub use event::{ConnectionEvent, NotificationLevel};
pub use outcome::{AuthorizationOutcome, ConnectedMessage, StorageRecord};
pub use provider::{Provider, UnknownProvider};
pub use status::ConnectionStatus;
