//! OAuthLink Client
//!
//! Client-side handshake for linking external accounts:
//! - Authorization Requester: asks the backend for a one-time authorization URL
//! - Popup Window Manager: owns the interactive window for one attempt
//! - Delivery Channels: window messages and a polled shared store
//! - Resolution Arbiter: first valid signal wins, everything else is discarded
//! - Status Refresher: refetches connection status after resolution
//!
//! [`ConnectionCoordinator`] ties these together; one coordinator per UI surface.

pub mod arbiter;
pub mod backend;
pub mod channels;
pub mod coordinator;
pub mod logging;
pub mod message_bus;
pub mod popup;
pub mod status;

pub use arbiter::{ArbiterVerdict, ResolutionArbiter};
pub use backend::{AuthorizationRequester, BackendClient, RequestError, StatusClient, StatusError};
pub use channels::{
    evaluate_record, ChannelContext, DeliveryChannel, DisposeBag, MessageChannel, RecordVerdict,
    RegistrationLedger, Signal, SignalSink, StorageChannel, Subscription,
};
pub use coordinator::{AttemptResolution, ConnectionCoordinator, CoordinatorBuilder};
pub use message_bus::WindowMessageBus;
pub use popup::{
    PopupError, PopupHost, PopupWatch, PopupWindow, PopupWindowManager, SystemBrowserHost,
};
pub use status::StatusRefresher;
