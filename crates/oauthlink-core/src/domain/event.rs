//! Connection Events - everything a UI surface may react to
//!
//! Events are emitted by the coordinator and the status refresher, and
//! consumed by UI bridges (notifications, status badges) and tests.
//!
//! # Design Principles
//!
//! - **Single Source of Truth**: One enum for all connection events
//! - **Immutable**: Events are facts that happened, never mutated
//! - **Serializable**: All events can be serialized for transport

use serde::{Deserialize, Serialize};

use super::{
    CancelReason, ConnectionStatus, CorrelationToken, Provider, ResolutionKind, SignalSource,
};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectionEvent {
    // ========================================================================
    // Attempt lifecycle
    // ========================================================================
    /// User triggered connect, requester invoked
    AttemptStarted {
        provider: Provider,
        attempt: CorrelationToken,
    },

    /// Authorization window opened
    PopupOpened {
        provider: Provider,
        attempt: CorrelationToken,
    },

    /// Attempt reached a terminal state
    AttemptResolved {
        provider: Provider,
        attempt: CorrelationToken,
        kind: ResolutionKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<SignalSource>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancel_reason: Option<CancelReason>,
    },

    /// Attempt was superseded or its surface was torn down before resolving
    AttemptAbandoned {
        provider: Provider,
        attempt: CorrelationToken,
    },

    // ========================================================================
    // Status refresher
    // ========================================================================
    /// Connection status refetched from the backend
    StatusRefreshed {
        provider: Provider,
        status: ConnectionStatus,
    },

    /// User-facing notification
    Notification {
        provider: Provider,
        level: NotificationLevel,
        message: String,
    },
}

impl ConnectionEvent {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AttemptStarted { .. } => "attempt_started",
            Self::PopupOpened { .. } => "popup_opened",
            Self::AttemptResolved { .. } => "attempt_resolved",
            Self::AttemptAbandoned { .. } => "attempt_abandoned",
            Self::StatusRefreshed { .. } => "status_refreshed",
            Self::Notification { .. } => "notification",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            Self::AttemptStarted { provider, .. }
            | Self::PopupOpened { provider, .. }
            | Self::AttemptResolved { provider, .. }
            | Self::AttemptAbandoned { provider, .. }
            | Self::StatusRefreshed { provider, .. }
            | Self::Notification { provider, .. } => *provider,
        }
    }

    /// Correlation token, for attempt-scoped events
    pub fn attempt(&self) -> Option<CorrelationToken> {
        match self {
            Self::AttemptStarted { attempt, .. }
            | Self::PopupOpened { attempt, .. }
            | Self::AttemptResolved { attempt, .. }
            | Self::AttemptAbandoned { attempt, .. } => Some(*attempt),
            _ => None,
        }
    }
}
