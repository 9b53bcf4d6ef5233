//! Connection attempt - one in-flight authorization flow

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Provider;

/// Value minted per attempt, used to reject signals belonging to an
/// earlier attempt for the same provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationToken(Uuid);

impl CorrelationToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// First 8 characters, for log lines.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for CorrelationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CorrelationToken {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Which delivery path produced a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Message,
    Storage,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Storage => "storage",
        }
    }
}

/// Why an attempt was resolved as cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The popup was closed before any outcome arrived
    PopupClosed,
    /// No outcome arrived within the attempt timeout
    TimedOut,
}

/// Terminal kind of an attempt, as reported in events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Success,
    Failure,
    Cancelled,
    RequestFailed,
}

impl ResolutionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Cancelled => "cancelled",
            Self::RequestFailed => "request_failed",
        }
    }
}

/// One run of the authorization handshake for one provider.
///
/// Never persisted. `resolved` flips exactly once; whichever caller wins
/// the flip owns the terminal transition.
#[derive(Debug)]
pub struct ConnectionAttempt {
    pub token: CorrelationToken,
    pub provider: Provider,
    pub started_at: DateTime<Utc>,
    resolved: AtomicBool,
}

impl ConnectionAttempt {
    pub fn new(provider: Provider) -> Self {
        Self {
            token: CorrelationToken::new(),
            provider,
            started_at: Utc::now(),
            resolved: AtomicBool::new(false),
        }
    }

    /// Claim the single resolution. Returns `true` for the first caller only.
    pub fn try_resolve(&self) -> bool {
        !self.resolved.swap(true, Ordering::SeqCst)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.load(Ordering::SeqCst)
    }

    /// Whether a signal tagged with `token` belongs to this attempt.
    ///
    /// Untagged signals are accepted; the recency window filters them instead.
    pub fn owns(&self, token: Option<&CorrelationToken>) -> bool {
        token.map_or(true, |t| *t == self.token)
    }
}
