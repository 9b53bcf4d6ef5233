//! Outcomes delivered by the redirect page, and their wire shapes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CorrelationToken, Provider};

const DEFAULT_FAILURE_REASON: &str = "Authorization was not completed";

/// Outcome announced by a delivery channel.
///
/// There is no cancelled variant: cancellation is inferred by the arbiter
/// when the popup closes first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthorizationOutcome {
    Success {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        provider_payload: Option<Value>,
    },
    Failure {
        reason: String,
    },
}

impl AuthorizationOutcome {
    /// Map the `{ success, data? }` pair shared by both wire shapes.
    pub fn from_flag(success: bool, data: Option<Value>) -> Self {
        if success {
            Self::Success {
                provider_payload: data,
            }
        } else {
            Self::Failure {
                reason: failure_reason(data.as_ref()),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

fn failure_reason(data: Option<&Value>) -> String {
    match data {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Object(map)) => ["error_description", "error", "message", "reason"]
            .iter()
            .find_map(|field| map.get(*field).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
        _ => DEFAULT_FAILURE_REASON.to_string(),
    }
}

/// Record written to the shared store by the redirect page.
///
/// Key: [`Provider::storage_key`]. Deleted by the reader on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageRecord {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp_ms: i64,
    /// Correlation token echoed back by the redirect page, when it has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<CorrelationToken>,
}

impl StorageRecord {
    pub fn new(success: bool, data: Option<Value>, timestamp_ms: i64) -> Self {
        Self {
            success,
            data,
            timestamp_ms,
            attempt: None,
        }
    }

    pub fn with_attempt(mut self, token: CorrelationToken) -> Self {
        self.attempt = Some(token);
        self
    }

    /// Age relative to `now_ms`. Negative when the writer's clock runs ahead.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.timestamp_ms
    }

    pub fn to_outcome(&self) -> AuthorizationOutcome {
        AuthorizationOutcome::from_flag(self.success, self.data.clone())
    }
}

/// Window message announcing an outcome:
/// `{ type: "<TAG>_CONNECTED", success, data?, attempt? }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<CorrelationToken>,
}

impl ConnectedMessage {
    pub fn new(provider: Provider, success: bool, data: Option<Value>) -> Self {
        Self {
            kind: provider.message_type(),
            success,
            data,
            attempt: None,
        }
    }

    pub fn with_attempt(mut self, token: CorrelationToken) -> Self {
        self.attempt = Some(token);
        self
    }

    /// Validate a raw window message for `provider`.
    ///
    /// Returns `None` for messages with another tag or a malformed body.
    pub fn parse(raw: &Value, provider: Provider) -> Option<Self> {
        let kind = raw.get("type")?.as_str()?;
        if kind != provider.message_type() {
            return None;
        }
        serde_json::from_value(raw.clone()).ok()
    }

    pub fn to_outcome(&self) -> AuthorizationOutcome {
        AuthorizationOutcome::from_flag(self.success, self.data.clone())
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
