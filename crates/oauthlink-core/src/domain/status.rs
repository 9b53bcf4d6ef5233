//! Connection status read model

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Per-provider connection status owned by the backend.
///
/// The shape varies (`{connected, hasToken}`, `{connected}`,
/// `{connected, spreadsheetId}`); unknown fields are kept in `extra`.
/// The coordinator only refetches it, it never interprets or mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    #[serde(default)]
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_token: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionStatus {
    pub fn connected() -> Self {
        Self {
            connected: true,
            ..Self::default()
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}
