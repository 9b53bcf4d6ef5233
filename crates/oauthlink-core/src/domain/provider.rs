//! External integrations a user can link

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External integration targeted by a connection attempt.
///
/// Each provider owns one message tag (`<TAG>_CONNECTED`) and one
/// well-known shared store key (`<tag>_auth_result`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Cloud-storage backup (Drive)
    StorageBackup,
    /// Calendar sync
    Calendar,
    /// Spreadsheet export (Sheets)
    SpreadsheetExport,
}

impl Provider {
    pub const ALL: [Provider; 3] = [
        Provider::StorageBackup,
        Provider::Calendar,
        Provider::SpreadsheetExport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StorageBackup => "storage_backup",
            Self::Calendar => "calendar",
            Self::SpreadsheetExport => "spreadsheet_export",
        }
    }

    /// Upper-case tag used in window message types.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::StorageBackup => "DRIVE",
            Self::Calendar => "CALENDAR",
            Self::SpreadsheetExport => "SHEETS",
        }
    }

    /// Message type announcing an outcome, e.g. `DRIVE_CONNECTED`.
    pub fn message_type(&self) -> String {
        format!("{}_CONNECTED", self.tag())
    }

    /// Shared store key the redirect page writes to, e.g. `drive_auth_result`.
    pub fn storage_key(&self) -> String {
        format!("{}_auth_result", self.tag().to_ascii_lowercase())
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::StorageBackup => "Google Drive backup",
            Self::Calendar => "Google Calendar",
            Self::SpreadsheetExport => "Google Sheets export",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "storage_backup" | "drive" => Ok(Self::StorageBackup),
            "calendar" => Ok(Self::Calendar),
            "spreadsheet_export" | "sheets" => Ok(Self::SpreadsheetExport),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}
