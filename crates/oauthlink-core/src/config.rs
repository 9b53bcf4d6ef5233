//! Coordinator configuration
//!
//! Each integration is a thin [`ProviderConfig`] record; the divergences
//! between integrations (poll interval, popup naming) live here as data.
//! Values can be overridden with `OAUTHLINK_*` environment variables.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::Provider;

/// Default recency window for storage records (10 s)
pub const DEFAULT_RECENCY_WINDOW_MS: u64 = 10_000;

/// Default time a user has to finish the external flow (5 minutes)
pub const DEFAULT_ATTEMPT_TIMEOUT_SECS: u64 = 300;

const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080";
const ENV_PREFIX: &str = "OAUTHLINK_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
    #[error("invalid backend url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("failed to build http client: {0}")]
    HttpClient(String),
}

/// Window parameters for the authorization popup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
    /// Named target; reopening with the same name reuses the live window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
}

impl PopupFeatures {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            target_name: None,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    /// Window features string, e.g. `width=600,height=700,scrollbars=yes`
    pub fn feature_string(&self) -> String {
        format!(
            "width={},height={},scrollbars=yes,resizable=yes",
            self.width, self.height
        )
    }
}

/// Per-integration configuration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    /// `GET` returning `{ authUrl }`
    pub authorize_path: String,
    /// `GET` returning the provider's `ConnectionStatus`
    pub status_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnect_path: Option<String>,
    /// Post-success binding step (spreadsheet export only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_path: Option<String>,
    /// Storage poll and popup-closed poll interval
    pub poll_interval_ms: u64,
    pub popup: PopupFeatures,
}

impl ProviderConfig {
    pub fn storage_backup() -> Self {
        Self {
            provider: Provider::StorageBackup,
            authorize_path: "/api/backup/google-drive/auth-url".to_string(),
            status_path: "/api/backup/google-drive/status".to_string(),
            disconnect_path: Some("/api/backup/google-drive/disconnect".to_string()),
            bind_path: None,
            poll_interval_ms: 500,
            popup: PopupFeatures::new(500, 600).named("drive_auth"),
        }
    }

    pub fn calendar() -> Self {
        Self {
            provider: Provider::Calendar,
            authorize_path: "/api/calendar/google/auth-url".to_string(),
            status_path: "/api/calendar/google/status".to_string(),
            disconnect_path: Some("/api/calendar/google/disconnect".to_string()),
            bind_path: None,
            poll_interval_ms: 1_000,
            popup: PopupFeatures::new(500, 600).named("calendar_auth"),
        }
    }

    pub fn spreadsheet_export() -> Self {
        Self {
            provider: Provider::SpreadsheetExport,
            authorize_path: "/api/export/google-sheets/auth-url".to_string(),
            status_path: "/api/export/google-sheets/status".to_string(),
            disconnect_path: Some("/api/export/google-sheets/disconnect".to_string()),
            bind_path: Some("/api/export/google-sheets/spreadsheet".to_string()),
            poll_interval_ms: 500,
            popup: PopupFeatures::new(600, 700).named("google_sheets_auth"),
        }
    }

    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::StorageBackup => Self::storage_backup(),
            Provider::Calendar => Self::calendar(),
            Provider::SpreadsheetExport => Self::spreadsheet_export(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub backend_base_url: Url,
    pub attempt_timeout_secs: u64,
    pub recency_window_ms: u64,
    pub providers: Vec<ProviderConfig>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            backend_base_url: Url::parse(DEFAULT_BACKEND_URL)
                .expect("DEFAULT_BACKEND_URL is a valid url"),
            attempt_timeout_secs: DEFAULT_ATTEMPT_TIMEOUT_SECS,
            recency_window_ms: DEFAULT_RECENCY_WINDOW_MS,
            providers: Provider::ALL
                .iter()
                .map(|p| ProviderConfig::for_provider(*p))
                .collect(),
        }
    }
}

impl CoordinatorConfig {
    pub fn with_backend_url(base: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            backend_base_url: Url::parse(base)?,
            ..Self::default()
        })
    }

    /// Load from `.env` and the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source (unprefixed names are looked
    /// up with the `OAUTHLINK_` prefix)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));
        let mut config = Self::default();

        if let Some(url) = var("BACKEND_URL") {
            config.backend_base_url = Url::parse(&url)?;
        }
        if let Some(v) = var("ATTEMPT_TIMEOUT_SECS") {
            config.attempt_timeout_secs = parse_u64("ATTEMPT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("RECENCY_WINDOW_MS") {
            config.recency_window_ms = parse_u64("RECENCY_WINDOW_MS", &v)?;
        }
        for provider in config.providers.iter_mut() {
            let key = format!("{}_POLL_MS", provider.provider.tag());
            if let Some(v) = var(&key) {
                provider.poll_interval_ms = parse_u64(&key, &v)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.attempt_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("attempt_timeout_secs"));
        }
        if self.recency_window_ms == 0 {
            return Err(ConfigError::ZeroDuration("recency_window_ms"));
        }
        if self.providers.iter().any(|p| p.poll_interval_ms == 0) {
            return Err(ConfigError::ZeroDuration("poll_interval_ms"));
        }
        Ok(())
    }

    pub fn provider(&self, provider: Provider) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.provider == provider)
    }

    /// Replace (or add) one provider record
    pub fn with_provider(mut self, config: ProviderConfig) -> Self {
        self.providers.retain(|p| p.provider != config.provider);
        self.providers.push(config);
        self
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn recency_window(&self) -> Duration {
        Duration::from_millis(self.recency_window_ms)
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{}{}", ENV_PREFIX, key),
        value: value.to_string(),
    })
}

/// Logging setup consumed by `oauthlink_client::logging::init_tracing`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set
    pub level: String,
    /// Directory for daily-rotated log files; console only when `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
            file_prefix: "oauthlink".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();
        if let Ok(level) = std::env::var(format!("{}LOG_LEVEL", ENV_PREFIX)) {
            config.level = level;
        }
        if let Ok(dir) = std::env::var(format!("{}LOG_DIR", ENV_PREFIX)) {
            config.log_dir = Some(PathBuf::from(dir));
        }
        config
    }
}
