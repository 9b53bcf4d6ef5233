//! Backend HTTP client
//!
//! - [`AuthorizationRequester`]: `GET <authorize_path>?attempt=<token>` → `{ authUrl }`
//! - [`StatusClient`]: status, disconnect and spreadsheet binding endpoints
//!
//! [`BackendClient`] implements both against the configured base URL.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use oauthlink_core::{
    ConfigError, ConnectionStatus, CoordinatorConfig, CorrelationToken, Provider, ProviderConfig,
};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::popup::PopupError;

const HTTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Why an attempt failed before any popup was opened
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
    #[error("{endpoint} returned no authorization URL")]
    MissingUrl { endpoint: String },
    #[error("no configuration for provider {0}")]
    UnknownProvider(Provider),
    #[error(transparent)]
    Popup(#[from] PopupError),
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("malformed response from {endpoint}: {message}")]
    Malformed { endpoint: String, message: String },
    #[error("{operation} is not supported for {provider}")]
    Unsupported {
        provider: Provider,
        operation: &'static str,
    },
    #[error("no configuration for provider {0}")]
    UnknownProvider(Provider),
}

#[async_trait]
pub trait AuthorizationRequester: Send + Sync {
    /// Obtain a one-time authorization URL for `provider`.
    ///
    /// No side effects beyond the network call.
    async fn request_authorization_url(
        &self,
        provider: Provider,
        attempt: &CorrelationToken,
    ) -> Result<Url, RequestError>;
}

#[async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch_status(&self, provider: Provider) -> Result<ConnectionStatus, StatusError>;

    async fn disconnect(&self, provider: Provider) -> Result<(), StatusError>;

    async fn bind_spreadsheet(
        &self,
        provider: Provider,
        spreadsheet_id: &str,
    ) -> Result<ConnectionStatus, StatusError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthUrlResponse {
    #[serde(default)]
    auth_url: Option<String>,
}

#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
    providers: HashMap<Provider, ProviderConfig>,
}

impl BackendClient {
    pub fn new(config: &CoordinatorConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self::with_client(http, config))
    }

    /// Create with a custom HTTP client (useful for testing)
    pub fn with_client(http: reqwest::Client, config: &CoordinatorConfig) -> Self {
        Self {
            http,
            base: config.backend_base_url.clone(),
            providers: config
                .providers
                .iter()
                .map(|p| (p.provider, p.clone()))
                .collect(),
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base.join(path)
    }

    fn provider(&self, provider: Provider) -> Option<&ProviderConfig> {
        self.providers.get(&provider)
    }

    async fn get_status(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        let config = self
            .provider(provider)
            .ok_or(StatusError::UnknownProvider(provider))?;
        let url = self.endpoint(&config.status_path).map_err(|e| StatusError::Malformed {
            endpoint: config.status_path.clone(),
            message: e.to_string(),
        })?;
        let endpoint = url.path().to_string();

        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StatusError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;
        status_body(endpoint, response).await
    }
}

async fn status_body(
    endpoint: String,
    response: reqwest::Response,
) -> Result<ConnectionStatus, StatusError> {
    if !response.status().is_success() {
        return Err(StatusError::Status {
            endpoint,
            status: response.status().as_u16(),
        });
    }
    response
        .json::<ConnectionStatus>()
        .await
        .map_err(|e| StatusError::Malformed {
            endpoint,
            message: e.to_string(),
        })
}

#[async_trait]
impl AuthorizationRequester for BackendClient {
    async fn request_authorization_url(
        &self,
        provider: Provider,
        attempt: &CorrelationToken,
    ) -> Result<Url, RequestError> {
        let config = self
            .provider(provider)
            .ok_or(RequestError::UnknownProvider(provider))?;
        let mut url = self
            .endpoint(&config.authorize_path)
            .map_err(|e| RequestError::Malformed {
                endpoint: config.authorize_path.clone(),
                message: e.to_string(),
            })?;
        url.query_pairs_mut()
            .append_pair("attempt", &attempt.to_string());
        let endpoint = url.path().to_string();

        debug!(provider = %provider, endpoint = %endpoint, "[Requester] Requesting authorization URL");

        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(provider = %provider, error = %e, "[Requester] Request failed");
                RequestError::Transport {
                    endpoint: endpoint.clone(),
                    message: e.to_string(),
                }
            })?;

        if !response.status().is_success() {
            warn!(
                provider = %provider,
                status = response.status().as_u16(),
                "[Requester] Backend refused authorization URL"
            );
            return Err(RequestError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }

        let body: AuthUrlResponse =
            response
                .json()
                .await
                .map_err(|e| RequestError::Malformed {
                    endpoint: endpoint.clone(),
                    message: e.to_string(),
                })?;

        let raw = body
            .auth_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| RequestError::MissingUrl {
                endpoint: endpoint.clone(),
            })?;

        let auth_url = Url::parse(&raw).map_err(|e| RequestError::Malformed {
            endpoint,
            message: format!("authUrl is not a valid URL: {}", e),
        })?;

        info!(provider = %provider, host = auth_url.host_str().unwrap_or(""), "[Requester] Got authorization URL");
        Ok(auth_url)
    }
}

#[async_trait]
impl StatusClient for BackendClient {
    async fn fetch_status(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        self.get_status(provider).await
    }

    async fn disconnect(&self, provider: Provider) -> Result<(), StatusError> {
        let config = self
            .provider(provider)
            .ok_or(StatusError::UnknownProvider(provider))?;
        let path = config
            .disconnect_path
            .as_deref()
            .ok_or(StatusError::Unsupported {
                provider,
                operation: "disconnect",
            })?;
        let url = self.endpoint(path).map_err(|e| StatusError::Malformed {
            endpoint: path.to_string(),
            message: e.to_string(),
        })?;
        let endpoint = url.path().to_string();

        let response = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| StatusError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StatusError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }
        info!(provider = %provider, "[Requester] Disconnected");
        Ok(())
    }

    async fn bind_spreadsheet(
        &self,
        provider: Provider,
        spreadsheet_id: &str,
    ) -> Result<ConnectionStatus, StatusError> {
        let config = self
            .provider(provider)
            .ok_or(StatusError::UnknownProvider(provider))?;
        let path = config.bind_path.as_deref().ok_or(StatusError::Unsupported {
            provider,
            operation: "bind_spreadsheet",
        })?;
        let url = self.endpoint(path).map_err(|e| StatusError::Malformed {
            endpoint: path.to_string(),
            message: e.to_string(),
        })?;
        let endpoint = url.path().to_string();

        let response = self
            .http
            .post(url)
            .json(&json!({ "spreadsheetId": spreadsheet_id }))
            .send()
            .await
            .map_err(|e| StatusError::Transport {
                endpoint: endpoint.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StatusError::Status {
                endpoint,
                status: response.status().as_u16(),
            });
        }

        // The bind endpoint may answer with an empty body; status is refetched then
        let bytes = response.bytes().await.map_err(|e| StatusError::Transport {
            endpoint: endpoint.clone(),
            message: e.to_string(),
        })?;
        if bytes.is_empty() {
            return self.get_status(provider).await;
        }
        serde_json::from_slice(&bytes).map_err(|e| StatusError::Malformed {
            endpoint,
            message: e.to_string(),
        })
    }
}
