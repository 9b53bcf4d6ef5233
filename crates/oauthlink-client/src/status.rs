//! Status Refresher
//!
//! Runs after an attempt resolves: refetches the provider's connection status
//! and surfaces a notification. Cancelled attempts make no backend call.

use std::sync::Arc;

use oauthlink_core::{
    AuthorizationOutcome, CancelReason, ConnectionEvent, ConnectionStatus, EventSender,
    NotificationLevel, Provider,
};
use tracing::{info, warn};

use crate::backend::{RequestError, StatusClient, StatusError};

#[derive(Clone)]
pub struct StatusRefresher {
    client: Arc<dyn StatusClient>,
    events: EventSender,
}

impl StatusRefresher {
    pub fn new(client: Arc<dyn StatusClient>, events: EventSender) -> Self {
        Self { client, events }
    }

    /// Fetch the current status and publish it
    pub async fn refresh(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        match self.client.fetch_status(provider).await {
            Ok(status) => {
                info!(
                    provider = %provider,
                    connected = status.connected,
                    "[StatusRefresher] Status refreshed"
                );
                self.events.emit(ConnectionEvent::StatusRefreshed {
                    provider,
                    status: status.clone(),
                });
                Ok(status)
            }
            Err(e) => {
                warn!(provider = %provider, error = %e, "[StatusRefresher] Status fetch failed");
                Err(e)
            }
        }
    }

    /// After `Success` or `Failure`. Returns the refetched status, if any.
    pub async fn on_resolved(
        &self,
        provider: Provider,
        outcome: &AuthorizationOutcome,
    ) -> Option<ConnectionStatus> {
        match outcome {
            AuthorizationOutcome::Success { .. } => self.notify(
                provider,
                NotificationLevel::Success,
                format!("{} connected", provider.display_name()),
            ),
            AuthorizationOutcome::Failure { reason } => self.notify(
                provider,
                NotificationLevel::Error,
                format!("{} authorization failed: {}", provider.display_name(), reason),
            ),
        }

        match self.refresh(provider).await {
            Ok(status) => Some(status),
            Err(e) => {
                self.notify(
                    provider,
                    NotificationLevel::Error,
                    format!("Could not refresh {} status: {}", provider.display_name(), e),
                );
                None
            }
        }
    }

    /// Closing the popup is silent; a timeout gets a neutral notice.
    pub fn on_cancelled(&self, provider: Provider, reason: CancelReason) {
        if reason == CancelReason::TimedOut {
            self.notify(
                provider,
                NotificationLevel::Info,
                format!("{} authorization timed out", provider.display_name()),
            );
        }
    }

    pub fn on_request_failed(&self, provider: Provider, error: &RequestError) {
        self.notify(
            provider,
            NotificationLevel::Error,
            format!("Could not start {} authorization: {}", provider.display_name(), error),
        );
    }

    /// Bind a spreadsheet after a successful spreadsheet-export attempt
    pub async fn bind_spreadsheet(
        &self,
        spreadsheet_id: &str,
    ) -> Result<ConnectionStatus, StatusError> {
        let provider = Provider::SpreadsheetExport;
        let status = self.client.bind_spreadsheet(provider, spreadsheet_id).await?;
        info!(provider = %provider, "[StatusRefresher] Spreadsheet bound");

        self.events.emit(ConnectionEvent::StatusRefreshed {
            provider,
            status: status.clone(),
        });
        self.notify(provider, NotificationLevel::Success, "Spreadsheet linked".to_string());
        Ok(status)
    }

    pub async fn disconnect(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        self.client.disconnect(provider).await?;
        self.notify(
            provider,
            NotificationLevel::Info,
            format!("{} disconnected", provider.display_name()),
        );
        self.refresh(provider).await
    }

    fn notify(&self, provider: Provider, level: NotificationLevel, message: String) {
        self.events.emit(ConnectionEvent::Notification {
            provider,
            level,
            message,
        });
    }
}
