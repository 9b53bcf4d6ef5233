//! Connection Coordinator
//!
//! One generic flow for every provider:
//!
//! ```text
//! connect(provider)
//!   ├─ Authorization Requester  → authUrl (or RequestFailed, nothing opened)
//!   ├─ Popup Window Manager     → window owned by this attempt
//!   ├─ Resolution Arbiter       → message | storage | popup closed | timeout
//!   ├─ close popup, dispose every registration
//!   └─ Status Refresher         → refetch status, notify
//! ```
//!
//! At most one unresolved attempt per provider: starting a new one abandons
//! the previous one. [`ConnectionCoordinator::teardown`] abandons everything
//! and is also run on drop.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use oauthlink_core::{
    AuthorizationOutcome, CancelReason, Clock, ConfigError, ConnectionAttempt, ConnectionEvent,
    ConnectionStatus, CoordinatorConfig, CorrelationToken, EventBus, EventReceiver, MemoryStore,
    Provider, ProviderConfig, ResolutionKind, SharedStore, SignalSource, SystemClock,
};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::arbiter::{ArbiterVerdict, ResolutionArbiter};
use crate::backend::{AuthorizationRequester, BackendClient, RequestError, StatusClient, StatusError};
use crate::channels::{DeliveryChannel, MessageChannel, RegistrationLedger, StorageChannel};
use crate::message_bus::WindowMessageBus;
use crate::popup::{PopupHost, PopupWindowManager, SystemBrowserHost};
use crate::status::StatusRefresher;

/// Terminal state of one `connect` call. Errors never escape the coordinator;
/// they end up here.
#[derive(Debug)]
pub enum AttemptResolution {
    Connected {
        attempt: CorrelationToken,
        source: SignalSource,
        payload: Option<Value>,
        /// `None` when the status refetch failed
        status: Option<ConnectionStatus>,
    },
    Denied {
        attempt: CorrelationToken,
        source: SignalSource,
        reason: String,
        status: Option<ConnectionStatus>,
    },
    Cancelled {
        attempt: CorrelationToken,
        reason: CancelReason,
    },
    RequestFailed {
        attempt: CorrelationToken,
        error: RequestError,
    },
    /// Superseded by a newer attempt or torn down with its surface
    Abandoned { attempt: CorrelationToken },
}

impl AttemptResolution {
    /// `None` for abandoned attempts, which never reach a resolution
    pub fn kind(&self) -> Option<ResolutionKind> {
        match self {
            Self::Connected { .. } => Some(ResolutionKind::Success),
            Self::Denied { .. } => Some(ResolutionKind::Failure),
            Self::Cancelled { .. } => Some(ResolutionKind::Cancelled),
            Self::RequestFailed { .. } => Some(ResolutionKind::RequestFailed),
            Self::Abandoned { .. } => None,
        }
    }

    pub fn attempt(&self) -> CorrelationToken {
        match self {
            Self::Connected { attempt, .. }
            | Self::Denied { attempt, .. }
            | Self::Cancelled { attempt, .. }
            | Self::RequestFailed { attempt, .. }
            | Self::Abandoned { attempt } => *attempt,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }
}

/// Upper bound on waiting for a superseded attempt to release its popup
const SUPERSEDE_GRACE: Duration = Duration::from_secs(2);

struct ActiveAttempt {
    token: CorrelationToken,
    abort: CancellationToken,
    /// Cancelled once the attempt's popup is closed and its registrations disposed
    released: CancellationToken,
}

/// Removes the attempt from the active map, unless a newer one replaced it,
/// then reports the attempt as released.
///
/// Declared before the popup in `run_attempt`, so it drops after it.
struct ActiveRegistration<'a> {
    active: &'a DashMap<Provider, ActiveAttempt>,
    provider: Provider,
    token: CorrelationToken,
    released: CancellationToken,
}

impl Drop for ActiveRegistration<'_> {
    fn drop(&mut self) {
        self.active
            .remove_if(&self.provider, |_, current| current.token == self.token);
        self.released.cancel();
    }
}

pub struct ConnectionCoordinator {
    config: CoordinatorConfig,
    requester: Arc<dyn AuthorizationRequester>,
    popup_host: Arc<dyn PopupHost>,
    message_bus: WindowMessageBus,
    message_channel: Arc<MessageChannel>,
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
    refresher: StatusRefresher,
    events: EventBus,
    active: DashMap<Provider, ActiveAttempt>,
    ledger: RegistrationLedger,
    surface: CancellationToken,
}

impl ConnectionCoordinator {
    pub fn builder(config: CoordinatorConfig) -> CoordinatorBuilder {
        CoordinatorBuilder::new(config)
    }

    /// Run one full authorization attempt for `provider`.
    pub async fn connect(&self, provider: Provider) -> AttemptResolution {
        let attempt = ConnectionAttempt::new(provider);
        let span = info_span!("attempt", provider = %provider, token = %attempt.token.short());
        self.run_attempt(attempt).instrument(span).await
    }

    async fn run_attempt(&self, attempt: ConnectionAttempt) -> AttemptResolution {
        let provider = attempt.provider;
        let token = attempt.token;

        if self.surface.is_cancelled() {
            debug!("[Coordinator] Surface torn down, not starting attempt");
            return AttemptResolution::Abandoned { attempt: token };
        }

        let Some(provider_config) = self.config.provider(provider).cloned() else {
            return self.fail_request(&attempt, RequestError::UnknownProvider(provider));
        };

        let abort = self.surface.child_token();
        let (registration, superseded) = self.register(&attempt, abort.clone());

        info!(provider = %provider, "[Coordinator] Attempt started");
        self.emit(ConnectionEvent::AttemptStarted {
            provider,
            attempt: token,
        });

        // The previous attempt must be gone before this one opens anything
        if let Some(released) = superseded {
            tokio::select! {
                biased;
                _ = abort.cancelled() => return self.abandon(&attempt),
                _ = released.cancelled() => {
                    debug!(provider = %provider, "[Coordinator] Superseded attempt released");
                }
                _ = tokio::time::sleep(SUPERSEDE_GRACE) => {
                    warn!(
                        provider = %provider,
                        grace_ms = SUPERSEDE_GRACE.as_millis() as u64,
                        "[Coordinator] Superseded attempt still holds resources, continuing"
                    );
                }
            }
        }

        let requested = tokio::select! {
            biased;
            _ = abort.cancelled() => None,
            result = self.requester.request_authorization_url(provider, &token) => Some(result),
        };
        let auth_url = match requested {
            None => return self.abandon(&attempt),
            Some(Ok(url)) => url,
            Some(Err(e)) => return self.fail_request(&attempt, e),
        };

        let popup = match PopupWindowManager::open(
            self.popup_host.as_ref(),
            &auth_url,
            &provider_config.popup,
        ) {
            Ok(popup) => popup,
            Err(e) => return self.fail_request(&attempt, e.into()),
        };
        self.emit(ConnectionEvent::PopupOpened {
            provider,
            attempt: token,
        });

        let channels = self.channels_for(&provider_config);
        let verdict = ResolutionArbiter::new(self.ledger.clone())
            .run(
                &attempt,
                &channels,
                popup.watch(),
                provider_config.poll_interval(),
                self.config.attempt_timeout(),
                &abort,
            )
            .await;

        popup.close();
        drop(registration);

        match verdict {
            ArbiterVerdict::Delivered(signal) => {
                self.emit(ConnectionEvent::AttemptResolved {
                    provider,
                    attempt: token,
                    kind: if signal.outcome.is_success() {
                        ResolutionKind::Success
                    } else {
                        ResolutionKind::Failure
                    },
                    source: Some(signal.source),
                    cancel_reason: None,
                });
                let status = self.refresher.on_resolved(provider, &signal.outcome).await;

                match signal.outcome {
                    AuthorizationOutcome::Success { provider_payload } => {
                        AttemptResolution::Connected {
                            attempt: token,
                            source: signal.source,
                            payload: provider_payload,
                            status,
                        }
                    }
                    AuthorizationOutcome::Failure { reason } => {
                        AttemptResolution::Denied {
                            attempt: token,
                            source: signal.source,
                            reason,
                            status,
                        }
                    }
                }
            }
            ArbiterVerdict::Cancelled(reason) => {
                self.emit(ConnectionEvent::AttemptResolved {
                    provider,
                    attempt: token,
                    kind: ResolutionKind::Cancelled,
                    source: None,
                    cancel_reason: Some(reason),
                });
                self.refresher.on_cancelled(provider, reason);
                AttemptResolution::Cancelled {
                    attempt: token,
                    reason,
                }
            }
            ArbiterVerdict::Aborted => self.abandon(&attempt),
        }
    }

    fn channels_for(&self, provider_config: &ProviderConfig) -> Vec<Arc<dyn DeliveryChannel>> {
        let storage = StorageChannel::new(
            self.store.clone(),
            self.clock.clone(),
            provider_config.poll_interval(),
            self.config.recency_window(),
        );
        let message: Arc<dyn DeliveryChannel> = self.message_channel.clone();
        vec![message, Arc::new(storage)]
    }

    /// Make `attempt` the active one for its provider. Returns the release
    /// token of the attempt it superseded, already told to abort.
    fn register(
        &self,
        attempt: &ConnectionAttempt,
        abort: CancellationToken,
    ) -> (ActiveRegistration<'_>, Option<CancellationToken>) {
        let released = CancellationToken::new();
        let previous = self.active.insert(
            attempt.provider,
            ActiveAttempt {
                token: attempt.token,
                abort,
                released: released.clone(),
            },
        );
        let superseded = previous.map(|previous| {
            info!(
                provider = %attempt.provider,
                previous = %previous.token.short(),
                "[Coordinator] Superseding unresolved attempt"
            );
            previous.abort.cancel();
            previous.released
        });
        let registration = ActiveRegistration {
            active: &self.active,
            provider: attempt.provider,
            token: attempt.token,
            released,
        };
        (registration, superseded)
    }

    fn fail_request(&self, attempt: &ConnectionAttempt, error: RequestError) -> AttemptResolution {
        attempt.try_resolve();
        warn!(provider = %attempt.provider, error = %error, "[Coordinator] Attempt failed before popup");
        self.emit(ConnectionEvent::AttemptResolved {
            provider: attempt.provider,
            attempt: attempt.token,
            kind: ResolutionKind::RequestFailed,
            source: None,
            cancel_reason: None,
        });
        self.refresher.on_request_failed(attempt.provider, &error);
        AttemptResolution::RequestFailed {
            attempt: attempt.token,
            error,
        }
    }

    fn abandon(&self, attempt: &ConnectionAttempt) -> AttemptResolution {
        attempt.try_resolve();
        info!(provider = %attempt.provider, "[Coordinator] Attempt abandoned");
        self.emit(ConnectionEvent::AttemptAbandoned {
            provider: attempt.provider,
            attempt: attempt.token,
        });
        AttemptResolution::Abandoned {
            attempt: attempt.token,
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        self.events.sender().emit(event);
    }

    /// Abandon the unresolved attempt for `provider`, if any
    pub fn cancel(&self, provider: Provider) -> bool {
        match self.active.get(&provider) {
            Some(active) => {
                info!(provider = %provider, attempt = %active.token.short(), "[Coordinator] Cancelling attempt");
                active.abort.cancel();
                true
            }
            None => false,
        }
    }

    /// Owning surface is going away: abandon every attempt. Later `connect`
    /// calls return `Abandoned` immediately.
    pub fn teardown(&self) {
        if self.surface.is_cancelled() {
            return;
        }
        info!(pending = self.active.len(), "[Coordinator] Tearing down");
        self.surface.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.surface.is_cancelled()
    }

    pub fn is_pending(&self, provider: Provider) -> bool {
        self.active.contains_key(&provider)
    }

    pub fn pending_attempt(&self, provider: Provider) -> Option<CorrelationToken> {
        self.active.get(&provider).map(|a| a.token)
    }

    /// Current status, without starting an attempt
    pub async fn status(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        self.refresher.refresh(provider).await
    }

    pub async fn disconnect(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        self.refresher.disconnect(provider).await
    }

    /// Post-success binding step for the spreadsheet export
    pub async fn bind_spreadsheet(
        &self,
        spreadsheet_id: &str,
    ) -> Result<ConnectionStatus, StatusError> {
        self.refresher.bind_spreadsheet(spreadsheet_id).await
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    pub fn ledger(&self) -> &RegistrationLedger {
        &self.ledger
    }

    /// Bus the redirect page posts `<TAG>_CONNECTED` messages on
    pub fn message_bus(&self) -> &WindowMessageBus {
        &self.message_bus
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }
}

impl Drop for ConnectionCoordinator {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Builder with production defaults for everything not supplied
pub struct CoordinatorBuilder {
    config: CoordinatorConfig,
    requester: Option<Arc<dyn AuthorizationRequester>>,
    status_client: Option<Arc<dyn StatusClient>>,
    popup_host: Option<Arc<dyn PopupHost>>,
    store: Option<Arc<dyn SharedStore>>,
    clock: Option<Arc<dyn Clock>>,
    events: Option<EventBus>,
    message_bus: Option<WindowMessageBus>,
}

impl CoordinatorBuilder {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            requester: None,
            status_client: None,
            popup_host: None,
            store: None,
            clock: None,
            events: None,
            message_bus: None,
        }
    }

    pub fn with_requester(mut self, requester: Arc<dyn AuthorizationRequester>) -> Self {
        self.requester = Some(requester);
        self
    }

    pub fn with_status_client(mut self, client: Arc<dyn StatusClient>) -> Self {
        self.status_client = Some(client);
        self
    }

    /// Use one backend client for both the requester and status endpoints
    pub fn with_backend(mut self, backend: Arc<BackendClient>) -> Self {
        let requester: Arc<dyn AuthorizationRequester> = backend.clone();
        let status_client: Arc<dyn StatusClient> = backend;
        self.requester = Some(requester);
        self.status_client = Some(status_client);
        self
    }

    pub fn with_popup_host(mut self, host: Arc<dyn PopupHost>) -> Self {
        self.popup_host = Some(host);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SharedStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_message_bus(mut self, bus: WindowMessageBus) -> Self {
        self.message_bus = Some(bus);
        self
    }

    pub fn build(self) -> Result<ConnectionCoordinator, ConfigError> {
        self.config.validate()?;

        let (requester, status_client) = match (self.requester, self.status_client) {
            (Some(requester), Some(status)) => (requester, status),
            (requester, status) => {
                let backend = Arc::new(BackendClient::new(&self.config)?);
                let default_requester: Arc<dyn AuthorizationRequester> = backend.clone();
                let default_status: Arc<dyn StatusClient> = backend;
                (
                    requester.unwrap_or(default_requester),
                    status.unwrap_or(default_status),
                )
            }
        };

        let events = self.events.unwrap_or_default();
        let message_bus = self.message_bus.unwrap_or_default();

        Ok(ConnectionCoordinator {
            requester,
            popup_host: self
                .popup_host
                .unwrap_or_else(|| Arc::new(SystemBrowserHost::new())),
            message_channel: Arc::new(MessageChannel::new(message_bus.clone())),
            message_bus,
            store: self.store.unwrap_or_else(|| Arc::new(MemoryStore::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            refresher: StatusRefresher::new(status_client, events.sender()),
            events,
            active: DashMap::new(),
            ledger: RegistrationLedger::new(),
            surface: CancellationToken::new(),
            config: self.config,
        })
    }
}
