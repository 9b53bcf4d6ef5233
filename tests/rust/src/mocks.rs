//! Mock collaborators for coordinator tests
//!
//! In-memory stand-ins for the backend, the windowing host and the status
//! endpoints, each recording how it was called.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use oauthlink_client::{
    AuthorizationRequester, PopupError, PopupHost, PopupWindow, RequestError, StatusClient,
    StatusError,
};
use oauthlink_core::{ConnectionStatus, CorrelationToken, PopupFeatures, Provider};
use url::Url;

// ============================================================================
// MockRequester
// ============================================================================

pub struct MockRequester {
    auth_url: Url,
    fail_status: RwLock<Option<u16>>,
    delay: RwLock<Duration>,
    calls: RwLock<Vec<(Provider, CorrelationToken)>>,
}

impl MockRequester {
    pub fn new() -> Self {
        Self {
            auth_url: Url::parse("https://accounts.example.com/o/oauth2/auth?client_id=test")
                .unwrap(),
            fail_status: RwLock::new(None),
            delay: RwLock::new(Duration::ZERO),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Every request answers with this HTTP status
    pub fn failing(status: u16) -> Self {
        let requester = Self::new();
        *requester.fail_status.write().unwrap() = Some(status);
        requester
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.write().unwrap() = delay;
    }

    pub fn calls(&self) -> Vec<(Provider, CorrelationToken)> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }
}

impl Default for MockRequester {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationRequester for MockRequester {
    async fn request_authorization_url(
        &self,
        provider: Provider,
        attempt: &CorrelationToken,
    ) -> Result<Url, RequestError> {
        self.calls.write().unwrap().push((provider, *attempt));

        let delay = *self.delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if let Some(status) = *self.fail_status.read().unwrap() {
            return Err(RequestError::Status {
                endpoint: format!("/mock/{}/auth-url", provider),
                status,
            });
        }
        Ok(self.auth_url.clone())
    }
}

// ============================================================================
// MockPopupHost
// ============================================================================

#[derive(Default)]
pub struct MockPopup {
    pub url: Option<Url>,
    pub features: Option<PopupFeatures>,
    closed: AtomicBool,
    close_calls: AtomicUsize,
}

impl MockPopup {
    /// The user closes the window by hand
    pub fn simulate_user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Times the coordinator asked for the window to close
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl PopupWindow for MockPopup {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MockPopupHost {
    windows: RwLock<Vec<Arc<MockPopup>>>,
    live_at_open: RwLock<Vec<usize>>,
    block_next: AtomicBool,
}

impl MockPopupHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next `open` fails as if a popup blocker intervened
    pub fn block_next(&self) {
        self.block_next.store(true, Ordering::SeqCst);
    }

    pub fn open_count(&self) -> usize {
        self.windows.read().unwrap().len()
    }

    pub fn window(&self, index: usize) -> Option<Arc<MockPopup>> {
        self.windows.read().unwrap().get(index).cloned()
    }

    pub fn last_window(&self) -> Option<Arc<MockPopup>> {
        self.windows.read().unwrap().last().cloned()
    }

    /// For each `open`, how many earlier windows were still live
    pub fn live_at_open(&self) -> Vec<usize> {
        self.live_at_open.read().unwrap().clone()
    }

    /// Windows not yet closed
    pub fn live_windows(&self) -> usize {
        self.windows
            .read()
            .unwrap()
            .iter()
            .filter(|w| !w.is_closed())
            .count()
    }
}

impl PopupHost for MockPopupHost {
    fn open(
        &self,
        url: &Url,
        features: &PopupFeatures,
    ) -> Result<Arc<dyn PopupWindow>, PopupError> {
        if self.block_next.swap(false, Ordering::SeqCst) {
            return Err(PopupError::Blocked);
        }
        let live = self.live_windows();
        self.live_at_open.write().unwrap().push(live);

        let window = Arc::new(MockPopup {
            url: Some(url.clone()),
            features: Some(features.clone()),
            ..Default::default()
        });
        self.windows.write().unwrap().push(window.clone());
        Ok(window)
    }
}

// ============================================================================
// RecordingStatusClient
// ============================================================================

pub struct RecordingStatusClient {
    status: RwLock<ConnectionStatus>,
    fail_fetch: AtomicBool,
    fetches: AtomicUsize,
    disconnects: AtomicUsize,
    bound: RwLock<Vec<String>>,
}

impl RecordingStatusClient {
    pub fn new() -> Self {
        Self {
            status: RwLock::new(ConnectionStatus::connected()),
            fail_fetch: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
            disconnects: AtomicUsize::new(0),
            bound: RwLock::new(Vec::new()),
        }
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().unwrap() = status;
    }

    pub fn fail_fetches(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn disconnect_count(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn bound_spreadsheets(&self) -> Vec<String> {
        self.bound.read().unwrap().clone()
    }
}

impl Default for RecordingStatusClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StatusClient for RecordingStatusClient {
    async fn fetch_status(&self, provider: Provider) -> Result<ConnectionStatus, StatusError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(StatusError::Status {
                endpoint: format!("/mock/{}/status", provider),
                status: 503,
            });
        }
        Ok(self.status.read().unwrap().clone())
    }

    async fn disconnect(&self, _provider: Provider) -> Result<(), StatusError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.set_status(ConnectionStatus::disconnected());
        Ok(())
    }

    async fn bind_spreadsheet(
        &self,
        provider: Provider,
        spreadsheet_id: &str,
    ) -> Result<ConnectionStatus, StatusError> {
        if provider != Provider::SpreadsheetExport {
            return Err(StatusError::Unsupported {
                provider,
                operation: "bind_spreadsheet",
            });
        }
        self.bound.write().unwrap().push(spreadsheet_id.to_string());
        let status = ConnectionStatus {
            spreadsheet_id: Some(spreadsheet_id.to_string()),
            ..ConnectionStatus::connected()
        };
        self.set_status(status.clone());
        Ok(status)
    }
}
