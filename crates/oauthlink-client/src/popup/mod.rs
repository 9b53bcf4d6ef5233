//! Popup Window Manager
//!
//! Owns the interactive window for exactly one attempt. The window is closed
//! when the manager is closed or dropped, whichever comes first.

mod system;

pub use system::SystemBrowserHost;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use oauthlink_core::PopupFeatures;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum PopupError {
    #[error("popup was blocked")]
    Blocked,
    #[error("failed to launch popup: {0}")]
    Launch(String),
}

/// Handle to one open window
pub trait PopupWindow: Send + Sync {
    fn is_closed(&self) -> bool;

    /// Request close. Must be safe to call on an already closed window.
    fn close(&self);
}

/// Windowing backend that can open popups
pub trait PopupHost: Send + Sync {
    fn open(&self, url: &Url, features: &PopupFeatures)
        -> Result<Arc<dyn PopupWindow>, PopupError>;
}

/// Read-only view of the popup, polled by the arbiter
#[derive(Clone)]
pub struct PopupWatch {
    window: Arc<dyn PopupWindow>,
}

impl PopupWatch {
    pub fn new(window: Arc<dyn PopupWindow>) -> Self {
        Self { window }
    }

    pub fn is_closed(&self) -> bool {
        self.window.is_closed()
    }
}

/// Exclusive owner of the attempt's window
pub struct PopupWindowManager {
    window: Arc<dyn PopupWindow>,
    released: AtomicBool,
}

impl PopupWindowManager {
    pub fn open(
        host: &dyn PopupHost,
        url: &Url,
        features: &PopupFeatures,
    ) -> Result<Self, PopupError> {
        let window = host.open(url, features)?;
        info!(
            target_name = features.target_name.as_deref().unwrap_or("_blank"),
            features = %features.feature_string(),
            "[Popup] Opened authorization window"
        );
        Ok(Self {
            window,
            released: AtomicBool::new(false),
        })
    }

    /// Whether the window is still open
    pub fn is_open(&self) -> bool {
        !self.is_released() && !self.window.is_closed()
    }

    pub fn watch(&self) -> PopupWatch {
        PopupWatch::new(self.window.clone())
    }

    /// Close the window if still open. Idempotent.
    pub fn close(&self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.window.is_closed() {
            debug!("[Popup] Window already closed by user");
        } else {
            self.window.close();
            debug!("[Popup] Closed authorization window");
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl Drop for PopupWindowManager {
    fn drop(&mut self) {
        self.close();
    }
}
