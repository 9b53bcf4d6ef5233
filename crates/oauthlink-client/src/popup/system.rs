//! Popup host backed by the system browser
//!
//! The system browser gives no handle back, so a window counts as open until
//! it is closed through us or its target name is reused by a newer popup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use oauthlink_core::PopupFeatures;
use tracing::{debug, warn};
use url::Url;

use super::{PopupError, PopupHost, PopupWindow};

#[derive(Debug, Default)]
struct BrowserWindow {
    closed: AtomicBool,
}

impl PopupWindow for BrowserWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        // The tab itself belongs to the browser; we can only stop tracking it
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Opens authorization URLs with the system browser.
///
/// A user closing the browser tab is not observable, so attempts hosted
/// here only end through a delivery channel, `cancel`, teardown or the
/// attempt timeout. Hosts that need popup-closed cancellation must supply
/// their own [`PopupHost`] whose windows report [`PopupWindow::is_closed`].
#[derive(Default)]
pub struct SystemBrowserHost {
    named: DashMap<String, Weak<BrowserWindow>>,
}

impl SystemBrowserHost {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PopupHost for SystemBrowserHost {
    fn open(
        &self,
        url: &Url,
        features: &PopupFeatures,
    ) -> Result<Arc<dyn PopupWindow>, PopupError> {
        open::that(url.as_str()).map_err(|e| {
            warn!(error = %e, "[Popup] Failed to open browser");
            PopupError::Launch(e.to_string())
        })?;

        let window = Arc::new(BrowserWindow::default());

        if let Some(name) = &features.target_name {
            let previous = self.named.insert(name.clone(), Arc::downgrade(&window));
            if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
                debug!(target_name = %name, "[Popup] Reusing named window");
                previous.close();
            }
        }

        Ok(window)
    }
}
