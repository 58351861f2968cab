//! System Browser Abstraction
//!
//! Consent must happen in the user's own browser session, never an embedded
//! web view, so the core only ever asks the host to open a URL.

use tracing::debug;

use crate::error::{BridgeError, Result};

/// Opens a URL in the user's default browser.
///
/// The launcher must return as soon as the hand-off to the browser has
/// happened; it must not wait for navigation or user interaction.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

/// Default desktop launcher using the platform opener
/// (`xdg-open` / `open` / `start`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        debug!("opening system browser");
        open::that(url).map_err(|e| {
            BridgeError::OperationFailed(format!("failed to open system browser: {e}"))
        })
    }
}
