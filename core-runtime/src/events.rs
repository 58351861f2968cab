//! Account lifecycle event broadcasting.
//!
//! The core publishes [`AuthEvent`]s on an [`EventBus`] backed by
//! `tokio::sync::broadcast`; hosts subscribe instead of polling account
//! state. Receivers that fall behind the channel capacity observe
//! `RecvError::Lagged(n)` once and then continue with current events;
//! `RecvError::Closed` means every bus handle has been dropped.
//!
//! ```rust
//! use core_runtime::events::{AuthEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::default();
//! let mut events = bus.subscribe();
//!
//! bus.emit(AuthEvent::TokenExpired {
//!     account_id: "google:123".to_string(),
//! })
//! .ok();
//!
//! assert!(matches!(
//!     events.recv().await,
//!     Ok(AuthEvent::TokenExpired { .. })
//! ));
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Events a subscriber can buffer before it starts lagging.
pub const DEFAULT_EVENT_CAPACITY: usize = 100;

/// What happened to a linked account.
///
/// Payloads carry identifiers and timestamps only, never token material,
/// so events are safe to forward to UI layers or logs as-is.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AuthEvent {
    /// An interactive sign-in completed and the account was persisted.
    Authenticated {
        account_id: String,
        /// Provider identifier, e.g. "google"
        provider: String,
    },
    /// A token refresh succeeded; the account stays usable.
    TokenRefreshed {
        account_id: String,
        /// New expiry as Unix epoch seconds
        expires_at: i64,
    },
    /// Refresh failed terminally; the account needs interactive
    /// re-authentication.
    TokenExpired { account_id: String },
    /// The account was unlinked and its stored record deleted.
    AccountRemoved { account_id: String },
}

impl AuthEvent {
    /// The account this event concerns.
    pub fn account_id(&self) -> &str {
        match self {
            AuthEvent::Authenticated { account_id, .. }
            | AuthEvent::TokenRefreshed { account_id, .. }
            | AuthEvent::TokenExpired { account_id }
            | AuthEvent::AccountRemoved { account_id } => account_id,
        }
    }

    /// Short human-readable label, for host status lines.
    pub fn description(&self) -> &'static str {
        match self {
            AuthEvent::Authenticated { .. } => "account linked",
            AuthEvent::TokenRefreshed { .. } => "token refreshed",
            AuthEvent::TokenExpired { .. } => "re-authentication required",
            AuthEvent::AccountRemoved { .. } => "account removed",
        }
    }
}

/// Cloneable broadcast handle. Every clone publishes to the same channel;
/// every `subscribe()` gets an independent receiver that sees events
/// emitted after it subscribed.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it.
    ///
    /// An empty bus yields `Err`; that is not a failure for the core and
    /// call sites normally `.ok()` it.
    pub fn emit(&self, event: AuthEvent) -> Result<usize, SendError<AuthEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
