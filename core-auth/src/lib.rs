//! # Account Authentication Core
//!
//! OAuth 2.0 Authorization Code + PKCE sign-in and token lifecycle for
//! desktop hosts. The crate owns the whole account lifecycle:
//!
//! - **Interactive sign-in** through the system browser with a loopback
//!   redirect ([`CallbackListener`]) and per-flow PKCE/state material
//!   ([`PkcePair`], [`FlowState`]).
//! - **Provider profiles** for Google, Microsoft and Spotify, plus a
//!   host-supplied [`OAuthConfig`] per registration.
//! - **Token exchange, refresh and revocation** over HTTPS
//!   ([`TokenClient`]).
//! - **Multi-account persistence** mirrored to the host's secret store
//!   ([`AccountRegistry`]).
//! - **Proactive refresh** shortly before expiry ([`RefreshScheduler`]).
//!
//! [`AuthManager`] ties these together behind one instance-scoped facade;
//! hosts observe the lifecycle through the `core-runtime` event bus.
//!
//! Token material never appears in logs or events; `Debug` on token
//! carrying types is redacted.

pub mod error;
pub mod listener;
pub mod manager;
pub mod oauth;
pub mod pkce;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod types;

#[cfg(test)]
mod testutil;

pub use error::{AuthError, Result};
pub use listener::CallbackListener;
pub use manager::AuthManager;
pub use oauth::TokenClient;
pub use pkce::{FlowState, PkcePair};
pub use provider::{CredentialStyle, OAuthConfig, ProviderProfile};
pub use registry::AccountRegistry;
pub use scheduler::{RefreshScheduler, REFRESH_LEAD_SECONDS};
pub use types::{Account, AccountId, ProviderKind, TokenSet, UserInfo};
