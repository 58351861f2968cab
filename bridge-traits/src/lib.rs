//! # Host Bridge Traits
//!
//! Platform contracts between the account-link core and the host application.
//!
//! ## Overview
//!
//! The core never talks to the OS keychain or the system browser directly.
//! Instead, the host injects implementations of the traits in this crate:
//!
//! - [`SecretStore`](storage::SecretStore) - persistent secure storage for
//!   account records (Keychain/Credential Manager/Secret Service on real
//!   hosts; [`MemorySecretStore`](storage::MemorySecretStore) in tests and
//!   as a volatile fallback)
//! - [`BrowserLauncher`](browser::BrowserLauncher) - opens the consent URL
//!   in the user's default browser ([`SystemBrowser`](browser::SystemBrowser)
//!   on desktop hosts)
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Host
//! implementations convert platform-specific failures into it and keep the
//! messages actionable; they must never include secret material.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod browser;
pub mod error;
pub mod storage;

pub use browser::{BrowserLauncher, SystemBrowser};
pub use error::{BridgeError, Result};
pub use storage::{MemorySecretStore, SecretStore};
