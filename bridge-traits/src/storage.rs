//! Secure Storage Abstraction
//!
//! The account-link core persists account records (including OAuth tokens)
//! through this trait and nothing else. Which mechanism backs it is a host
//! decision:
//! - macOS: Keychain
//! - Windows: Credential Manager (DPAPI)
//! - Linux: Secret Service / libsecret
//!
//! # Security Requirements
//!
//! Implementations MUST:
//! - Encrypt data at rest (platform store or equivalent)
//! - Securely erase previous values on overwrite and delete
//! - Never log or expose stored values

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::Result;

/// Persistent secure storage for small secret payloads.
///
/// Keys are opaque namespaced strings chosen by the caller (the core uses
/// `account:<id>`). Values are raw bytes; serialization is the caller's
/// concern.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Store a secret, overwriting any previous value for `key`.
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()>;

    /// Retrieve a secret. Returns `Ok(None)` if the key doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a secret. Deleting a missing key is not an error.
    async fn delete_secret(&self, key: &str) -> Result<()>;

    /// Check for a secret without retrieving it.
    async fn has_secret(&self, key: &str) -> Result<bool> {
        Ok(self.get_secret(key).await?.is_some())
    }

    /// List all stored keys (without values).
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Delete every stored secret. Use with caution.
    async fn clear_all(&self) -> Result<()>;
}

/// In-process `SecretStore` backed by a `HashMap`.
///
/// Offers no at-rest protection and forgets everything on exit; intended
/// for tests and as an explicit opt-in fallback when no platform store is
/// available.
#[derive(Clone, Default)]
pub struct MemorySecretStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn set_secret(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get_secret(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(key).cloned())
    }

    async fn delete_secret(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn has_secret(&self, key: &str) -> Result<bool> {
        let entries = self.entries.lock().await;
        Ok(entries.contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<String>> {
        let entries = self.entries.lock().await;
        Ok(entries.keys().cloned().collect())
    }

    async fn clear_all(&self) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.clear();
        Ok(())
    }
}
