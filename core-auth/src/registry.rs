//! In-memory account registry mirrored to the host `SecretStore`.
//!
//! The registry is the single source of truth at runtime; every mutation is
//! written through to the store as a JSON record under `account:<id>` so a
//! cold start can rehydrate with [`AccountRegistry::load`].
//!
//! Invariant: exactly one account is the default while any account exists.
//! The first inserted account becomes the default; removing the default
//! promotes another linked account.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::SecretStore;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{AuthError, Result};
use crate::types::{Account, AccountId, TokenSet};

const ACCOUNT_KEY_PREFIX: &str = "account:";

fn account_key(id: &AccountId) -> String {
    format!("{}{}", ACCOUNT_KEY_PREFIX, id)
}

pub struct AccountRegistry {
    store: Arc<dyn SecretStore>,
    accounts: RwLock<HashMap<AccountId, Account>>,
}

impl AccountRegistry {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            accounts: RwLock::new(HashMap::new()),
        }
    }

    /// Rehydrate the in-memory map from the store. Corrupt records are
    /// skipped with a warning rather than failing the whole cold start.
    pub async fn load(&self) -> Result<Vec<Account>> {
        let keys = self.store.list_keys().await?;
        let mut map = self.accounts.write().await;
        map.clear();

        for key in keys.iter().filter(|k| k.starts_with(ACCOUNT_KEY_PREFIX)) {
            let Some(bytes) = self.store.get_secret(key).await? else {
                continue;
            };
            match serde_json::from_slice::<Account>(&bytes) {
                Ok(account) => {
                    map.insert(account.id.clone(), account);
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "skipping unreadable account record");
                }
            }
        }

        // Repair the default invariant if the stored records lost it.
        if !map.is_empty() && !map.values().any(|a| a.is_default) {
            if let Some(id) = map.keys().next().cloned() {
                if let Some(account) = map.get_mut(&id) {
                    account.is_default = true;
                    let snapshot = account.clone();
                    self.persist(&snapshot).await?;
                }
            }
        }

        debug!(count = map.len(), "account registry loaded");
        Ok(map.values().cloned().collect())
    }

    /// Insert or update an account, returning the stored record.
    ///
    /// A brand-new first account becomes the default. Reconnecting an
    /// existing identity keeps its default status and creation time.
    pub async fn upsert(&self, mut account: Account) -> Result<Account> {
        let mut map = self.accounts.write().await;

        if let Some(existing) = map.get(&account.id) {
            account.is_default = existing.is_default;
            account.created_at = existing.created_at;
        } else {
            account.is_default = map.is_empty();
        }

        self.persist(&account).await?;
        map.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    /// Replace an account's tokens in place, stamping `last_sync_at`.
    pub async fn update_tokens(&self, id: &AccountId, tokens: TokenSet) -> Result<Account> {
        let mut map = self.accounts.write().await;
        let account = map
            .get_mut(id)
            .ok_or_else(|| AuthError::NoTokensFound(id.to_string()))?;

        account.tokens = tokens;
        account.last_sync_at = Some(Utc::now());
        let snapshot = account.clone();
        self.persist(&snapshot).await?;
        Ok(snapshot)
    }

    /// Remove an account, promoting another to default when the removed
    /// one held it. Removing an unknown id returns `Ok(None)`.
    pub async fn remove(&self, id: &AccountId) -> Result<Option<Account>> {
        let mut map = self.accounts.write().await;
        let Some(removed) = map.remove(id) else {
            return Ok(None);
        };

        self.store.delete_secret(&account_key(id)).await?;

        if removed.is_default {
            if let Some(next) = map.keys().next().cloned() {
                if let Some(account) = map.get_mut(&next) {
                    account.is_default = true;
                    let snapshot = account.clone();
                    self.persist(&snapshot).await?;
                    debug!(account_id = %snapshot.id, "promoted new default account");
                }
            }
        }

        Ok(Some(removed))
    }

    pub async fn get(&self, id: &AccountId) -> Option<Account> {
        self.accounts.read().await.get(id).cloned()
    }

    pub async fn all(&self) -> Vec<Account> {
        self.accounts.read().await.values().cloned().collect()
    }

    pub async fn get_default(&self) -> Option<Account> {
        self.accounts
            .read()
            .await
            .values()
            .find(|a| a.is_default)
            .cloned()
    }

    /// Make `id` the default, clearing the flag on every other account.
    pub async fn set_default(&self, id: &AccountId) -> Result<()> {
        let mut map = self.accounts.write().await;
        if !map.contains_key(id) {
            return Err(AuthError::NoTokensFound(id.to_string()));
        }

        let mut changed = Vec::new();
        for (key, account) in map.iter_mut() {
            let want = key == id;
            if account.is_default != want {
                account.is_default = want;
                changed.push(account.clone());
            }
        }
        for account in &changed {
            self.persist(account).await?;
        }
        Ok(())
    }

    async fn persist(&self, account: &Account) -> Result<()> {
        let bytes = serde_json::to_vec(account)?;
        self.store
            .set_secret(&account_key(&account.id), &bytes)
            .await?;
        Ok(())
    }
}
