//! Proactive refresh timers, one cancellable task per account.
//!
//! Each armed timer sleeps until shortly before the account's token
//! expiry, then runs the supplied refresh future once. Re-arming an
//! account replaces its pending timer; `cancel_all` is for shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::AccountId;

/// How long before expiry a refresh fires (5 minutes).
pub const REFRESH_LEAD_SECONDS: i64 = 300;

pub struct RefreshScheduler {
    timers: Arc<Mutex<HashMap<AccountId, JoinHandle<()>>>>,
}

impl RefreshScheduler {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Arm (or re-arm) the timer for an account. Any pending timer for the
    /// same account is aborted first. `refresh` runs once when the timer
    /// fires; tokens already inside the lead window fire immediately.
    pub async fn arm<F, Fut>(&self, id: AccountId, expires_at: DateTime<Utc>, refresh: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let delay = delay_until_refresh(expires_at, Utc::now());
        debug!(account_id = %id, delay_secs = delay.as_secs(), "arming refresh timer");

        // Insert while holding the lock so a zero-delay timer cannot
        // observe the map before its own handle is in it.
        let mut timers = self.timers.lock().await;
        let shared = Arc::clone(&self.timers);
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Drop our own entry before refreshing so a re-arm from inside
            // the refresh doesn't abort the task that is running it.
            shared.lock().await.remove(&task_id);
            refresh().await;
        });

        if let Some(old) = timers.insert(id, handle) {
            old.abort();
        }
    }

    /// Cancel the pending timer for an account, if any.
    pub async fn cancel(&self, id: &AccountId) -> bool {
        match self.timers.lock().await.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer (shutdown).
    pub async fn cancel_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl Default for RefreshScheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// `max(0, expires_at - now - lead)`.
fn delay_until_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    let fire_at = expires_at - chrono::Duration::seconds(REFRESH_LEAD_SECONDS);
    (fire_at - now).to_std().unwrap_or(Duration::ZERO)
}
