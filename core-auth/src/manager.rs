//! # Authentication Manager
//!
//! Orchestrator for the full account-link lifecycle: interactive sign-in
//! over the system browser, token access with on-demand refresh, proactive
//! scheduled refresh, and multi-account bookkeeping.
//!
//! ## Overview
//!
//! One `AuthManager` instance is created per application with its external
//! collaborators injected (`SecretStore`, `EventBus`, `BrowserLauncher`),
//! then one provider registration added per service the host wants to
//! offer. There are no global singletons; everything hangs off the
//! instance.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bridge_traits::{MemorySecretStore, SystemBrowser};
//! use core_auth::{AuthManager, OAuthConfig, ProviderKind, ProviderProfile};
//! use core_runtime::events::EventBus;
//!
//! # async fn example() -> core_auth::Result<()> {
//! let manager = AuthManager::new(
//!     Arc::new(MemorySecretStore::new()),
//!     EventBus::new(100),
//!     Arc::new(SystemBrowser),
//! );
//!
//! manager
//!     .register(
//!         ProviderProfile::builtin(ProviderKind::Google),
//!         OAuthConfig {
//!             client_id: "client-id".to_string(),
//!             client_secret: None,
//!             redirect_port: 8877,
//!             scopes: vec![],
//!         },
//!     )
//!     .await?;
//!
//! let accounts = manager.restore_sessions().await?;
//! if accounts.is_empty() {
//!     let account = manager.connect(ProviderKind::Google).await?;
//!     println!("linked {}", account.id);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{BrowserLauncher, SecretStore};
use core_runtime::events::{AuthEvent, EventBus};
use core_runtime::logging::redact_field;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::listener::CallbackListener;
use crate::oauth::TokenClient;
use crate::pkce::{FlowState, PkcePair};
use crate::provider::{self, OAuthConfig, ProviderProfile};
use crate::registry::AccountRegistry;
use crate::scheduler::{RefreshScheduler, REFRESH_LEAD_SECONDS};
use crate::types::{Account, AccountId, ProviderKind};

/// How long a pending flow waits for the user before giving up (5 minutes).
const FLOW_TIMEOUT: Duration = Duration::from_secs(300);

struct Inner {
    registry: AccountRegistry,
    event_bus: EventBus,
    browser: Arc<dyn BrowserLauncher>,
    registrations: RwLock<HashMap<ProviderKind, TokenClient>>,
    scheduler: RefreshScheduler,
    /// Cancel handle of the single in-flight interactive flow, if any.
    active_flow: Mutex<Option<oneshot::Sender<()>>>,
    /// Per-account guards serializing refresh attempts.
    refresh_locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

/// Orchestrates interactive sign-in and the token lifecycle for every
/// linked account.
pub struct AuthManager {
    inner: Arc<Inner>,
}

impl AuthManager {
    /// Create a manager with its external collaborators injected.
    pub fn new(
        store: Arc<dyn SecretStore>,
        event_bus: EventBus,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: AccountRegistry::new(store),
                event_bus,
                browser,
                registrations: RwLock::new(HashMap::new()),
                scheduler: RefreshScheduler::new(),
                active_flow: Mutex::new(None),
                refresh_locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Register a provider. Registrations are immutable; registering the
    /// same provider again replaces its configuration.
    pub async fn register(&self, profile: ProviderProfile, config: OAuthConfig) -> Result<()> {
        let kind = profile.kind;
        let client = TokenClient::new(profile, config)?;
        self.inner.registrations.write().await.insert(kind, client);
        debug!(provider = kind.as_str(), "provider registered");
        Ok(())
    }

    /// Run the interactive sign-in flow for a provider.
    ///
    /// Only one flow may be active application-wide; a second call while
    /// one is pending is rejected with `FlowAlreadyInProgress`, not
    /// queued. On success the account is persisted, its refresh timer is
    /// armed, and `Authenticated` is emitted. On any flow error no partial
    /// account is left behind.
    #[instrument(skip(self), fields(provider = %provider))]
    pub async fn connect(&self, provider: ProviderKind) -> Result<Account> {
        let client = self.registration(provider).await?;

        let cancel_rx = {
            let mut active = self.inner.active_flow.lock().await;
            if active.is_some() {
                warn!("rejecting connect: a sign-in flow is already in progress");
                return Err(AuthError::FlowAlreadyInProgress);
            }
            let (tx, rx) = oneshot::channel();
            *active = Some(tx);
            rx
        };

        let result = run_flow(&self.inner, client, cancel_rx).await;
        self.inner.active_flow.lock().await.take();

        match &result {
            Ok(account) => {
                info!(account_id = %account.id, "sign-in completed");
                self.inner
                    .event_bus
                    .emit(AuthEvent::Authenticated {
                        account_id: account.id.to_string(),
                        provider: account.provider.as_str().to_string(),
                    })
                    .ok();
            }
            Err(err) => warn!(error = %err, "sign-in flow failed"),
        }
        result
    }

    /// Cancel the pending interactive flow, if any.
    ///
    /// Called by the host when it observes the user abandoning the flow
    /// (e.g. the browser window closed). Returns whether a flow was
    /// actually cancelled; the pending `connect` rejects `UserCancelled`.
    pub async fn cancel_flow(&self) -> bool {
        match self.inner.active_flow.lock().await.take() {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    /// Get a usable access token for an account.
    ///
    /// Returns the cached token while it has at least the refresh lead
    /// time of life left; otherwise refreshes first. Returns `Ok(None)`
    /// (and emits `TokenExpired`) when refresh fails and the account needs
    /// interactive re-authentication. Unknown accounts are an error.
    ///
    /// Concurrent callers for the same borderline-expired account share a
    /// single refresh.
    #[instrument(skip(self), fields(account_id = %id))]
    pub async fn access_token(&self, id: &AccountId) -> Result<Option<String>> {
        let account = self
            .inner
            .registry
            .get(id)
            .await
            .ok_or_else(|| AuthError::NoTokensFound(id.to_string()))?;

        if account.tokens.is_valid(REFRESH_LEAD_SECONDS) {
            return Ok(Some(account.tokens.access_token));
        }

        refresh_account(Arc::clone(&self.inner), id.clone()).await
    }

    /// Unlink an account: best-effort upstream revocation, cancel its
    /// refresh timer, delete it from the registry and store, and emit
    /// `AccountRemoved`. Removing the default promotes another account.
    #[instrument(skip(self), fields(account_id = %id))]
    pub async fn remove_account(&self, id: &AccountId) -> Result<()> {
        let account = self
            .inner
            .registry
            .get(id)
            .await
            .ok_or_else(|| AuthError::NoTokensFound(id.to_string()))?;

        // Revocation is best effort; failure must not block the unlink.
        if let Ok(client) = self.registration(account.provider).await {
            if let Err(err) = client.revoke(&account.tokens).await {
                warn!(error = %err, "upstream token revocation failed");
            }
        }

        self.inner.scheduler.cancel(id).await;
        self.inner.registry.remove(id).await?;
        self.inner.refresh_locks.lock().await.remove(id);

        info!("account removed");
        self.inner
            .event_bus
            .emit(AuthEvent::AccountRemoved {
                account_id: id.to_string(),
            })
            .ok();
        Ok(())
    }

    /// Cold-start rehydration: load persisted accounts and re-arm their
    /// refresh timers. No browser interaction; accounts whose tokens have
    /// already expired will attempt a refresh immediately.
    #[instrument(skip(self))]
    pub async fn restore_sessions(&self) -> Result<Vec<Account>> {
        let accounts = self.inner.registry.load().await?;
        for account in &accounts {
            arm_refresh(&self.inner, account.id.clone(), account.tokens.expires_at).await;
        }
        info!(count = accounts.len(), "sessions restored");
        Ok(accounts)
    }

    /// All linked accounts.
    pub async fn accounts(&self) -> Vec<Account> {
        self.inner.registry.all().await
    }

    /// The default account, if any account is linked.
    pub async fn default_account(&self) -> Option<Account> {
        self.inner.registry.get_default().await
    }

    /// Make `id` the default account.
    pub async fn set_default_account(&self, id: &AccountId) -> Result<()> {
        self.inner.registry.set_default(id).await
    }

    /// Shut down background refresh timers.
    pub async fn shutdown(&self) {
        self.inner.scheduler.cancel_all().await;
    }

    async fn registration(&self, provider: ProviderKind) -> Result<TokenClient> {
        self.inner
            .registrations
            .read()
            .await
            .get(&provider)
            .cloned()
            .ok_or_else(|| AuthError::UnknownProvider(provider.as_str().to_string()))
    }
}

/// One interactive flow: PKCE, bind, browser, callback, exchange,
/// userinfo, persist, arm.
async fn run_flow(
    inner: &Arc<Inner>,
    client: TokenClient,
    cancel_rx: oneshot::Receiver<()>,
) -> Result<Account> {
    let provider = client.profile().kind;
    let pkce = PkcePair::generate();
    let state = FlowState::generate();

    // Bind before building the URL: the redirect URI carries the actual
    // port, so a fallback to an ephemeral port is transparent.
    let preferred = client.config().preferred_port(client.profile());
    let listener = CallbackListener::bind(preferred).await?;
    let port = listener.port();
    let authorize_url =
        provider::build_authorize_url(client.profile(), client.config(), &pkce, &state, port)?;
    let redirect = provider::redirect_uri(client.profile(), port);
    let callback_path = client.profile().callback_path.clone();

    inner
        .browser
        .open(&authorize_url)
        .map_err(|e| AuthError::Browser(e.to_string()))?;
    info!(port, "browser opened, waiting for authorization callback");

    let code = tokio::select! {
        result = listener.wait_for_code(&callback_path, state.nonce(), FLOW_TIMEOUT) => result?,
        _ = cancel_rx => {
            info!("sign-in flow cancelled");
            return Err(AuthError::UserCancelled);
        }
    };

    let tokens = client.exchange(&code, &pkce, &redirect).await?;
    let user = client.fetch_userinfo(&tokens.access_token).await?;
    debug!(
        email = %redact_field("email", user.email.as_deref().unwrap_or("")),
        "provider identity resolved"
    );

    let account = inner
        .registry
        .upsert(Account::new(provider, user, tokens))
        .await?;
    arm_refresh(inner, account.id.clone(), account.tokens.expires_at).await;
    Ok(account)
}

/// Arm the proactive refresh timer for an account. The timer task holds
/// only a weak handle so shutdown isn't kept alive by pending timers.
fn arm_refresh<'a>(
    inner: &'a Arc<Inner>,
    id: AccountId,
    expires_at: chrono::DateTime<chrono::Utc>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
    Box::pin(async move {
        let weak = Arc::downgrade(inner);
        let task_id = id.clone();
        inner
            .scheduler
            .arm(id, expires_at, move || async move {
                if let Some(inner) = weak.upgrade() {
                    let _ = refresh_account(inner, task_id).await;
                }
            })
            .await;
    })
}

/// Refresh an account's tokens, serialized per account.
///
/// After acquiring the guard the token validity is re-checked: a caller
/// that queued behind a completed refresh uses its result instead of
/// refreshing again.
async fn refresh_account(inner: Arc<Inner>, id: AccountId) -> Result<Option<String>> {
    let guard = {
        let mut locks = inner.refresh_locks.lock().await;
        Arc::clone(
            locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    };
    let _held = guard.lock().await;

    let account = inner
        .registry
        .get(&id)
        .await
        .ok_or_else(|| AuthError::NoTokensFound(id.to_string()))?;

    if account.tokens.is_valid(REFRESH_LEAD_SECONDS) {
        debug!("token already refreshed by a concurrent caller");
        return Ok(Some(account.tokens.access_token));
    }

    let client = {
        let registrations = inner.registrations.read().await;
        registrations
            .get(&account.provider)
            .cloned()
            .ok_or_else(|| AuthError::UnknownProvider(account.provider.as_str().to_string()))?
    };

    match client.refresh(&account.tokens).await {
        Ok(tokens) => {
            let expires_at = tokens.expires_at;
            let updated = inner.registry.update_tokens(&id, tokens).await?;
            inner
                .event_bus
                .emit(AuthEvent::TokenRefreshed {
                    account_id: id.to_string(),
                    expires_at: expires_at.timestamp(),
                })
                .ok();
            arm_refresh(&inner, id, expires_at).await;
            Ok(Some(updated.tokens.access_token))
        }
        Err(err) => {
            warn!(error = %err, "token refresh failed, re-authentication required");
            inner.scheduler.cancel(&id).await;
            inner
                .event_bus
                .emit(AuthEvent::TokenExpired {
                    account_id: id.to_string(),
                })
                .ok();
            Ok(None)
        }
    }
}
