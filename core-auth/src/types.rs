use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a linked account.
///
/// The identifier is the deterministic composite `<provider>:<subject>`,
/// where `subject` is the provider-side user id from the userinfo endpoint.
/// Reconnecting the same identity therefore maps to the same `AccountId`
/// and upserts the existing record instead of duplicating it.
///
/// # Examples
///
/// ```
/// use core_auth::{AccountId, ProviderKind};
///
/// let id = AccountId::new(ProviderKind::Google, "108177...");
/// assert!(id.as_str().starts_with("google:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Build the composite id from a provider and the provider-side user id.
    pub fn new(provider: ProviderKind, subject: &str) -> Self {
        Self(format!("{}:{}", provider.as_str(), subject))
    }

    /// Wrap an already-composite id string (e.g. read back from storage).
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supported identity providers.
///
/// Each provider has its own OAuth 2.0 endpoints and dialect, captured in a
/// [`ProviderProfile`](crate::provider::ProviderProfile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    /// Google (calendar, mail)
    Google,
    /// Microsoft (calendar, mail via Graph)
    Microsoft,
    /// Spotify (music playback)
    Spotify,
}

impl ProviderKind {
    /// Get the human-readable display name for this provider
    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "Google",
            ProviderKind::Microsoft => "Microsoft",
            ProviderKind::Spotify => "Spotify",
        }
    }

    /// Get the provider identifier string
    ///
    /// Used in account ids, logging and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Microsoft => "microsoft",
            ProviderKind::Spotify => "spotify",
        }
    }

    /// Parse a provider kind from a string identifier
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "google" => Some(ProviderKind::Google),
            "microsoft" => Some(ProviderKind::Microsoft),
            "spotify" => Some(ProviderKind::Spotify),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// OAuth 2.0 token set.
///
/// # Security
///
/// Tokens are stored only through the `SecretStore` and never logged. The
/// `Debug` implementation redacts token material.
#[derive(Clone, Serialize, Deserialize)]
pub struct TokenSet {
    /// The access token used for API requests
    pub access_token: String,
    /// The refresh token, if the provider granted one
    pub refresh_token: Option<String>,
    /// When the access token expires (UTC), computed at receipt
    pub expires_at: DateTime<Utc>,
    /// Space-separated scopes actually granted, if reported
    pub scope: Option<String>,
    /// Token type, usually "Bearer"
    pub token_type: String,
}

impl TokenSet {
    /// Create a token set from a token-endpoint response.
    ///
    /// `expires_at` is computed as `now + expires_in` at receipt.
    pub fn new(
        access_token: String,
        refresh_token: Option<String>,
        expires_in: i64,
        scope: Option<String>,
        token_type: Option<String>,
    ) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scope,
            token_type: token_type.unwrap_or_else(|| "Bearer".to_string()),
        }
    }

    /// Check whether the access token is still usable at `now`, requiring
    /// at least `lead_seconds` of remaining lifetime.
    pub fn is_valid_at(&self, now: DateTime<Utc>, lead_seconds: i64) -> bool {
        now < self.expires_at - Duration::seconds(lead_seconds)
    }

    /// Check validity against the current clock.
    pub fn is_valid(&self, lead_seconds: i64) -> bool {
        self.is_valid_at(Utc::now(), lead_seconds)
    }
}

// Custom Debug implementation to avoid logging tokens
impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Identity attributes returned by a provider's userinfo endpoint,
/// normalized across provider dialects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// The provider-side stable user id (`sub` / `id`)
    pub id: String,
    /// Primary email, if the provider reports one
    pub email: Option<String>,
    /// Display name, if the provider reports one
    pub display_name: Option<String>,
}

/// A linked account: identity attributes plus its current token set.
///
/// Exactly one account is the default while any account exists. The first
/// connected account becomes the default; removing the default promotes
/// another linked account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Deterministic composite id (`<provider>:<subject>`)
    pub id: AccountId,
    /// The provider this account belongs to
    pub provider: ProviderKind,
    /// Primary email, if known
    pub email: Option<String>,
    /// Display name, if known
    pub display_name: Option<String>,
    /// Current token set
    pub tokens: TokenSet,
    /// Whether this is the default account
    pub is_default: bool,
    /// When the account was first linked
    pub created_at: DateTime<Utc>,
    /// When tokens were last refreshed, if ever
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Account {
    /// Assemble a freshly linked account from userinfo and tokens.
    ///
    /// The registry decides default status on insert; new accounts start
    /// non-default.
    pub fn new(provider: ProviderKind, user: UserInfo, tokens: TokenSet) -> Self {
        Self {
            id: AccountId::new(provider, &user.id),
            provider,
            email: user.email,
            display_name: user.display_name,
            tokens,
            is_default: false,
            created_at: Utc::now(),
            last_sync_at: None,
        }
    }
}
