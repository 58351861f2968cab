use thiserror::Error;

/// Errors produced by the authentication core.
///
/// Flow errors reject the interactive sign-in; refresh errors degrade token
/// access to `Ok(None)` so callers can prompt for re-authentication.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("An interactive sign-in flow is already in progress")]
    FlowAlreadyInProgress,

    #[error("Timed out waiting for the user to complete authorization")]
    AuthTimeout,

    #[error("Sign-in was cancelled by the user")]
    UserCancelled,

    #[error("Provider denied authorization: {error} ({desc})", desc = .description.as_deref().unwrap_or("no description"))]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },

    #[error("OAuth state parameter mismatch - possible CSRF attempt")]
    StateMismatch,

    #[error("Token endpoint returned {status}: {body}")]
    TokenExchangeFailed { status: u16, body: String },

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("No tokens found for account: {0}")]
    NoTokensFound(String),

    #[error("Provider not registered: {0}")]
    UnknownProvider(String),

    #[error("Failed to open system browser: {0}")]
    Browser(String),

    #[error("Storage error: {0}")]
    Storage(#[from] bridge_traits::error::BridgeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
