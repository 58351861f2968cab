//! Provider profiles and authorize-URL construction.
//!
//! A [`ProviderProfile`] captures everything provider-specific about an
//! OAuth 2.0 dialect: endpoints, default scopes, the preferred loopback
//! port, extra authorize parameters, and how the token endpoint expects
//! client credentials. Adding a provider means adding one profile value.

use url::Url;

use crate::error::Result;
use crate::pkce::{FlowState, PkcePair};
use crate::types::ProviderKind;

/// How client credentials are sent to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialStyle {
    /// `client_id` (and `client_secret` when present) in the form body
    Body,
    /// HTTP Basic authentication header, body carries `client_id` only
    BasicHeader,
}

/// Static description of one provider's OAuth 2.0 dialect.
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    pub kind: ProviderKind,
    /// Authorization endpoint (user consent page)
    pub authorize_endpoint: String,
    /// Token endpoint (code exchange and refresh)
    pub token_endpoint: String,
    /// Userinfo endpoint used to derive the stable account id
    pub userinfo_endpoint: String,
    /// Token revocation endpoint, if the provider has one
    pub revoke_endpoint: Option<String>,
    /// Scopes requested when the registration doesn't override them
    pub default_scopes: Vec<String>,
    /// Preferred loopback port; an ephemeral port is used when it's taken
    pub preferred_port: u16,
    /// Path the provider redirects back to on the loopback listener
    pub callback_path: String,
    /// Provider-specific extra authorize query parameters
    pub extra_authorize_params: Vec<(String, String)>,
    /// How the token endpoint expects client credentials
    pub credential_style: CredentialStyle,
}

impl ProviderProfile {
    /// Built-in profile for a supported provider.
    pub fn builtin(kind: ProviderKind) -> Self {
        match kind {
            ProviderKind::Google => Self {
                kind,
                authorize_endpoint: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
                token_endpoint: "https://oauth2.googleapis.com/token".to_string(),
                userinfo_endpoint: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
                revoke_endpoint: Some("https://oauth2.googleapis.com/revoke".to_string()),
                default_scopes: vec![
                    "openid".to_string(),
                    "email".to_string(),
                    "profile".to_string(),
                    "https://www.googleapis.com/auth/calendar.readonly".to_string(),
                ],
                preferred_port: 8877,
                callback_path: "/callback".to_string(),
                // Google only issues a refresh token for offline access with
                // forced consent.
                extra_authorize_params: vec![
                    ("access_type".to_string(), "offline".to_string()),
                    ("prompt".to_string(), "consent".to_string()),
                ],
                credential_style: CredentialStyle::Body,
            },
            ProviderKind::Microsoft => Self {
                kind,
                authorize_endpoint:
                    "https://login.microsoftonline.com/common/oauth2/v2.0/authorize".to_string(),
                token_endpoint: "https://login.microsoftonline.com/common/oauth2/v2.0/token"
                    .to_string(),
                userinfo_endpoint: "https://graph.microsoft.com/v1.0/me".to_string(),
                revoke_endpoint: None,
                default_scopes: vec![
                    "User.Read".to_string(),
                    "Calendars.Read".to_string(),
                    "Mail.Read".to_string(),
                    "offline_access".to_string(),
                ],
                preferred_port: 8878,
                callback_path: "/callback".to_string(),
                extra_authorize_params: vec![(
                    "response_mode".to_string(),
                    "query".to_string(),
                )],
                credential_style: CredentialStyle::Body,
            },
            ProviderKind::Spotify => Self {
                kind,
                authorize_endpoint: "https://accounts.spotify.com/authorize".to_string(),
                token_endpoint: "https://accounts.spotify.com/api/token".to_string(),
                userinfo_endpoint: "https://api.spotify.com/v1/me".to_string(),
                revoke_endpoint: None,
                default_scopes: vec![
                    "user-read-email".to_string(),
                    "user-read-playback-state".to_string(),
                    "playlist-read-private".to_string(),
                ],
                preferred_port: 8879,
                callback_path: "/callback".to_string(),
                extra_authorize_params: vec![],
                credential_style: CredentialStyle::BasicHeader,
            },
        }
    }
}

/// Per-registration OAuth client configuration. Immutable after
/// registration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret (omitted for public clients)
    pub client_secret: Option<String>,
    /// Loopback port override; 0 defers to the profile's preferred port
    pub redirect_port: u16,
    /// Scope override; empty falls back to the profile's default scopes
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// The scopes actually requested: the registration's, or the profile's
    /// defaults when none were given.
    pub fn effective_scopes(&self, profile: &ProviderProfile) -> Vec<String> {
        if self.scopes.is_empty() {
            profile.default_scopes.clone()
        } else {
            self.scopes.clone()
        }
    }

    /// The loopback port to try first: the registration's override when
    /// set, the profile's preferred port otherwise.
    pub fn preferred_port(&self, profile: &ProviderProfile) -> u16 {
        if self.redirect_port != 0 {
            self.redirect_port
        } else {
            profile.preferred_port
        }
    }
}

/// The loopback redirect URI for a bound port.
pub fn redirect_uri(profile: &ProviderProfile, port: u16) -> String {
    format!("http://127.0.0.1:{}{}", port, profile.callback_path)
}

/// Build the full authorization URL for a flow.
///
/// Called after the callback listener is bound: the redirect URI embeds the
/// actual port, so a fallback to an ephemeral port is transparent to the
/// provider.
pub fn build_authorize_url(
    profile: &ProviderProfile,
    config: &OAuthConfig,
    pkce: &PkcePair,
    state: &FlowState,
    port: u16,
) -> Result<String> {
    let mut url = Url::parse(&profile.authorize_endpoint)?;

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", &redirect_uri(profile, port));
        query.append_pair("response_type", "code");
        query.append_pair("scope", &config.effective_scopes(profile).join(" "));
        query.append_pair("state", state.nonce());
        query.append_pair("code_challenge", pkce.challenge());
        query.append_pair("code_challenge_method", pkce.method());
        for (key, value) in &profile.extra_authorize_params {
            query.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}
