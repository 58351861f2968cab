//! Token endpoint client: code exchange, refresh, userinfo, revocation.
//!
//! Implements the RFC 6749 token requests with the PKCE verifier
//! (RFC 7636). All requests are form-encoded POSTs over TLS; responses are
//! the provider's JSON token documents.
//!
//! # Security
//!
//! Tokens, authorization codes and PKCE verifiers are never logged; error
//! paths log status codes and provider error bodies only.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{AuthError, Result};
use crate::pkce::PkcePair;
use crate::provider::{CredentialStyle, OAuthConfig, ProviderProfile};
use crate::types::{TokenSet, UserInfo};

/// Maximum attempts for a token refresh (transport errors and 5xx only).
const MAX_REFRESH_RETRIES: u32 = 3;

/// HTTP timeout for individual token/userinfo requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for one provider registration.
#[derive(Clone)]
pub struct TokenClient {
    http: reqwest::Client,
    profile: ProviderProfile,
    config: OAuthConfig,
}

impl TokenClient {
    pub fn new(profile: ProviderProfile, config: OAuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            profile,
            config,
        })
    }

    pub fn profile(&self) -> &ProviderProfile {
        &self.profile
    }

    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// POST a form to the token endpoint, applying the profile's credential
    /// transport style.
    async fn post_token_form(&self, params: &HashMap<&str, &str>) -> Result<reqwest::Response> {
        let body = serde_urlencoded::to_string(params)
            .map_err(|e| AuthError::Other(format!("Failed to encode token request: {}", e)))?;

        let mut request = self
            .http
            .post(&self.profile.token_endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body);

        if self.profile.credential_style == CredentialStyle::BasicHeader {
            request = request.basic_auth(
                &self.config.client_id,
                self.config.client_secret.as_deref(),
            );
        }

        Ok(request.send().await?)
    }

    /// Exchange an authorization code for a token set.
    ///
    /// `redirect_uri` must be exactly the loopback URI the code was issued
    /// for, port included.
    #[instrument(skip(self, code, pkce, redirect_uri), fields(provider = %self.profile.kind))]
    pub async fn exchange(
        &self,
        code: &str,
        pkce: &PkcePair,
        redirect_uri: &str,
    ) -> Result<TokenSet> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("redirect_uri", redirect_uri);
        params.insert("code_verifier", pkce.verifier());
        params.insert("client_id", self.config.client_id.as_str());

        if self.profile.credential_style == CredentialStyle::Body {
            if let Some(secret) = self.config.client_secret.as_deref() {
                params.insert("client_secret", secret);
            }
        }

        debug!("exchanging authorization code for tokens");
        let response = self.post_token_form(&params).await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "token exchange failed");
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let token_response: TokenResponse = response.json().await?;
        info!(
            expires_in = token_response.expires_in,
            "authorization code exchanged"
        );
        Ok(token_response.into_token_set(None))
    }

    /// Refresh an expired or expiring token set.
    ///
    /// Retries with exponential backoff on transport errors and 5xx
    /// responses; 4xx responses (revoked or invalid grant) fail
    /// immediately. When the provider omits a rotated refresh token, the
    /// prior one is carried forward.
    #[instrument(skip(self, prior), fields(provider = %self.profile.kind))]
    pub async fn refresh(&self, prior: &TokenSet) -> Result<TokenSet> {
        let refresh_token = prior
            .refresh_token
            .as_deref()
            .ok_or_else(|| AuthError::RefreshFailed("no refresh token on record".to_string()))?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", self.config.client_id.as_str());

        if self.profile.credential_style == CredentialStyle::Body {
            if let Some(secret) = self.config.client_secret.as_deref() {
                params.insert("client_secret", secret);
            }
        }

        let mut attempts = 0;
        loop {
            attempts += 1;

            let outcome = self.post_token_form(&params).await;

            let retryable_error = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let token_response: TokenResponse = response.json().await?;
                        info!(
                            expires_in = token_response.expires_in,
                            "access token refreshed"
                        );
                        return Ok(token_response.into_token_set(Some(refresh_token)));
                    }

                    let body = response.text().await.unwrap_or_default();
                    if status.is_client_error() {
                        warn!(status = status.as_u16(), "token refresh rejected");
                        return Err(AuthError::RefreshFailed(format!(
                            "token endpoint returned {}: {}",
                            status.as_u16(),
                            body
                        )));
                    }
                    format!("token endpoint returned {}: {}", status.as_u16(), body)
                }
                Err(err) => err.to_string(),
            };

            if attempts >= MAX_REFRESH_RETRIES {
                return Err(AuthError::RefreshFailed(format!(
                    "token refresh failed after {} attempts: {}",
                    attempts, retryable_error
                )));
            }

            let delay = Duration::from_millis(100 * 2u64.pow(attempts - 1));
            warn!(
                attempts,
                delay_ms = delay.as_millis() as u64,
                "token refresh failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Fetch the provider's userinfo document and normalize it.
    ///
    /// Providers disagree on field names; this accepts the common spellings
    /// (`sub`/`id`, `email`/`mail`/`userPrincipalName`,
    /// `name`/`displayName`/`display_name`).
    #[instrument(skip(self, access_token), fields(provider = %self.profile.kind))]
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let response = self
            .http
            .get(&self.profile.userinfo_endpoint)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        let value: Value = response.json().await?;
        let id = string_field(&value, &["sub", "id"])
            .ok_or_else(|| AuthError::Other("userinfo response has no user id".to_string()))?;

        Ok(UserInfo {
            id,
            email: string_field(&value, &["email", "mail", "userPrincipalName"]),
            display_name: string_field(&value, &["name", "displayName", "display_name"]),
        })
    }

    /// Best-effort token revocation at disconnect.
    ///
    /// No-op for providers without a revocation endpoint. The refresh token
    /// is revoked when present (it invalidates the grant), the access token
    /// otherwise.
    #[instrument(skip(self, tokens), fields(provider = %self.profile.kind))]
    pub async fn revoke(&self, tokens: &TokenSet) -> Result<()> {
        let Some(endpoint) = self.profile.revoke_endpoint.as_deref() else {
            return Ok(());
        };

        let token = tokens
            .refresh_token
            .as_deref()
            .unwrap_or(&tokens.access_token);

        let mut params = HashMap::new();
        params.insert("token", token);
        let body = serde_urlencoded::to_string(&params)
            .map_err(|e| AuthError::Other(format!("Failed to encode revoke request: {}", e)))?;

        let response = self
            .http
            .post(endpoint)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Other(format!(
                "revocation endpoint returned {}",
                response.status().as_u16()
            )));
        }
        debug!("token revoked upstream");
        Ok(())
    }
}

/// Token response from the OAuth provider's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    token_type: Option<String>,
    scope: Option<String>,
}

fn default_expires_in() -> i64 {
    3600 // Default to 1 hour if not specified
}

impl TokenResponse {
    /// Convert to a `TokenSet`, carrying the prior refresh token forward
    /// when the provider did not rotate it.
    fn into_token_set(self, prior_refresh: Option<&str>) -> TokenSet {
        let refresh_token = self
            .refresh_token
            .or_else(|| prior_refresh.map(str::to_string));
        TokenSet::new(
            self.access_token,
            refresh_token,
            self.expires_in,
            self.scope,
            self.token_type,
        )
    }
}

fn string_field(value: &Value, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        let field = value.get(name)?;
        match field {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    })
}
