//! OAuth token exchange logic.
//!
//! Handles exchanging authorization codes for access tokens.

use super::provider::OAuthClient;
use crate::credentials::{CredentialRecord, GOOGLE_UNIVERSE_DOMAIN};
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Token exchange failures
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Token endpoint answered with a non-success status (invalid or
    /// expired code, redirect URI mismatch, bad client secret)
    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("failed to reach token endpoint: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to parse token response: {0}")]
    Malformed(#[source] reqwest::Error),
}

impl ExchangeError {
    /// HTTP status returned by the token endpoint, if it answered
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            ExchangeError::Rejected { status, .. } => Some(status.as_u16()),
            ExchangeError::Transport(e) | ExchangeError::Malformed(e) => {
                e.status().map(|s| s.as_u16())
            }
        }
    }
}

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    /// Space-separated granted scopes
    #[serde(default)]
    scope: Option<String>,
}

/// Exchange authorization code for access token
///
/// # Arguments
/// * `http` - Shared HTTP client
/// * `client` - Resolved OAuth client (endpoints, id, secret, scopes)
/// * `code` - Authorization code from callback
/// * `redirect_uri` - Must equal the URI the consent screen redirected to
///
/// # Returns
/// * `Ok(CredentialRecord)` - Tokens plus what is needed to refresh them
/// * `Err` - If token exchange fails
pub async fn exchange_code_for_token(
    http: &reqwest::Client,
    client: &OAuthClient,
    code: &str,
    redirect_uri: &str,
) -> Result<CredentialRecord, ExchangeError> {
    let config = &client.config;

    let form_data = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", config.client_id.as_str()),
        ("client_secret", config.client_secret.as_str()),
    ];

    tracing::debug!(
        token_uri = %config.token_uri,
        redirect_uri = %redirect_uri,
        "Exchanging authorization code for token"
    );

    let response = http
        .post(&config.token_uri)
        .header("Accept", "application/json")
        .form(&form_data)
        .send()
        .await
        .map_err(ExchangeError::Transport)?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ExchangeError::Rejected { status, body });
    }

    let token_response: TokenResponse = response.json().await.map_err(ExchangeError::Malformed)?;

    tracing::debug!(
        has_refresh_token = token_response.refresh_token.is_some(),
        expires_in = ?token_response.expires_in,
        "Token exchange successful"
    );

    let expiry = token_response.expires_in.and_then(expiry_after);
    if token_response.expires_in.is_some() && expiry.is_none() {
        tracing::warn!(
            expires_in = ?token_response.expires_in,
            "Token lifetime out of range, storing without expiry"
        );
    }

    // Granular consent can narrow what was requested
    let scopes = match token_response.scope.as_deref() {
        Some(granted) if !granted.trim().is_empty() => {
            granted.split_whitespace().map(str::to_string).collect()
        }
        _ => client.scopes.clone(),
    };

    Ok(CredentialRecord {
        token: token_response.access_token,
        refresh_token: token_response.refresh_token,
        token_uri: config.token_uri.clone(),
        client_id: config.client_id.clone(),
        client_secret: config.client_secret.clone(),
        scopes,
        universe_domain: GOOGLE_UNIVERSE_DOMAIN.to_string(),
        account: String::new(),
        expiry,
        token_type: token_response.token_type,
    })
}

/// Absolute expiry `seconds` from now, or `None` if it is not representable.
fn expiry_after(seconds: i64) -> Option<DateTime<Utc>> {
    Duration::try_seconds(seconds).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}
