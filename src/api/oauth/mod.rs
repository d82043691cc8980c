//! OAuth 2.0 authorization-code callback for the Telegram bot.
//!
//! Flow:
//! 1. Bot sends the user to Google's consent screen with `state=<telegram user id>`
//! 2. Google redirects to GET /oauth-callback?code=...&state=...
//! 3. Exchange code for tokens at the token endpoint
//! 4. Store the credential record at `<prefix>/<user_id>/token.json`
//! 5. Redirect to `https://t.me/<bot>?start=auth_success_<user_id>` (or `auth_error`)
//!
//! Once parameters and client configuration check out, every failure ends
//! in the error deep link so the user always lands back in the bot. The
//! cause is only visible in server logs.

mod exchange;
mod provider;

pub use exchange::{exchange_code_for_token, ExchangeError};
pub use provider::{
    OAuthClient, OAuthClientConfig, GOOGLE_AUTH_URI, GOOGLE_CERTS_URL, GOOGLE_TOKEN_URI,
};

use crate::storage::{token_object_path, StorageError, TokenStore};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors raised while handling a callback
#[derive(Debug, Error)]
pub enum CallbackError {
    #[error("Missing parameters")]
    MissingParameters,

    /// Required client settings are absent; checked before any exchange
    #[error("OAuth client is not configured: missing {}", .0.join(", "))]
    Config(Vec<&'static str>),

    #[error("token exchange failed: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("failed to serialize credentials: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to store credentials: {0}")]
    Storage(#[from] StorageError),
}

impl CallbackError {
    /// Stable error category for logs
    pub fn kind(&self) -> &'static str {
        match self {
            CallbackError::MissingParameters => "validation",
            CallbackError::Config(_) => "config",
            CallbackError::Exchange(_) => "exchange",
            CallbackError::Serialize(_) => "serialization",
            CallbackError::Storage(_) => "storage",
        }
    }

    /// Status code returned by the upstream service, when there was one
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            CallbackError::Exchange(e) => e.upstream_status(),
            CallbackError::Storage(e) => e.upstream_status(),
            _ => None,
        }
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let status = match self {
            CallbackError::MissingParameters => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Shared application state for the OAuth callback
#[derive(Clone)]
pub struct OAuthAppState {
    pub client: OAuthClient,
    pub token_store: Arc<dyn TokenStore>,
    pub http: reqwest::Client,
    /// Object-name prefix for stored records
    pub token_prefix: String,
    /// Bot receiving the user after the flow
    pub bot_username: String,
}

/// OAuth callback query parameters
#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Validated callback input. `state` carries the Telegram user id as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub authorization_code: String,
    pub user_id: String,
}

impl AuthorizationRequest {
    /// Both `code` and `state` must be present and non-empty.
    pub fn from_callback(callback: OAuthCallback) -> Option<Self> {
        let authorization_code = callback.code.filter(|c| !c.is_empty())?;
        let user_id = callback.state.filter(|s| !s.is_empty())?;
        Some(Self {
            authorization_code,
            user_id,
        })
    }
}

/// Deep link reopening the bot after a successful flow
pub fn success_deep_link(bot_username: &str, user_id: &str) -> String {
    format!(
        "https://t.me/{}?start=auth_success_{}",
        bot_username,
        urlencoding::encode(user_id)
    )
}

/// Deep link reopening the bot after a failed flow
pub fn error_deep_link(bot_username: &str) -> String {
    format!("https://t.me/{}?start=auth_error", bot_username)
}

/// 302 Found to `location`
fn found(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Create OAuth callback router
pub fn create_oauth_router(state: OAuthAppState) -> Router {
    Router::new()
        .route("/oauth-callback", get(oauth_callback))
        .with_state(Arc::new(state))
}

/// GET /oauth-callback
///
/// Exchanges the authorization code for tokens, stores them for the user
/// named by `state`, and sends the user back to the bot.
///
/// # Responses
/// - 400 if `code` or `state` is missing (no upstream calls made)
/// - 500 if client id, secret or redirect URL is not configured
/// - 302 to the success or error deep link otherwise
async fn oauth_callback(
    State(state): State<Arc<OAuthAppState>>,
    Query(callback): Query<OAuthCallback>,
) -> Result<Response, CallbackError> {
    if let Some(error) = &callback.error {
        warn!(
            error = %error,
            description = %callback.error_description.as_deref().unwrap_or("Unknown error"),
            "Provider reported an authorization error"
        );
    }

    let request = AuthorizationRequest::from_callback(callback).ok_or_else(|| {
        warn!("OAuth callback missing code or state");
        CallbackError::MissingParameters
    })?;

    let redirect_uri = state.client.exchange_redirect_uri().map_err(|missing| {
        let err = CallbackError::Config(missing);
        error!(kind = err.kind(), user_id = %request.user_id, error = %err, "Refusing token exchange");
        err
    })?;

    debug!(user_id = %request.user_id, "OAuth callback received");

    match complete_authorization(&state, &request, redirect_uri).await {
        Ok(path) => {
            info!(
                user_id = %request.user_id,
                store = state.token_store.name(),
                path = %path,
                "OAuth flow completed successfully"
            );
            Ok(found(success_deep_link(&state.bot_username, &request.user_id)))
        }
        Err(err) => {
            error!(
                kind = err.kind(),
                user_id = %request.user_id,
                upstream_status = ?err.upstream_status(),
                error = %err,
                "OAuth flow failed"
            );
            Ok(found(error_deep_link(&state.bot_username)))
        }
    }
}

/// Exchange the code and persist the record. Returns the object name written.
async fn complete_authorization(
    state: &OAuthAppState,
    request: &AuthorizationRequest,
    redirect_uri: &str,
) -> Result<String, CallbackError> {
    let record = exchange_code_for_token(
        &state.http,
        &state.client,
        &request.authorization_code,
        redirect_uri,
    )
    .await?;

    let path = token_object_path(&state.token_prefix, &request.user_id);
    let contents = record.to_json()?;

    debug!(
        user_id = %request.user_id,
        path = %path,
        has_refresh_token = record.refresh_token.is_some(),
        "Storing credentials"
    );
    state.token_store.put(&path, &contents).await?;

    Ok(path)
}
