// HTTP API: liveness route and OAuth callback

pub mod home;
pub mod oauth;

pub use home::{create_home_router, HOME_TEXT};
pub use oauth::{create_oauth_router, OAuthAppState, OAuthClient};

use crate::config::AppConfig;
use crate::storage::build_token_store;
use anyhow::{Context, Result};
use axum::Router;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::warn;

/// Combine all routes with request tracing.
pub fn create_router(oauth_state: OAuthAppState) -> Router {
    create_home_router()
        .merge(create_oauth_router(oauth_state))
        .layer(TraceLayer::new_for_http())
}

/// Resolve everything the callback needs from `config` and build the router.
pub fn create_app(config: &AppConfig) -> Result<Router> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.server.http_timeout_seconds))
        .build()
        .context("Failed to build HTTP client")?;

    let client = OAuthClient::resolve(&config.oauth).context("Failed to resolve OAuth client")?;
    let missing = client.missing_settings();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "OAuth client is incomplete; callbacks will answer 500 until configured"
        );
    }

    let token_store =
        build_token_store(config, http.clone()).context("Failed to initialize token store")?;

    Ok(create_router(OAuthAppState {
        client,
        token_store,
        http,
        token_prefix: config.storage.prefix.clone(),
        bot_username: config.telegram.bot_username.clone(),
    }))
}
