//! Liveness route.

use axum::{routing::get, Router};

/// Body returned by `GET /`
pub const HOME_TEXT: &str = "Auth server running!";

/// Create home router
pub fn create_home_router() -> Router {
    Router::new().route("/", get(home))
}

/// GET /
async fn home() -> &'static str {
    HOME_TEXT
}
