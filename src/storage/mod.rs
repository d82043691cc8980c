//! Token persistence.
//!
//! Credential records are written as one object per user under
//! `<prefix>/<user_id>/token.json`. Writes always overwrite; there is no
//! history and no index.
//!
//! # Backends
//!
//! - [`GcsTokenStore`]: Google Cloud Storage JSON API (production)
//! - [`MemoryTokenStore`]: process-local map (local runs, tests)

use crate::config::{AppConfig, StorageBackend};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

mod gcp_auth;
mod gcs;
mod memory;

pub use gcp_auth::{GcpTokenSource, ServiceAccountKey};
pub use gcs::GcsTokenStore;
pub use memory::MemoryTokenStore;

/// Object name holding a user's credential record
pub fn token_object_path(prefix: &str, user_id: &str) -> String {
    format!("{}/{}/token.json", prefix.trim_end_matches('/'), user_id)
}

/// Storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not obtain credentials for the storage backend
    #[error("storage authentication failed: {0}")]
    Auth(String),

    /// Backend answered with a non-success status
    #[error("upload of {path} failed with status {status}: {body}")]
    Upload {
        path: String,
        status: u16,
        body: String,
    },

    #[error("storage request failed: {0}")]
    Transport(#[source] reqwest::Error),
}

impl StorageError {
    /// HTTP status returned by the backend, if it answered
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            StorageError::Upload { status, .. } => Some(*status),
            StorageError::Transport(e) => e.status().map(|s| s.as_u16()),
            StorageError::Auth(_) => None,
        }
    }
}

/// Write-only object store for credential records.
///
/// Implementations must overwrite any existing object at `path`.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Write `contents` (JSON) to `path`, replacing any previous value.
    async fn put(&self, path: &str, contents: &str) -> Result<(), StorageError>;
}

/// Build the token store selected by configuration.
///
/// For GCS, credentials come from a fixed access token if configured, else
/// a service-account key file, else the metadata server.
pub fn build_token_store(
    config: &AppConfig,
    http: reqwest::Client,
) -> anyhow::Result<Arc<dyn TokenStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory token store (tokens are lost on restart)");
            Ok(Arc::new(MemoryTokenStore::new()))
        }
        StorageBackend::Gcs => {
            let auth = if let Some(token) = &config.storage.access_token {
                GcpTokenSource::fixed(token.clone(), http.clone())
            } else if let Some(path) = config.service_account_key_path() {
                GcpTokenSource::service_account(ServiceAccountKey::from_file(&path)?, http.clone())
            } else {
                GcpTokenSource::metadata_server(http.clone())
            };

            let store = GcsTokenStore::new(
                http,
                config.storage.api_base_url.clone(),
                config.storage.bucket.clone(),
                auth,
            );
            info!(
                bucket = %store.bucket(),
                auth = store.auth_kind(),
                "Using GCS token store"
            );
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_object_path() {
        assert_eq!(
            token_object_path("bot_user_tokens", "12345"),
            "bot_user_tokens/12345/token.json"
        );
        assert_eq!(
            token_object_path("bot_user_tokens/", "12345"),
            "bot_user_tokens/12345/token.json"
        );
    }

    #[test]
    fn test_upstream_status() {
        let err = StorageError::Upload {
            path: "p".to_string(),
            status: 403,
            body: "forbidden".to_string(),
        };
        assert_eq!(err.upstream_status(), Some(403));
        assert_eq!(StorageError::Auth("no key".to_string()).upstream_status(), None);
    }

    #[test]
    fn test_build_memory_store() {
        let mut config = AppConfig::default();
        config.storage.backend = StorageBackend::Memory;

        let store = build_token_store(&config, reqwest::Client::new()).unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[test]
    fn test_build_gcs_store_with_fixed_token() {
        let mut config = AppConfig::default();
        config.storage.access_token = Some("token".to_string());

        let store = build_token_store(&config, reqwest::Client::new()).unwrap();
        assert_eq!(store.name(), "gcs");
    }

    #[test]
    fn test_build_gcs_store_with_missing_key_file() {
        let mut config = AppConfig::default();
        config.storage.service_account_key = Some("/nonexistent/key.json".to_string());

        assert!(build_token_store(&config, reqwest::Client::new()).is_err());
    }
}
