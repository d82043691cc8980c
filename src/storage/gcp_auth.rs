//! GCP access tokens for the storage backend.
//!
//! Tokens come from one of:
//! - a fixed bearer token (e.g. `gcloud auth print-access-token`)
//! - a service-account key file, via a signed JWT-bearer assertion
//! - the metadata server (Cloud Run, GCE, GKE)
//!
//! Tokens are cached and refreshed five minutes before they expire.

use super::StorageError;
use anyhow::{Context, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Scope needed to write objects
pub const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Metadata server token endpoint for the attached service account
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Refresh this long before the reported expiry
const TOKEN_REFRESH_BUFFER_SECS: u64 = 300;

/// Assertion lifetime; Google caps it at one hour
const ASSERTION_LIFETIME_SECS: i64 = 3600;

/// Fields of a service-account key file that are needed to mint tokens
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    crate::api::oauth::GOOGLE_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Invalid service account key JSON")
    }

    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read service account key {}", path))?;
        Self::from_json(&contents).with_context(|| format!("Failed to load {}", path))
    }
}

/// JWT claims for the service-account assertion
#[derive(Debug, Serialize, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Sign a JWT-bearer assertion for `key`, issued at `now` (unix seconds).
fn build_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, StorageError> {
    let claims = AssertionClaims {
        iss: key.client_email.clone(),
        scope: STORAGE_SCOPE.to_string(),
        aud: key.token_uri.clone(),
        iat: now,
        exp: now + ASSERTION_LIFETIME_SECS,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| StorageError::Auth(format!("Invalid service account private key: {}", e)))?;

    jsonwebtoken::encode(&header, &claims, &signing_key)
        .map_err(|e| StorageError::Auth(format!("Failed to sign assertion: {}", e)))
}

/// Response from Google token endpoints and the metadata server
#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Metadata and token endpoints issue one-hour tokens when unspecified
const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3600;

/// When a token fetched at `now` should be replaced. Lifetimes too large to
/// represent fall back to the default one.
fn refresh_deadline(now: Instant, expires_in: Option<u64>) -> Instant {
    let refresh_after = |lifetime: u64| {
        now.checked_add(Duration::from_secs(
            lifetime.saturating_sub(TOKEN_REFRESH_BUFFER_SECS),
        ))
    };
    expires_in
        .and_then(refresh_after)
        .or_else(|| refresh_after(DEFAULT_TOKEN_LIFETIME_SECS))
        .unwrap_or(now)
}

/// Cached access token with expiry tracking
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

enum Source {
    Fixed(String),
    ServiceAccount(ServiceAccountKey),
    MetadataServer { url: String },
}

/// Supplies bearer tokens for Cloud Storage requests
pub struct GcpTokenSource {
    source: Source,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl GcpTokenSource {
    fn new(source: Source, http: reqwest::Client) -> Self {
        Self {
            source,
            http,
            cached: RwLock::new(None),
        }
    }

    /// Always hand out `token`; no refresh.
    pub fn fixed(token: impl Into<String>, http: reqwest::Client) -> Self {
        Self::new(Source::Fixed(token.into()), http)
    }

    pub fn service_account(key: ServiceAccountKey, http: reqwest::Client) -> Self {
        Self::new(Source::ServiceAccount(key), http)
    }

    pub fn metadata_server(http: reqwest::Client) -> Self {
        Self::metadata_server_at(METADATA_TOKEN_URL, http)
    }

    pub fn metadata_server_at(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self::new(Source::MetadataServer { url: url.into() }, http)
    }

    /// Credential source name for logs
    pub fn kind(&self) -> &'static str {
        match self.source {
            Source::Fixed(_) => "fixed",
            Source::ServiceAccount(_) => "service_account",
            Source::MetadataServer { .. } => "metadata_server",
        }
    }

    /// Get a valid access token, refreshing if necessary
    ///
    /// Concurrent callers that find the cache stale wait on one refresh.
    pub async fn access_token(&self) -> Result<String, StorageError> {
        if let Source::Fixed(token) = &self.source {
            return Ok(token.clone());
        }

        {
            let cache = self.cached.read().await;
            if let Some(ref cached) = *cache {
                if cached.refresh_at > Instant::now() {
                    return Ok(cached.token.clone());
                }
            }
        }

        let mut cache = self.cached.write().await;
        // Another caller may have refreshed while we waited for the lock
        if let Some(ref cached) = *cache {
            if cached.refresh_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }

        let fetched = match &self.source {
            Source::Fixed(token) => return Ok(token.clone()),
            Source::ServiceAccount(key) => self.fetch_with_service_account(key).await?,
            Source::MetadataServer { url } => self.fetch_from_metadata_server(url).await?,
        };

        let token = fetched.access_token;
        *cache = Some(CachedToken {
            token: token.clone(),
            refresh_at: refresh_deadline(Instant::now(), fetched.expires_in),
        });

        Ok(token)
    }

    async fn fetch_with_service_account(
        &self,
        key: &ServiceAccountKey,
    ) -> Result<AccessTokenResponse, StorageError> {
        let assertion = build_assertion(key, chrono::Utc::now().timestamp())?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(StorageError::Transport)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::Auth(format!(
                "Service account token request returned {}: {}",
                status, body
            )));
        }

        let token = response
            .json::<AccessTokenResponse>()
            .await
            .map_err(|e| StorageError::Auth(format!("Failed to parse token response: {}", e)))?;

        debug!(client_email = %key.client_email, "Obtained GCP token for service account");
        Ok(token)
    }

    async fn fetch_from_metadata_server(&self, url: &str) -> Result<AccessTokenResponse, StorageError> {
        let response = self
            .http
            .get(url)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| StorageError::Auth(format!("Metadata server request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(StorageError::Auth(format!(
                "Metadata server returned {}",
                response.status()
            )));
        }

        let token = response
            .json::<AccessTokenResponse>()
            .await
            .map_err(|e| StorageError::Auth(format!("Failed to parse token response: {}", e)))?;

        debug!("Obtained GCP token from metadata server");
        Ok(token)
    }
}
