//! OAuth client configuration.
//!
//! Resolves the Google OAuth client either from a client-secrets file
//! downloaded from the Cloud console, or from configuration values.

use crate::config::OAuthConfig;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Google authorization endpoint
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google token endpoint
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google signing certificates
pub const GOOGLE_CERTS_URL: &str = "https://www.googleapis.com/oauth2/v1/certs";

/// OAuth client configuration, in Google's client-secrets layout
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OAuthClientConfig {
    #[serde(default)]
    pub client_id: String,

    #[serde(default)]
    pub project_id: Option<String>,

    /// OAuth authorization endpoint URL
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,

    /// OAuth token exchange endpoint URL
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    #[serde(default = "default_certs_url")]
    pub auth_provider_x509_cert_url: String,

    #[serde(default)]
    pub client_secret: String,

    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

fn default_certs_url() -> String {
    GOOGLE_CERTS_URL.to_string()
}

/// Client-secrets file: one of `web` or `installed` at the top level
#[derive(Deserialize)]
struct ClientSecretsFile {
    web: Option<OAuthClientConfig>,
    installed: Option<OAuthClientConfig>,
}

impl OAuthClientConfig {
    /// Assemble a web client from configuration values, with Google's
    /// discovery endpoints filled in.
    pub fn from_settings(oauth: &OAuthConfig) -> Self {
        Self {
            client_id: oauth.client_id.clone().unwrap_or_default(),
            project_id: oauth.project_id.clone(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
            auth_provider_x509_cert_url: default_certs_url(),
            client_secret: oauth.client_secret.clone().unwrap_or_default(),
            redirect_uris: oauth.redirect_url.iter().cloned().collect(),
        }
    }

    /// Parse a client-secrets JSON document.
    pub fn from_secrets_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("Invalid client secrets JSON")?;
        file.web
            .or(file.installed)
            .ok_or_else(|| anyhow!("Client secrets must contain a 'web' or 'installed' client"))
    }
}

/// Resolved OAuth client plus the redirect URI used for every exchange.
#[derive(Clone, Debug)]
pub struct OAuthClient {
    pub config: OAuthClientConfig,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
}

impl OAuthClient {
    /// Resolve the client once at startup.
    ///
    /// A client-secrets file, when present, takes precedence over individual
    /// settings. The redirect URI is the configured `redirect_url` when set,
    /// else the first URI registered in the client config.
    pub fn resolve(oauth: &OAuthConfig) -> Result<Self> {
        let path = Path::new(&oauth.credentials_file);
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", oauth.credentials_file))?;
            OAuthClientConfig::from_secrets_json(&contents)
                .with_context(|| format!("Failed to load {}", oauth.credentials_file))?
        } else {
            OAuthClientConfig::from_settings(oauth)
        };

        let redirect_uri = oauth
            .redirect_url
            .clone()
            .or_else(|| config.redirect_uris.first().cloned())
            .filter(|uri| !uri.is_empty());

        Ok(Self {
            config,
            redirect_uri,
            scopes: oauth.scopes.clone(),
        })
    }

    /// Names of required settings that are missing, in a stable order.
    pub fn missing_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.config.client_id.is_empty() {
            missing.push("GOOGLE_CLIENT_ID");
        }
        if self.config.client_secret.is_empty() {
            missing.push("GOOGLE_CLIENT_SECRET");
        }
        if self.redirect_uri.is_none() {
            missing.push("REDIRECT_URL");
        }
        missing
    }

    /// Redirect URI to present in the exchange, or the names of the missing
    /// settings that make an exchange pointless.
    pub fn exchange_redirect_uri(&self) -> Result<&str, Vec<&'static str>> {
        let missing = self.missing_settings();
        match self.redirect_uri.as_deref() {
            Some(uri) if missing.is_empty() => Ok(uri),
            _ => Err(missing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WEB_SECRETS: &str = r#"{
        "web": {
            "client_id": "file-client.apps.googleusercontent.com",
            "project_id": "ocr-bot",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "auth_provider_x509_cert_url": "https://www.googleapis.com/oauth2/v1/certs",
            "client_secret": "file-secret",
            "redirect_uris": ["https://auth.example.com/oauth-callback"]
        }
    }"#;

    fn settings() -> OAuthConfig {
        OAuthConfig {
            client_id: Some("env-client".to_string()),
            client_secret: Some("env-secret".to_string()),
            project_id: Some("env-project".to_string()),
            redirect_url: Some("https://env.example.com/oauth-callback".to_string()),
            credentials_file: "/nonexistent/credentials.json".to_string(),
            ..OAuthConfig::default()
        }
    }

    #[test]
    fn test_from_settings_fills_google_endpoints() {
        let config = OAuthClientConfig::from_settings(&settings());
        assert_eq!(config.client_id, "env-client");
        assert_eq!(config.client_secret, "env-secret");
        assert_eq!(config.project_id.as_deref(), Some("env-project"));
        assert_eq!(config.auth_uri, GOOGLE_AUTH_URI);
        assert_eq!(config.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(config.auth_provider_x509_cert_url, GOOGLE_CERTS_URL);
        assert_eq!(config.redirect_uris, vec!["https://env.example.com/oauth-callback"]);
    }

    #[test]
    fn test_parse_web_and_installed_secrets() {
        let web = OAuthClientConfig::from_secrets_json(WEB_SECRETS).unwrap();
        assert_eq!(web.client_id, "file-client.apps.googleusercontent.com");
        assert_eq!(web.client_secret, "file-secret");

        let installed = OAuthClientConfig::from_secrets_json(
            r#"{"installed": {"client_id": "desktop", "client_secret": "s"}}"#,
        )
        .unwrap();
        assert_eq!(installed.client_id, "desktop");
        // Missing endpoints fall back to Google's
        assert_eq!(installed.token_uri, GOOGLE_TOKEN_URI);

        assert!(OAuthClientConfig::from_secrets_json(r#"{"other": {}}"#).is_err());
    }

    #[test]
    fn test_resolve_from_settings_without_file() {
        let client = OAuthClient::resolve(&settings()).unwrap();
        assert_eq!(client.config.client_id, "env-client");
        assert_eq!(
            client.redirect_uri.as_deref(),
            Some("https://env.example.com/oauth-callback")
        );
        assert!(client.missing_settings().is_empty());
        assert_eq!(client.scopes.len(), 2);
    }

    #[test]
    fn test_secrets_file_overrides_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, WEB_SECRETS).unwrap();

        let mut oauth = settings();
        oauth.credentials_file = path.to_str().unwrap().to_string();
        oauth.redirect_url = None;

        let client = OAuthClient::resolve(&oauth).unwrap();
        assert_eq!(client.config.client_id, "file-client.apps.googleusercontent.com");
        assert_eq!(client.config.client_secret, "file-secret");
        // Falls back to the first registered redirect URI
        assert_eq!(
            client.redirect_uri.as_deref(),
            Some("https://auth.example.com/oauth-callback")
        );
    }

    #[test]
    fn test_configured_redirect_wins_over_registered_uris() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, WEB_SECRETS).unwrap();

        let mut oauth = settings();
        oauth.credentials_file = path.to_str().unwrap().to_string();

        let client = OAuthClient::resolve(&oauth).unwrap();
        assert_eq!(
            client.redirect_uri.as_deref(),
            Some("https://env.example.com/oauth-callback")
        );
    }

    #[test]
    fn test_malformed_secrets_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{not json").unwrap();

        let mut oauth = settings();
        oauth.credentials_file = path.to_str().unwrap().to_string();
        assert!(OAuthClient::resolve(&oauth).is_err());
    }

    #[test]
    fn test_missing_settings() {
        let oauth = OAuthConfig {
            credentials_file: "/nonexistent/credentials.json".to_string(),
            ..OAuthConfig::default()
        };
        let client = OAuthClient::resolve(&oauth).unwrap();
        assert_eq!(
            client.missing_settings(),
            vec!["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET", "REDIRECT_URL"]
        );
        assert!(client.exchange_redirect_uri().is_err());
    }

    #[test]
    fn test_exchange_redirect_uri() {
        let client = OAuthClient::resolve(&settings()).unwrap();
        assert_eq!(
            client.exchange_redirect_uri(),
            Ok("https://env.example.com/oauth-callback")
        );

        let mut oauth = settings();
        oauth.redirect_url = None;
        let client = OAuthClient::resolve(&oauth).unwrap();
        assert_eq!(client.exchange_redirect_uri(), Err(vec!["REDIRECT_URL"]));
    }
}
