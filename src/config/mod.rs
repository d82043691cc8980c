use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Default location of the Google client-secrets file.
pub const DEFAULT_CREDENTIALS_FILE: &str = "credentials.json";

/// Service-account key files picked up for storage credentials when present,
/// in order of preference.
pub const DEFAULT_SERVICE_ACCOUNT_KEYS: [&str; 2] =
    ["telegram-ocr-connection.json", "service-account.json"];

/// Scopes requested for the bot: spreadsheet and drive access.
pub const DEFAULT_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Complete service configuration.
///
/// Built once at process start (TOML file, then environment overrides) and
/// handed to the router. Nothing reads the environment after startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// Listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Timeout applied to every outbound HTTP request (token endpoint, GCS)
    #[serde(default = "default_http_timeout")]
    pub http_timeout_seconds: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_http_timeout() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            http_timeout_seconds: default_http_timeout(),
        }
    }
}

/// OAuth client settings. Used to assemble the client config when no
/// client-secrets file exists.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub project_id: Option<String>,
    /// Externally visible URL of `/oauth-callback`. Must match the URL the
    /// consent screen redirected to, byte for byte.
    #[serde(default)]
    pub redirect_url: Option<String>,
    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

fn default_credentials_file() -> String {
    DEFAULT_CREDENTIALS_FILE.to_string()
}

fn default_scopes() -> Vec<String> {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            project_id: None,
            redirect_url: None,
            credentials_file: default_credentials_file(),
            scopes: default_scopes(),
        }
    }
}

/// Which token store backs the callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Gcs,
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gcs" => Ok(Self::Gcs),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown token store backend '{}'", other)),
        }
    }
}

/// Token storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: StorageBackend,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Path to a service-account key file used for GCS credentials
    #[serde(default)]
    pub service_account_key: Option<String>,
    /// Fixed bearer token for GCS, bypassing key files and the metadata server
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_gcs_base_url")]
    pub api_base_url: String,
}

fn default_backend() -> StorageBackend {
    StorageBackend::Gcs
}

fn default_bucket() -> String {
    "andre_ocr_bot-bucket".to_string()
}

fn default_prefix() -> String {
    "bot_user_tokens".to_string()
}

fn default_gcs_base_url() -> String {
    "https://storage.googleapis.com".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            bucket: default_bucket(),
            prefix: default_prefix(),
            service_account_key: None,
            access_token: None,
            api_base_url: default_gcs_base_url(),
        }
    }
}

/// Telegram deep-link configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_bot_username")]
    pub bot_username: String,
}

fn default_bot_username() -> String {
    "YourBotUsername".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_username: default_bot_username(),
        }
    }
}

impl AppConfig {
    /// Overlay environment settings on top of this config.
    ///
    /// `lookup` returns the value of a variable, or `None` when unset. Empty
    /// values are treated as unset.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("HOST") {
            self.server.host = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("PORT must be a valid port number, got '{}'", v))?;
        }
        if let Some(v) = get("HTTP_TIMEOUT_SECONDS") {
            self.server.http_timeout_seconds = v
                .parse()
                .with_context(|| format!("HTTP_TIMEOUT_SECONDS must be an integer, got '{}'", v))?;
        }

        if let Some(v) = get("GOOGLE_CLIENT_ID") {
            self.oauth.client_id = Some(v);
        }
        if let Some(v) = get("GOOGLE_CLIENT_SECRET") {
            self.oauth.client_secret = Some(v);
        }
        if let Some(v) = get("GOOGLE_PROJECT_ID") {
            self.oauth.project_id = Some(v);
        }
        // REDIRECT_URI is accepted for deployments configured with the older name
        if let Some(v) = get("REDIRECT_URL").or_else(|| get("REDIRECT_URI")) {
            self.oauth.redirect_url = Some(v);
        }
        if let Some(v) = get("OAUTH_CREDENTIALS_FILE") {
            self.oauth.credentials_file = v;
        }

        if let Some(v) = get("TOKEN_STORE") {
            self.storage.backend = v.parse()?;
        }
        if let Some(v) = get("GCS_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("GOOGLE_APPLICATION_CREDENTIALS") {
            self.storage.service_account_key = Some(v);
        }
        if let Some(v) = get("GCS_ACCESS_TOKEN") {
            self.storage.access_token = Some(v);
        }

        if let Some(v) = get("BOT_USERNAME") {
            self.telegram.bot_username = v;
        }

        Ok(())
    }

    /// Service-account key to use for storage: the configured path, else the
    /// first default key file that exists in the working directory.
    pub fn service_account_key_path(&self) -> Option<String> {
        self.service_account_key_path_in(Path::new("."))
    }

    fn service_account_key_path_in(&self, dir: &Path) -> Option<String> {
        if let Some(path) = &self.storage.service_account_key {
            return Some(path.clone());
        }
        DEFAULT_SERVICE_ACCOUNT_KEYS
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| candidate.exists())
            .map(|found| found.to_string_lossy().into_owned())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: AppConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config file {}", path))?;
    Ok(config)
}
