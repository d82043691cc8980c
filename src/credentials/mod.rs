//! Credential record produced by a successful authorization-code exchange.
//!
//! The record is stored as one JSON object per user, in the same layout
//! Google client libraries use for "authorized user" credentials:
//!
//! ```json
//! {
//!   "token": "ya29...",
//!   "refresh_token": "1//0g...",
//!   "token_uri": "https://oauth2.googleapis.com/token",
//!   "client_id": "....apps.googleusercontent.com",
//!   "client_secret": "...",
//!   "scopes": ["https://www.googleapis.com/auth/spreadsheets"],
//!   "universe_domain": "googleapis.com",
//!   "account": "",
//!   "expiry": "2026-10-19T12:00:00Z"
//! }
//! ```
//!
//! The bot loads this blob back with its own Google client to call Sheets
//! and Drive on the user's behalf, so field names must not drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Universe domain recorded for Google's public cloud
pub const GOOGLE_UNIVERSE_DOMAIN: &str = "googleapis.com";

/// Access/refresh token bundle for one Telegram user.
///
/// # Security
/// - Holds the OAuth client secret alongside the tokens (needed for refresh
///   on the bot side); `Debug` output redacts all three
/// - Never logged; only written to the token store
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    /// OAuth access token
    pub token: String,

    /// OAuth refresh token (only issued on first consent or with `prompt=consent`)
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token endpoint the refresh token is redeemed at
    pub token_uri: String,

    pub client_id: String,

    pub client_secret: String,

    /// Scopes the access token was granted for
    #[serde(default)]
    pub scopes: Vec<String>,

    #[serde(default = "default_universe_domain")]
    pub universe_domain: String,

    #[serde(default)]
    pub account: String,

    /// When the access token expires (UTC)
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,

    /// Token type reported by the provider (normally "Bearer")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

fn default_universe_domain() -> String {
    GOOGLE_UNIVERSE_DOMAIN.to_string()
}

impl CredentialRecord {
    /// Serialize to the stored text form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored blob.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record() -> CredentialRecord {
        CredentialRecord {
            token: "ya29.access".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            client_id: "client.apps.googleusercontent.com".to_string(),
            client_secret: "shh".to_string(),
            scopes: vec!["https://www.googleapis.com/auth/drive".to_string()],
            universe_domain: GOOGLE_UNIVERSE_DOMAIN.to_string(),
            account: String::new(),
            expiry: Some(Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap()),
            token_type: Some("Bearer".to_string()),
        }
    }

    #[test]
    fn test_record_json_round_trip() {
        let record = sample_record();
        let json = record.to_json().unwrap();
        assert_eq!(CredentialRecord::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_authorized_user_layout() {
        let json = sample_record().to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["token"], "ya29.access");
        assert_eq!(value["refresh_token"], "1//refresh");
        assert_eq!(value["token_uri"], "https://oauth2.googleapis.com/token");
        assert_eq!(value["client_secret"], "shh");
        assert_eq!(value["universe_domain"], "googleapis.com");
        assert_eq!(value["account"], "");
        assert_eq!(value["expiry"], "2026-10-19T12:00:00Z");
        assert!(value["scopes"].is_array());
    }

    #[test]
    fn test_missing_refresh_token_serializes_as_null() {
        let mut record = sample_record();
        record.refresh_token = None;
        record.token_type = None;

        let json = record.to_json().unwrap();
        assert!(json.contains("\"refresh_token\":null"));
        assert!(!json.contains("token_type"));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!("{:?}", sample_record());
        assert!(!debug.contains("ya29.access"));
        assert!(!debug.contains("1//refresh"));
        assert!(!debug.contains("shh"));
        assert!(debug.contains("client.apps.googleusercontent.com"));
    }
}
