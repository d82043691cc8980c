//! Google Cloud Storage backend (JSON API, simple media upload).

use super::{GcpTokenSource, StorageError, TokenStore};
use async_trait::async_trait;
use tracing::debug;

/// Writes credential records to a GCS bucket.
///
/// Each `put` is a single media upload; GCS replaces the object if it
/// already exists.
pub struct GcsTokenStore {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    auth: GcpTokenSource,
}

impl GcsTokenStore {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        bucket: impl Into<String>,
        auth: GcpTokenSource,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            auth,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Credential source name for logs
    pub fn auth_kind(&self) -> &'static str {
        self.auth.kind()
    }

    fn upload_url(&self, path: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.base_url,
            urlencoding::encode(&self.bucket),
            urlencoding::encode(path)
        )
    }
}

#[async_trait]
impl TokenStore for GcsTokenStore {
    fn name(&self) -> &'static str {
        "gcs"
    }

    async fn put(&self, path: &str, contents: &str) -> Result<(), StorageError> {
        let token = self.auth.access_token().await?;

        debug!(bucket = %self.bucket, path = %path, "Uploading object");

        let response = self
            .http
            .post(self.upload_url(path))
            .bearer_auth(token)
            .header("Content-Type", "application/json")
            .body(contents.to_string())
            .send()
            .await
            .map_err(StorageError::Transport)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(StorageError::Upload {
                path: path.to_string(),
                status,
                body,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn store(base_url: String) -> GcsTokenStore {
        let http = reqwest::Client::new();
        GcsTokenStore::new(
            http.clone(),
            base_url,
            "tokens-bucket",
            GcpTokenSource::fixed("gcs-token", http),
        )
    }

    #[test]
    fn test_upload_url_encodes_object_name() {
        let store = store("https://storage.googleapis.com/".to_string());
        assert_eq!(
            store.upload_url("bot_user_tokens/12345/token.json"),
            "https://storage.googleapis.com/upload/storage/v1/b/tokens-bucket/o?uploadType=media&name=bot_user_tokens%2F12345%2Ftoken.json"
        );
    }

    #[tokio::test]
    async fn test_put_uploads_object() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/upload/storage/v1/b/tokens-bucket/o")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("uploadType".into(), "media".into()),
                Matcher::UrlEncoded("name".into(), "bot_user_tokens/12345/token.json".into()),
            ]))
            .match_header("authorization", "Bearer gcs-token")
            .match_header("content-type", "application/json")
            .match_body(r#"{"token":"abc"}"#)
            .with_status(200)
            .with_body(r#"{"name": "bot_user_tokens/12345/token.json"}"#)
            .expect(1)
            .create_async()
            .await;

        store(server.url())
            .put("bot_user_tokens/12345/token.json", r#"{"token":"abc"}"#)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_put_permission_denied() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/upload/storage/v1/b/tokens-bucket/o")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_body(r#"{"error": {"code": 403, "message": "Permission denied"}}"#)
            .create_async()
            .await;

        let err = store(server.url())
            .put("bot_user_tokens/1/token.json", "{}")
            .await
            .unwrap_err();

        assert_eq!(err.upstream_status(), Some(403));
        assert!(err.to_string().contains("Permission denied"));
    }
}
