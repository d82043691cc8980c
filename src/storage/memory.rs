//! In-memory token store.

use super::{StorageError, TokenStore};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Process-local token store. Last write wins.
///
/// Contents are lost on restart; selected with `TOKEN_STORE=memory`.
#[derive(Default)]
pub struct MemoryTokenStore {
    objects: RwLock<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents at `path`
    pub fn get(&self, path: &str) -> Option<String> {
        self.objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(path)
            .cloned()
    }

    /// Stored object names, sorted
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .objects
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Total number of `put` calls, including overwrites
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(&self, path: &str, contents: &str) -> Result<(), StorageError> {
        self.objects
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(path.to_string(), contents.to_string());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryTokenStore::new();
        store.put("bot_user_tokens/1/token.json", "{}").await.unwrap();

        assert_eq!(store.get("bot_user_tokens/1/token.json").as_deref(), Some("{}"));
        assert_eq!(store.get("bot_user_tokens/2/token.json"), None);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryTokenStore::new();
        store.put("k", r#"{"v":1}"#).await.unwrap();
        store.put("k", r#"{"v":2}"#).await.unwrap();

        assert_eq!(store.get("k").as_deref(), Some(r#"{"v":2}"#));
        assert_eq!(store.paths(), vec!["k".to_string()]);
        assert_eq!(store.write_count(), 2);
    }
}
