use std::{collections::BTreeMap, time::Duration};

use {
    async_trait::async_trait,
    tokio::{sync::RwLock, time::Instant},
};

use crate::{KeyValueStore, Result};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process store for tests and single-node deployments.
///
/// Uses tokio's clock for expiry so paused-time tests can drive TTLs.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries.values().filter(|e| e.is_live(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        // a TTL past the clock's range means no expiry
        let expires_at = ttl.and_then(|ttl| Instant::now().checked_add(ttl));
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry {
            value: value.to_string(),
            expires_at,
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.is_live(now));
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = MemoryKvStore::new();
        store.put("user:1", "a", None).await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("a"));
        store.put("user:1", "b", None).await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("b"));
        store.delete("user:1").await.unwrap();
        assert!(store.get("user:1").await.unwrap().is_none());
        // Deleting twice is fine.
        store.delete("user:1").await.unwrap();
    }

    #[tokio::test]
    async fn list_keys_filters_by_prefix() {
        let store = MemoryKvStore::new();
        for key in ["user:2", "mg:p2t:9", "user:1", "userx", "verified:1"] {
            store.put(key, "v", None).await.unwrap();
        }
        assert_eq!(store.list_keys("user:").await.unwrap(), vec![
            "user:1", "user:2"
        ]);
        assert_eq!(store.list_keys("mg:").await.unwrap(), vec!["mg:p2t:9"]);
        assert!(store.list_keys("thread:").await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = MemoryKvStore::new();
        store
            .put("mg:p2t:1", "buf", Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store.put("user:1", "rec", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(store.get("mg:p2t:1").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(store.get("mg:p2t:1").await.unwrap().is_none());
        assert!(store.list_keys("mg:").await.unwrap().is_empty());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ttl_beyond_the_clock_never_expires() {
        let store = MemoryKvStore::new();
        store
            .put("mg:p2t:1", "buf", Some(Duration::MAX))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(store.get("mg:p2t:1").await.unwrap().as_deref(), Some("buf"));
    }
}
