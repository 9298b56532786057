use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    sqlx::{
        SqlitePool,
        sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    },
    topicbridge_common::time::now_ms,
    tracing::debug,
};

use crate::{KeyValueStore, Result, error::Context};

/// SQLite-backed key-value store.
///
/// Expiry is stored as an absolute unix-millisecond deadline and enforced on
/// read; expired rows are purged lazily when keys are listed.
pub struct SqliteKvStore {
    pool: SqlitePool,
}

impl SqliteKvStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) a database file and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Self::init(&pool).await?;
        debug!(path = %path.display(), "opened sqlite kv store");
        Ok(Self::new(pool))
    }

    /// A private in-memory database. Limited to one connection because every
    /// `:memory:` connection gets its own database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::init(&pool).await?;
        Ok(Self::new(pool))
    }

    /// Initialize the kv table schema.
    pub async fn init(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS kv (
                key        TEXT    PRIMARY KEY,
                value      TEXT    NOT NULL,
                expires_at INTEGER
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Delete every expired row. Returns the number of rows removed.
    pub async fn purge_expired(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM kv WHERE expires_at IS NOT NULL AND expires_at <= ?")
            .bind(now_ms())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Escape `LIKE` wildcards so prefixes match literally.
fn like_prefix(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for ch in prefix.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv WHERE key = ? AND (expires_at IS NULL OR expires_at > ?)",
        )
        .bind(key)
        .bind(now_ms())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| {
            now_ms().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        sqlx::query(
            r#"INSERT INTO kv (key, value, expires_at) VALUES (?, ?, ?)
               ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 expires_at = excluded.expires_at"#,
        )
        .bind(key)
        .bind(value)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let purged = self.purge_expired().await?;
        if purged > 0 {
            debug!(purged, "purged expired kv rows");
        }
        let keys = sqlx::query_scalar::<_, String>(
            "SELECT key FROM kv WHERE key LIKE ? ESCAPE '\\' ORDER BY key",
        )
        .bind(like_prefix(prefix))
        .fetch_all(&self.pool)
        .await?;
        Ok(keys)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_prefix_escapes_wildcards() {
        assert_eq!(like_prefix("user:"), "user:%");
        assert_eq!(like_prefix("a_b%c\\"), "a\\_b\\%c\\\\%");
    }

    #[tokio::test]
    async fn upsert_and_get() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        store.put("user:1", "old", None).await.unwrap();
        store.put("user:1", "new", None).await.unwrap();
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("new"));
        assert!(store.get("user:2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn huge_ttl_keeps_the_entry() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        store
            .put("mg:p2t:1", "buf", Some(Duration::MAX))
            .await
            .unwrap();
        store
            .put("mg:p2t:2", "buf", Some(Duration::from_secs(u64::MAX / 1_000)))
            .await
            .unwrap();
        assert_eq!(store.get("mg:p2t:1").await.unwrap().as_deref(), Some("buf"));
        assert_eq!(store.list_keys("mg:").await.unwrap(), vec![
            "mg:p2t:1", "mg:p2t:2"
        ]);
    }

    #[tokio::test]
    async fn delete_removes_key() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        store.put("verify:t", "{}", None).await.unwrap();
        store.delete("verify:t").await.unwrap();
        assert!(store.get("verify:t").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_keys_treats_underscore_literally() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        for key in ["mg:p2t:1", "mg:t2p:2", "mgXp2t", "user:1"] {
            store.put(key, "v", None).await.unwrap();
        }
        store.put("a_b:1", "v", None).await.unwrap();
        store.put("axb:1", "v", None).await.unwrap();

        assert_eq!(store.list_keys("mg:").await.unwrap(), vec![
            "mg:p2t:1", "mg:t2p:2"
        ]);
        assert_eq!(store.list_keys("a_b").await.unwrap(), vec!["a_b:1"]);
    }

    #[tokio::test]
    async fn expired_entries_are_invisible() {
        let store = SqliteKvStore::in_memory().await.unwrap();
        store
            .put("mg:p2t:1", "buf", Some(Duration::from_millis(1)))
            .await
            .unwrap();
        store.put("user:1", "rec", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(store.get("mg:p2t:1").await.unwrap().is_none());
        assert!(store.list_keys("mg:").await.unwrap().is_empty());
        assert_eq!(store.get("user:1").await.unwrap().as_deref(), Some("rec"));
    }

    #[tokio::test]
    async fn open_creates_file_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("topicbridge.db");
        {
            let store = SqliteKvStore::open(&path).await.unwrap();
            store.put("user:5", "rec", None).await.unwrap();
        }
        let reopened = SqliteKvStore::open(&path).await.unwrap();
        assert_eq!(reopened.get("user:5").await.unwrap().as_deref(), Some("rec"));
    }
}
