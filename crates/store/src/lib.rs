//! Key-value storage used for all cross-event relay state.
//!
//! The relay never keeps state in memory between inbound events; thread
//! records, media-group buffers and verification flags all live behind the
//! [`KeyValueStore`] trait. Implementations offer no transactions and no
//! cross-key atomicity, and callers must not assume a write is instantly
//! visible to a concurrent reader elsewhere. Prefix listing is the only index.

pub mod error;
pub mod memory;
pub mod sqlite;

use std::time::Duration;

use {
    async_trait::async_trait,
    serde::{Serialize, de::DeserializeOwned},
};

pub use {
    error::{Error, Result},
    memory::MemoryKvStore,
    sqlite::SqliteKvStore,
};

/// Asynchronous key-value capability with optional per-entry expiry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Fetch a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value. `ttl` bounds the entry's lifetime.
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remove a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List live keys starting with `prefix`, in lexicographic order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and decode a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub async fn put_json<T: Serialize + Sync + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw, ttl).await
}
