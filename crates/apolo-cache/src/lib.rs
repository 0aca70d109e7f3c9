//! In-process caching layer for the rating engine
//!
//! Provides a TTL cache implementing the `CacheService` trait from
//! apolo-core. It replaces process-wide caches: callers construct one and
//! hand it to the components that need it, and clear it explicitly when
//! the cached data is reloaded.
//!
//! # Example
//!
//! ```
//! use apolo_cache::MemoryCache;
//! use apolo_core::traits::CacheService;
//!
//! # tokio_test::block_on(async {
//! let cache = MemoryCache::new();
//! cache.set("my_key", &"my_value", 60).await.unwrap();
//!
//! let value: Option<String> = cache.get("my_key").await.unwrap();
//! assert_eq!(value, Some("my_value".to_string()));
//! # });
//! ```

pub mod keys;

use apolo_core::error::BillingError;
use apolo_core::traits::CacheService;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

struct Entry {
    json: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |exp| exp > now)
    }
}

/// TTL cache backed by a shared map
///
/// Values are stored serialized so the cache hands out independent copies,
/// never references into shared state. A TTL of 0 keeps the entry until it
/// is deleted or the cache is cleared.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every key starting with `prefix`
    pub fn remove_prefix(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        before - entries.len()
    }
}

#[async_trait]
impl CacheService for MemoryCache {
    /// Get a value from cache and deserialize it
    ///
    /// Returns `Ok(None)` on a miss or an expired entry.
    async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, BillingError> {
        let now = Instant::now();
        let entries = self.entries.read();
        match entries.get(key).filter(|e| e.is_live(now)) {
            Some(entry) => {
                let value = serde_json::from_str::<T>(&entry.json).map_err(|e| {
                    error!("Failed to deserialize value for key {}: {}", key, e);
                    BillingError::Serialization(format!("Deserialization failed: {}", e))
                })?;
                debug!("Cache HIT: {}", key);
                Ok(Some(value))
            }
            None => {
                debug!("Cache MISS: {}", key);
                Ok(None)
            }
        }
    }

    /// Set a value in cache with TTL in seconds
    async fn set<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl_secs: u64,
    ) -> Result<(), BillingError> {
        debug!("SET {} (TTL: {}s)", key, ttl_secs);
        let json = serde_json::to_string(value).map_err(|e| {
            error!("Failed to serialize value for key {}: {}", key, e);
            BillingError::Serialization(format!("Serialization failed: {}", e))
        })?;
        let expires_at = (ttl_secs > 0).then(|| Instant::now() + Duration::from_secs(ttl_secs));
        self.entries
            .write()
            .insert(key.to_string(), Entry { json, expires_at });
        Ok(())
    }

    /// Delete a key, `Ok(true)` if it was present
    async fn delete(&self, key: &str) -> Result<bool, BillingError> {
        debug!("DEL {}", key);
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, BillingError> {
        let now = Instant::now();
        Ok(self
            .entries
            .read()
            .get(key)
            .map_or(false, |e| e.is_live(now)))
    }

    async fn clear(&self) -> Result<(), BillingError> {
        debug!("FLUSH cache");
        self.entries.write().clear();
        Ok(())
    }
}
