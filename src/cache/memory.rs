//! Process-local cache backend

use super::cache::{validate_ttl, Cache};
use super::error::CacheResult;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
struct Entry {
    json: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// In-memory cache with per-entry expiry.
///
/// Values are stored as JSON so the behaviour matches [`super::RedisCache`]:
/// a value that no longer deserializes into the requested type reads as a miss.
/// Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let now = Instant::now();
        let json = {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => Some(entry.json.clone()),
                _ => None,
            }
        };

        let Some(json) = json else {
            debug!("Cache miss for key: {}", key);
            // Drop the expired entry, if any, so the map does not grow unbounded.
            self.entries
                .write()
                .await
                .retain(|k, e| k != key || e.is_live(now));
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(value) => {
                debug!("Cache hit for key: {}", key);
                Ok(Some(value))
            }
            Err(e) => {
                debug!("Cached value for key '{}' has a different shape: {}", key, e);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        validate_ttl(ttl)?;
        let json = serde_json::to_string(value)?;
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);

        self.entries
            .write()
            .await
            .insert(key.to_string(), Entry { json, expires_at });

        debug!("Cache set for key: {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(Instant::now())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheError;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        cache
            .set("k", &"value".to_string(), Some(Duration::from_secs(60)))
            .await
            .unwrap();

        let got: Option<String> = cache.get("k").await.unwrap();
        assert_eq!(got.as_deref(), Some("value"));
        assert_eq!(cache.len().await, 1);

        assert!(<InMemoryCache as Cache<String>>::delete(&cache, "k").await.unwrap());
        assert!(!<InMemoryCache as Cache<String>>::delete(&cache, "k").await.unwrap());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = InMemoryCache::new();
        cache
            .set("k", &1u32, Some(Duration::from_millis(50)))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;

        let got: Option<u32> = cache.get("k").await.unwrap();
        assert_eq!(got, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_shape_mismatch_reads_as_miss() {
        let cache = InMemoryCache::new();
        cache.set("k", &"text".to_string(), None).await.unwrap();

        let got: Option<u32> = cache.get("k").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_zero_ttl_rejected() {
        let cache = InMemoryCache::new();
        let result = cache.set("k", &1u32, Some(Duration::ZERO)).await;
        assert!(matches!(result, Err(CacheError::TtlError(_))));
    }
}
