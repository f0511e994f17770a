//! Generic cache trait and Redis implementation
//!
//! Provides a type-safe interface for the small set of operations the token
//! provider needs:
//! - Automatic JSON serialization/deserialization
//! - Per-entry TTL
//! - Fault tolerance (a broken backend reads as a miss)
//!

use super::error::{CacheError, CacheResult};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

#[cfg(feature = "cache")]
use super::RedisPool;
#[cfg(feature = "cache")]
use bb8::PooledConnection;
#[cfg(feature = "cache")]
use bb8_redis::RedisConnectionManager;
#[cfg(feature = "cache")]
use redis::AsyncCommands;
#[cfg(feature = "cache")]
use tracing::{debug, warn};

#[cfg(feature = "cache")]
type RedisConnection<'a> = PooledConnection<'a, RedisConnectionManager>;

/// Generic cache trait supporting any serializable type
#[async_trait]
pub trait Cache<T: Serialize + DeserializeOwned + Send + Sync + 'static>: Send + Sync {
    /// Get a value from cache by key
    async fn get(&self, key: &str) -> CacheResult<Option<T>>;

    /// Set a value in cache with optional TTL
    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()>;

    /// Delete a value from cache
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

/// Rejects TTLs that a backend would silently turn into "no expiry" or an error.
pub(crate) fn validate_ttl(ttl: Option<Duration>) -> CacheResult<()> {
    match ttl {
        Some(ttl) if ttl.is_zero() => Err(CacheError::TtlError("TTL must be non-zero".to_string())),
        _ => Ok(()),
    }
}

/// Redis implementation of the Cache trait
#[cfg(feature = "cache")]
#[derive(Clone)]
pub struct RedisCache {
    pool: RedisPool,
}

#[cfg(feature = "cache")]
impl RedisCache {
    /// Create a new Redis cache instance
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    /// Get a connection from the pool with error handling
    async fn get_connection(&self) -> CacheResult<RedisConnection<'_>> {
        self.pool.get().await.map_err(|e| {
            warn!("Failed to get Redis connection: {}", e);
            e.into()
        })
    }
}

#[cfg(feature = "cache")]
#[async_trait]
impl<T: Serialize + DeserializeOwned + Send + Sync + 'static> Cache<T> for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<T>> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(None), // Graceful degradation
        };

        let result: Option<String> = conn.get(key).await.map_err(|e| {
            warn!("Redis GET failed for key '{}': {}", key, e);
            CacheError::from(e)
        })?;

        match result {
            Some(json_str) => match serde_json::from_str(&json_str) {
                Ok(value) => {
                    debug!("Cache hit for key: {}", key);
                    Ok(Some(value))
                }
                Err(e) => {
                    warn!("Failed to deserialize cache value for key '{}': {}", key, e);
                    Ok(None)
                }
            },
            None => {
                debug!("Cache miss for key: {}", key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: &T, ttl: Option<Duration>) -> CacheResult<()> {
        validate_ttl(ttl)?;

        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(()), // Graceful degradation - don't fail
        };

        let json_str = serde_json::to_string(value).map_err(|e| {
            warn!("Failed to serialize value for key '{}': {}", key, e);
            CacheError::from(e)
        })?;

        match ttl {
            Some(ttl_duration) => {
                let _: () = conn
                    .set_ex(key, json_str, ttl_duration.as_secs().max(1))
                    .await
                    .map_err(|e| {
                        warn!("Redis SET_EX failed for key '{}': {}", key, e);
                        CacheError::from(e)
                    })?;
            }
            None => {
                let _: () = conn.set(key, json_str).await.map_err(|e| {
                    warn!("Redis SET failed for key '{}': {}", key, e);
                    CacheError::from(e)
                })?;
            }
        }

        debug!("Cache set for key: {} (ttl: {:?})", key, ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let mut conn = match self.get_connection().await {
            Ok(conn) => conn,
            Err(_) => return Ok(false), // Graceful degradation
        };

        let result: i32 = conn.del(key).await.map_err(|e| {
            warn!("Redis DEL failed for key '{}': {}", key, e);
            CacheError::from(e)
        })?;

        let deleted = result > 0;
        if deleted {
            debug!("Cache delete for key: {}", key);
        }
        Ok(deleted)
    }
}

/// TTL constants for cached data
pub mod ttl {
    use std::time::Duration;

    /// M-Pesa access tokens: 7.5 minutes, well inside the provider's one hour expiry
    pub const MPESA_ACCESS_TOKEN: Duration = Duration::from_secs(450);
}
