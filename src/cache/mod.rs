//! Shared storage for short-lived provider credentials
//!
//! The token provider only needs get/set/delete with TTLs, so any backend
//! implementing [`Cache`] can hold access tokens. Redis is used when several
//! processes share credentials; [`InMemoryCache`] covers single-process use.

pub mod cache;
pub mod error;
pub mod keys;
pub mod memory;

// Re-export commonly used items
pub use cache::Cache;
#[cfg(feature = "cache")]
pub use cache::RedisCache;
pub use error::CacheError;
pub use memory::InMemoryCache;

#[cfg(feature = "cache")]
pub use self::redis_pool::*;

#[cfg(feature = "cache")]
mod redis_pool {
    use super::CacheError;
    use bb8::Pool;
    use bb8_redis::RedisConnectionManager;
    use std::time::Duration;
    use tracing::{error, info, warn};

    pub type RedisPool = Pool<RedisConnectionManager>;

    #[derive(Debug, Clone)]
    pub struct CacheConfig {
        pub redis_url: String,
        pub max_connections: u32,
        pub min_idle: u32,
        pub connection_timeout: Duration,
        pub max_lifetime: Duration,
        pub idle_timeout: Duration,
    }

    impl Default for CacheConfig {
        fn default() -> Self {
            Self {
                redis_url: "redis://127.0.0.1:6379".to_string(),
                max_connections: 10,
                min_idle: 1,
                connection_timeout: Duration::from_secs(5),
                max_lifetime: Duration::from_secs(300),
                idle_timeout: Duration::from_secs(60),
            }
        }
    }

    pub async fn init_cache_pool(config: CacheConfig) -> Result<RedisPool, CacheError> {
        info!(
            "Initializing Redis token store pool: max_connections={}",
            config.max_connections
        );

        let manager = RedisConnectionManager::new(config.redis_url.clone()).map_err(|e| {
            error!("Failed to create Redis connection manager: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(config.min_idle)
            .connection_timeout(config.connection_timeout)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .test_on_check_out(false)
            .build(manager)
            .await
            .map_err(|e| {
                error!("Failed to build Redis connection pool: {}", e);
                CacheError::ConnectionError(e.to_string())
            })?;

        if let Err(e) = health_check(&pool).await {
            warn!("Initial Redis connection test failed, but continuing: {}", e);
        }

        info!("Redis token store pool initialized");
        Ok(pool)
    }

    pub async fn health_check(pool: &RedisPool) -> Result<(), CacheError> {
        let mut conn = pool.get().await.map_err(|e| {
            error!("Failed to get Redis connection for health check: {}", e);
            CacheError::ConnectionError(e.to_string())
        })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| {
                error!("Redis PING failed: {}", e);
                CacheError::ConnectionError(e.to_string())
            })?;

        Ok(())
    }
}
