use anyhow::Context;
use mpesa_gateway::api::{self, AppState};
use mpesa_gateway::cache::{Cache, InMemoryCache};
use mpesa_gateway::config::Config;
use mpesa_gateway::logging::{init_logging, LogFormat};
use mpesa_gateway::{AccessToken, MpesaGateway, MpesaPlugin};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let format = std::env::var("LOG_FORMAT")
        .map(|f| LogFormat::from_str_lossy(&f))
        .unwrap_or_default();
    init_logging("info,mpesa_gateway=debug", format);

    let config = Config::from_env()?;

    tracing::info!("Starting M-Pesa gateway");
    tracing::info!("M-Pesa API: {}", config.mpesa.connection.base_url);
    tracing::info!("Business shortcode: {}", config.mpesa.connection.shortcode);
    tracing::info!("Gateway active: {}", config.mpesa.active);

    let (store, token_store) = token_store(&config).await?;
    let gateway = MpesaGateway::new(store, config.mpesa.gateway_options())
        .context("Failed to build M-Pesa gateway")?;
    let plugin = MpesaPlugin::new(config.mpesa.active, config.mpesa.connection.clone(), gateway);

    let app = api::router(AppState {
        plugin: Arc::new(plugin),
        token_store,
    });

    let host: std::net::IpAddr = config
        .server
        .host
        .parse()
        .context("HOST must be an IP address")?;
    let addr = SocketAddr::from((host, config.server.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "cache")]
async fn token_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn Cache<AccessToken>>, &'static str)> {
    use mpesa_gateway::cache::{init_cache_pool, CacheConfig, RedisCache};

    match &config.redis {
        Some(redis) => {
            let pool = init_cache_pool(CacheConfig {
                redis_url: redis.url.clone(),
                ..Default::default()
            })
            .await
            .context("Failed to initialize Redis token store")?;
            let store: Arc<dyn Cache<AccessToken>> = Arc::new(RedisCache::new(pool));
            Ok((store, "redis"))
        }
        None => {
            let store: Arc<dyn Cache<AccessToken>> = Arc::new(InMemoryCache::new());
            Ok((store, "memory"))
        }
    }
}

#[cfg(not(feature = "cache"))]
async fn token_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn Cache<AccessToken>>, &'static str)> {
    if config.redis.is_some() {
        tracing::warn!(
            "REDIS_URL is set but the cache feature is disabled, using in-memory token store"
        );
    }
    let store: Arc<dyn Cache<AccessToken>> = Arc::new(InMemoryCache::new());
    Ok((store, "memory"))
}
