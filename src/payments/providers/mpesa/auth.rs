//! Access token acquisition and caching
//!
//! M-Pesa authorizes API calls with a short-lived bearer token obtained from
//! the OAuth endpoint using the application's consumer key and secret. Tokens
//! are kept in a shared [`Cache`] under a per-credential key and refreshed at
//! most once at a time per key within this process.

use crate::cache::keys::mpesa::AccessTokenKey;
use crate::cache::Cache;
use crate::error::{GatewayError, GatewayResult};
use crate::payments::types::GatewayConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Path of the client-credentials grant, relative to the base URL
pub const CREDENTIAL_PATH: &str = "oauth/v1/generate?grant_type=client_credentials";

/// Opaque bearer credential
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken([REDACTED])")
    }
}

// The provider also returns `expires_in`; the cache TTL is fixed instead.
#[derive(Debug, Deserialize)]
struct CredentialResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default, rename = "errorMessage")]
    error_message: Option<String>,
}

/// Obtains and caches access tokens
pub struct TokenProvider {
    client: Client,
    store: Arc<dyn Cache<AccessToken>>,
    ttl: Duration,
    refresh_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TokenProvider {
    pub fn new(client: Client, store: Arc<dyn Cache<AccessToken>>, ttl: Duration) -> Self {
        Self {
            client,
            store,
            ttl,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached token for `config`, fetching one on a miss.
    pub async fn get_token(&self, config: &GatewayConfig) -> GatewayResult<AccessToken> {
        let key = Self::key(config);
        if let Some(token) = self.cached(&key).await {
            return Ok(token);
        }

        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        // Another caller may have filled the entry while we waited.
        if let Some(token) = self.cached(&key).await {
            return Ok(token);
        }

        self.fetch_and_store(&key, config).await
    }

    /// Replace a token the provider rejected.
    ///
    /// If the store already holds a token other than `stale`, a concurrent
    /// caller refreshed first and that token is returned without a fetch.
    pub async fn refresh(
        &self,
        config: &GatewayConfig,
        stale: &AccessToken,
    ) -> GatewayResult<AccessToken> {
        let key = Self::key(config);
        let lock = self.lock_for(&key).await;
        let _guard = lock.lock().await;

        if let Some(current) = self.cached(&key).await {
            if &current != stale {
                debug!("Access token already refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        if let Err(e) = self.store.delete(&key).await {
            warn!("Failed to evict rejected access token: {}", e);
        }

        self.fetch_and_store(&key, config).await
    }

    /// Fetch a fresh token from the credential endpoint, bypassing the cache.
    pub async fn fetch_token(&self, config: &GatewayConfig) -> GatewayResult<AccessToken> {
        let params = &config.connection_params;
        let url = params.endpoint(CREDENTIAL_PATH);

        let response = self
            .client
            .get(&url)
            .basic_auth(&params.consumer_key, Some(&params.consumer_secret))
            .send()
            .await
            .map_err(|e| {
                error!("M-Pesa credential request failed: {}", e);
                GatewayError::credential(format!("Credential request failed: {}", e))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!("Failed to read M-Pesa credential response: {}", e);
            GatewayError::credential(format!("Failed to read credential response: {}", e))
        })?;

        let parsed = serde_json::from_str::<CredentialResponse>(&body).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.error_message)
                .unwrap_or_else(|| status.to_string());
            error!("M-Pesa credential endpoint returned HTTP {}: {}", status, message);
            return Err(GatewayError::credential(format!(
                "HTTP {}: {}",
                status.as_u16(),
                message
            )));
        }

        match parsed.and_then(|p| p.access_token).filter(|t| !t.is_empty()) {
            Some(token) => {
                info!("Obtained M-Pesa access token");
                Ok(AccessToken(token))
            }
            None => {
                error!("M-Pesa credential response did not contain an access token");
                Err(GatewayError::credential(
                    "Credential response did not contain an access token",
                ))
            }
        }
    }

    async fn fetch_and_store(
        &self,
        key: &str,
        config: &GatewayConfig,
    ) -> GatewayResult<AccessToken> {
        let token = self.fetch_token(config).await?;
        if let Err(e) = self.store.set(key, &token, Some(self.ttl)).await {
            warn!("Failed to cache access token: {}", e);
        }
        Ok(token)
    }

    async fn cached(&self, key: &str) -> Option<AccessToken> {
        match self.store.get(key).await {
            Ok(token) => token,
            Err(e) => {
                warn!("Access token lookup failed, treating as miss: {}", e);
                None
            }
        }
    }

    async fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks.entry(key.to_string()).or_default().clone()
    }

    fn key(config: &GatewayConfig) -> String {
        let params = &config.connection_params;
        AccessTokenKey::new(&params.shortcode, &params.base_url, &params.consumer_key).to_string()
    }
}
