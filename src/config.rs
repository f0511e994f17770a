use crate::payments::providers::mpesa::{MpesaGatewayOptions, UnintegratedOperationPolicy};
use crate::payments::types::ConnectionParams;
use anyhow::{anyhow, Context, Result};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub mpesa: MpesaConfig,
    pub redis: Option<RedisConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub active: bool,
    pub connection: ConnectionParams,
    pub token_ttl: Duration,
    pub request_timeout: Duration,
    pub unintegrated_operations: UnintegratedOperationPolicy,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl MpesaConfig {
    pub fn gateway_options(&self) -> MpesaGatewayOptions {
        MpesaGatewayOptions {
            token_ttl: self.token_ttl,
            request_timeout: self.request_timeout,
            unintegrated_operations: self.unintegrated_operations,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_source<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| var(key).with_context(|| format!("{} not set", key));
        let or_default = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let server = ServerConfig {
            host: or_default("HOST", "0.0.0.0"),
            port: or_default("PORT", "8000")
                .parse()
                .context("PORT must be a valid number")?,
        };

        let connection = ConnectionParams {
            consumer_key: required("MPESA_CONSUMER_KEY")?,
            consumer_secret: required("MPESA_CONSUMER_SECRET")?,
            base_url: or_default("MPESA_BASE_URL", "https://sandbox.safaricom.co.ke/"),
            shortcode: or_default("MPESA_SHORTCODE", "174379"),
            passkey: required("MPESA_PASSKEY")?,
            callback_url: required("MPESA_CALLBACK_URL")?,
            initiator_name: or_default("MPESA_INITIATOR_NAME", "apitest425"),
            initiator_security_credential: var("MPESA_INITIATOR_SECURITY_CREDENTIAL")
                .filter(|s| !s.trim().is_empty()),
        };

        let mpesa = MpesaConfig {
            active: or_default("MPESA_ACTIVE", "true")
                .parse()
                .context("MPESA_ACTIVE must be 'true' or 'false'")?,
            connection,
            token_ttl: Duration::from_secs(
                or_default("MPESA_TOKEN_TTL_SECS", "450")
                    .parse()
                    .context("MPESA_TOKEN_TTL_SECS must be a valid number")?,
            ),
            request_timeout: Duration::from_secs(
                or_default("MPESA_TIMEOUT_SECS", "30")
                    .parse()
                    .context("MPESA_TIMEOUT_SECS must be a valid number")?,
            ),
            unintegrated_operations: or_default("MPESA_UNINTEGRATED_OPERATIONS", "acknowledge")
                .parse()
                .context("MPESA_UNINTEGRATED_OPERATIONS is invalid")?,
        };

        let redis = var("REDIS_URL")
            .filter(|s| !s.trim().is_empty())
            .map(|url| RedisConfig { url });

        let config = Config {
            server,
            mpesa,
            redis,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        // Validate port range
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let connection = &self.mpesa.connection;

        for (name, value) in [
            ("MPESA_CONSUMER_KEY", &connection.consumer_key),
            ("MPESA_CONSUMER_SECRET", &connection.consumer_secret),
            ("MPESA_PASSKEY", &connection.passkey),
            ("MPESA_CALLBACK_URL", &connection.callback_url),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{} cannot be empty", name));
            }
        }

        let base_url = &connection.base_url;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(anyhow!(
                "MPESA_BASE_URL must be an http(s) URL, got {}",
                connection.base_url
            ));
        }

        let shortcode = &connection.shortcode;
        if shortcode.is_empty() || !shortcode.chars().all(|c| c.is_ascii_digit()) {
            return Err(anyhow!(
                "MPESA_SHORTCODE must be numeric, got {}",
                connection.shortcode
            ));
        }

        if self.mpesa.token_ttl.is_zero() {
            return Err(anyhow!("MPESA_TOKEN_TTL_SECS must be greater than 0"));
        }

        if self.mpesa.request_timeout.is_zero() {
            return Err(anyhow!("MPESA_TIMEOUT_SECS must be greater than 0"));
        }

        Ok(())
    }
}
