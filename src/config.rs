// Engine configuration: defaults, optional config file, BOOKING__* environment overrides

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV_PREFIX: &str = "BOOKING";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration source error: {0}")]
    Source(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Exchange rate cache options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateCacheConfig {
    pub ttl_hours: i64,
    pub upstream_timeout_ms: u64,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            upstream_timeout_ms: 5000,
        }
    }
}

impl RateCacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.ttl_hours)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateProviderConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for RateProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchangerate-api.com/v4/latest".to_string(),
            timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentConfig {
    pub timeout_ms: u64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self { timeout_ms: 15_000 }
    }
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub rate_cache: RateCacheConfig,
    pub rate_provider: RateProviderConfig,
    pub payment: PaymentConfig,
}

impl EngineConfig {
    /// Load configuration. Later sources override earlier ones:
    /// 1. built-in defaults
    /// 2. the file at `path`, if given (format from its extension)
    /// 3. environment variables such as `BOOKING__RATE_CACHE__TTL_HOURS=12`
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config, Environment, File};

        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let loaded: EngineConfig = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_cache.ttl_hours <= 0 {
            return Err(ConfigError::Invalid(format!(
                "rate_cache.ttl_hours must be positive, got {}",
                self.rate_cache.ttl_hours
            )));
        }
        if self.rate_cache.upstream_timeout_ms == 0 || self.rate_provider.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "rate lookups need a non-zero timeout".to_string(),
            ));
        }
        if self.payment.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "payment.timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.rate_provider.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "rate_provider.base_url is empty".to_string(),
            ));
        }
        Ok(())
    }
}
