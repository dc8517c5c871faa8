use serde::Deserialize;
use std::env;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_TTL_SECS: u64 = 259_200;
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_TOTAL_PAYLOAD_LIMIT: u64 = 100 * 1024 * 1024;
pub const DEFAULT_RECALC_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} is not a valid number: {value}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{0}")]
    Invalid(String),
}

/// Tunables of the webhook store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Namespace prepended to every record key in the backend.
    pub key_prefix: String,
    /// Namespace for callback URL entries.
    pub callback_prefix: String,
    pub events_channel: String,
    pub default_category: String,
    pub default_ttl: u64,
    /// Per-payload cap, in serialized bytes.
    pub max_payload_bytes: u64,
    /// Soft cap on the ledger total.
    pub total_payload_limit: u64,
    pub recalc_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "webhook:".to_string(),
            callback_prefix: "callback:".to_string(),
            events_channel: "webhook:events".to_string(),
            default_category: "default".to_string(),
            default_ttl: DEFAULT_TTL_SECS,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            total_payload_limit: DEFAULT_TOTAL_PAYLOAD_LIMIT,
            recalc_interval_secs: DEFAULT_RECALC_INTERVAL_SECS,
        }
    }
}

impl StoreConfig {
    /// Build from `WEBHOOK_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            key_prefix: env_string("WEBHOOK_KEY_PREFIX", defaults.key_prefix),
            callback_prefix: env_string("WEBHOOK_CALLBACK_PREFIX", defaults.callback_prefix),
            events_channel: env_string("WEBHOOK_EVENTS_CHANNEL", defaults.events_channel),
            default_category: env_string("WEBHOOK_DEFAULT_CATEGORY", defaults.default_category),
            default_ttl: env_number("WEBHOOK_DEFAULT_TTL", defaults.default_ttl)?,
            max_payload_bytes: env_number("WEBHOOK_MAX_BODY_SIZE", defaults.max_payload_bytes)?,
            total_payload_limit: env_number(
                "WEBHOOK_TOTAL_PAYLOAD_LIMIT",
                defaults.total_payload_limit,
            )?,
            recalc_interval_secs: env_number(
                "WEBHOOK_RECALC_INTERVAL",
                defaults.recalc_interval_secs,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_prefix.is_empty() || self.callback_prefix.is_empty() {
            return Err(ConfigError::Invalid("key prefixes must not be empty".into()));
        }
        if self.key_prefix == self.callback_prefix {
            return Err(ConfigError::Invalid(
                "record and callback prefixes must differ".into(),
            ));
        }
        if self.default_ttl == 0 {
            return Err(ConfigError::Invalid("default TTL must be positive".into()));
        }
        if self.max_payload_bytes == 0 || self.total_payload_limit == 0 {
            return Err(ConfigError::Invalid("payload limits must be positive".into()));
        }
        if self.default_category.is_empty() {
            return Err(ConfigError::Invalid("default category must not be empty".into()));
        }
        Ok(())
    }
}

fn env_string(var: &'static str, default: String) -> String {
    match env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().to_string(),
        _ => default,
    }
}

fn env_number<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            var,
            value: raw,
        }),
        Err(_) => Ok(default),
    }
}
