//! Hearing Hub configuration.
//!
//! Configuration is loaded from environment variables. The downstream API
//! token is redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP/WebSocket bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default sliding expiry of cached conferences (8 hours).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 8 * 60 * 60;

/// Default maximum wait for a per-conference lock.
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 10;

/// Default UTC hour of the daily cache refresh.
pub const DEFAULT_CACHE_REFRESH_HOUR: u32 = 2;

/// Default outbound queue length per hub connection.
pub const DEFAULT_CONNECTION_BUFFER: usize = 64;

/// Default timeout for downstream HTTP calls.
pub const DEFAULT_DOWNSTREAM_TIMEOUT_SECONDS: u64 = 10;

/// Hearing Hub configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Base URL of the Video API.
    pub video_api_url: String,

    /// Base URL of the User API.
    pub user_api_url: String,

    /// Bearer token presented to the downstream APIs.
    pub downstream_api_token: SecretString,

    /// Sliding expiry of cached conferences.
    pub cache_ttl_seconds: u64,

    /// Maximum wait for a per-conference lock before giving up.
    pub lock_timeout_seconds: u64,

    /// UTC hour (0-23) at which the daily refresh runs.
    pub cache_refresh_hour: u32,

    /// Outbound queue length per hub connection.
    pub connection_buffer: usize,

    /// Timeout applied to downstream HTTP calls.
    pub downstream_timeout_seconds: u64,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("video_api_url", &self.video_api_url)
            .field("user_api_url", &self.user_api_url)
            .field("downstream_api_token", &"[REDACTED]")
            .field("cache_ttl_seconds", &self.cache_ttl_seconds)
            .field("lock_timeout_seconds", &self.lock_timeout_seconds)
            .field("cache_refresh_hour", &self.cache_refresh_hour)
            .field("connection_buffer", &self.connection_buffer)
            .field("downstream_timeout_seconds", &self.downstream_timeout_seconds)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {name}: {reason}")]
    InvalidValue { name: String, reason: String },
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    vars.get(name)
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

/// Parse an optional positive number, falling back to `default`.
fn positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e| ConfigError::InvalidValue {
        name: name.to_string(),
        reason: format!("must be a valid positive integer, got '{value_str}': {e}"),
    })?;

    if value <= T::default() {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            reason: "must be greater than 0".to_string(),
        });
    }

    Ok(value)
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("HUB_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let video_api_url = required(vars, "VIDEO_API_URL")?;
        let user_api_url = required(vars, "USER_API_URL")?;
        let downstream_api_token = SecretString::from(required(vars, "DOWNSTREAM_API_TOKEN")?);

        let cache_ttl_seconds =
            positive(vars, "CONFERENCE_CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL_SECONDS)?;
        let lock_timeout_seconds = positive(
            vars,
            "CONFERENCE_LOCK_TIMEOUT_SECONDS",
            DEFAULT_LOCK_TIMEOUT_SECONDS,
        )?;
        let connection_buffer = positive(vars, "HUB_CONNECTION_BUFFER", DEFAULT_CONNECTION_BUFFER)?;
        let downstream_timeout_seconds = positive(
            vars,
            "DOWNSTREAM_TIMEOUT_SECONDS",
            DEFAULT_DOWNSTREAM_TIMEOUT_SECONDS,
        )?;

        // Hour 0 is valid, so this one is parsed separately
        let cache_refresh_hour = if let Some(value_str) = vars.get("CACHE_REFRESH_HOUR") {
            let value: u32 = value_str.parse().map_err(|e| ConfigError::InvalidValue {
                name: "CACHE_REFRESH_HOUR".to_string(),
                reason: format!("must be an hour between 0 and 23, got '{value_str}': {e}"),
            })?;

            if value > 23 {
                return Err(ConfigError::InvalidValue {
                    name: "CACHE_REFRESH_HOUR".to_string(),
                    reason: format!("must be an hour between 0 and 23, got {value}"),
                });
            }

            value
        } else {
            DEFAULT_CACHE_REFRESH_HOUR
        };

        Ok(Config {
            bind_address,
            video_api_url,
            user_api_url,
            downstream_api_token,
            cache_ttl_seconds,
            lock_timeout_seconds,
            cache_refresh_hour,
            connection_buffer,
            downstream_timeout_seconds,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }

    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_secs(self.downstream_timeout_seconds)
    }
}
