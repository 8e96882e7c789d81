//! Configuration loading and representation.
//!
//! Values are resolved once at process start. [`RelayConfig::from_env`] layers
//! `EVENTRELAY_*` environment variables over the defaults; the structs are also
//! `Deserialize` so they can be read from a file by the binary.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Prefix for every environment variable read by [`RelayConfig::from_env`].
pub const ENV_PREFIX: &str = "EVENTRELAY_";

/// Upper bound for every duration setting: ten years.
const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Duplicate suppression settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
    pub ttl_minutes: u64,
    pub max_cache_size: usize,
    pub cleanup_interval_minutes: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_minutes: 5,
            max_cache_size: 1000,
            cleanup_interval_minutes: 10,
        }
    }
}

impl DedupConfig {
    pub fn ttl(&self) -> Duration {
        minutes(self.ttl_minutes)
    }

    pub fn cleanup_interval(&self) -> Duration {
        minutes(self.cleanup_interval_minutes)
    }
}

/// Retry scheduling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_seconds: u64,
    pub backoff_multiplier: f64,
    pub cleanup_interval_minutes: u64,
    pub driver_interval_seconds: u64,
    /// Absolute age after which a job is dropped regardless of attempts.
    pub max_age_hours: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            initial_delay_seconds: 1,
            backoff_multiplier: 2.0,
            cleanup_interval_minutes: 60,
            driver_interval_seconds: 30,
            max_age_hours: 24,
        }
    }
}

impl RetryConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }

    pub fn cleanup_interval(&self) -> Duration {
        minutes(self.cleanup_interval_minutes)
    }

    pub fn driver_interval(&self) -> Duration {
        Duration::from_secs(self.driver_interval_seconds)
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_hours.saturating_mul(3600))
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub dedup: DedupConfig,
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

impl RelayConfig {
    /// Defaults overridden by `EVENTRELAY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each known key.
    ///
    /// Keys are the full variable names, e.g. `EVENTRELAY_DEDUP_TTL_MINUTES`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        let get = |name: &str| {
            let key = format!("{ENV_PREFIX}{name}");
            lookup(&key).map(|raw| (key, raw))
        };

        override_with(&mut cfg.dedup.enabled, get("DEDUP_ENABLED"), parse_bool)?;
        override_with(&mut cfg.dedup.ttl_minutes, get("DEDUP_TTL_MINUTES"), parse_from_str)?;
        override_with(&mut cfg.dedup.max_cache_size, get("DEDUP_MAX_CACHE_SIZE"), parse_from_str)?;
        override_with(
            &mut cfg.dedup.cleanup_interval_minutes,
            get("DEDUP_CLEANUP_INTERVAL_MINUTES"),
            parse_from_str,
        )?;

        override_with(&mut cfg.retry.enabled, get("RETRY_ENABLED"), parse_bool)?;
        override_with(&mut cfg.retry.max_attempts, get("RETRY_MAX_ATTEMPTS"), parse_from_str)?;
        override_with(
            &mut cfg.retry.initial_delay_seconds,
            get("RETRY_INITIAL_DELAY_SECONDS"),
            parse_from_str,
        )?;
        override_with(
            &mut cfg.retry.backoff_multiplier,
            get("RETRY_BACKOFF_MULTIPLIER"),
            parse_from_str,
        )?;
        override_with(
            &mut cfg.retry.cleanup_interval_minutes,
            get("RETRY_CLEANUP_INTERVAL_MINUTES"),
            parse_from_str,
        )?;
        override_with(
            &mut cfg.retry.driver_interval_seconds,
            get("RETRY_DRIVER_INTERVAL_SECONDS"),
            parse_from_str,
        )?;
        override_with(&mut cfg.retry.max_age_hours, get("RETRY_MAX_AGE_HOURS"), parse_from_str)?;

        override_with(&mut cfg.server.bind, get("SERVER_BIND"), parse_from_str)?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dedup.max_cache_size == 0 {
            return Err(ConfigError::invalid("dedup.max_cache_size", "must be at least 1"));
        }
        if self.dedup.cleanup_interval_minutes == 0 {
            return Err(ConfigError::invalid("dedup.cleanup_interval_minutes", "must be at least 1"));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "must be at least 1"));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("retry.backoff_multiplier", "must be a finite number >= 1.0"));
        }
        if self.retry.cleanup_interval_minutes == 0 {
            return Err(ConfigError::invalid("retry.cleanup_interval_minutes", "must be at least 1"));
        }
        if self.retry.driver_interval_seconds == 0 {
            return Err(ConfigError::invalid("retry.driver_interval_seconds", "must be at least 1"));
        }
        if self.retry.max_age_hours == 0 {
            return Err(ConfigError::invalid("retry.max_age_hours", "must be at least 1"));
        }

        let durations = [
            ("dedup.ttl_minutes", self.dedup.ttl()),
            ("dedup.cleanup_interval_minutes", self.dedup.cleanup_interval()),
            ("retry.initial_delay_seconds", self.retry.initial_delay()),
            ("retry.cleanup_interval_minutes", self.retry.cleanup_interval()),
            ("retry.driver_interval_seconds", self.retry.driver_interval()),
            ("retry.max_age_hours", self.retry.max_age()),
        ];
        for (key, value) in durations {
            if value.as_secs() > MAX_DURATION_SECS {
                return Err(ConfigError::invalid(key, "must not exceed ten years"));
            }
        }
        Ok(())
    }
}

fn override_with<T>(
    slot: &mut T,
    entry: Option<(String, String)>,
    parse: fn(&str) -> Result<T, String>,
) -> Result<(), ConfigError> {
    if let Some((key, raw)) = entry {
        *slot = parse(raw.trim()).map_err(|message| ConfigError::invalid(key, message))?;
    }
    Ok(())
}

fn parse_from_str<T>(raw: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse::<T>().map_err(|e| format!("{e} (got {raw:?})"))
}

fn parse_bool(raw: &str) -> Result<bool, String> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(format!("expected a boolean (got {raw:?})")),
    }
}
