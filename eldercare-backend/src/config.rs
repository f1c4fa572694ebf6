use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::relay::RetryPolicy;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub session_ttl_hours: i64,
    /// Frames queued per socket before the peer counts as slow
    pub chat_outbound_buffer: usize,
    pub relay_max_attempts: u32,
    pub relay_retry_interval_ms: u64,
    pub relay_max_retry_interval_ms: u64,
    pub relay_max_elapsed_ms: u64,
    pub relay_poll_interval_ms: u64,
    /// How long acked relay entries are kept, 0 keeps them forever
    pub relay_retention_hours: i64,
    pub sos_timeout_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any key/value source; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| "./.db/eldercare.db".to_string()),
            session_ttl_hours: positive(&lookup, "SESSION_TTL_HOURS", 168)?,
            chat_outbound_buffer: positive(&lookup, "CHAT_OUTBOUND_BUFFER", 64)?,
            relay_max_attempts: positive(&lookup, "RELAY_MAX_ATTEMPTS", 5)?,
            relay_retry_interval_ms: parse_or(&lookup, "RELAY_RETRY_INTERVAL_MS", 500)?,
            relay_max_retry_interval_ms: parse_or(&lookup, "RELAY_MAX_RETRY_INTERVAL_MS", 10_000)?,
            relay_max_elapsed_ms: parse_or(&lookup, "RELAY_MAX_ELAPSED_MS", 10_000)?,
            relay_poll_interval_ms: positive(&lookup, "RELAY_POLL_INTERVAL_MS", 1_000)?,
            relay_retention_hours: parse_or(&lookup, "RELAY_RETENTION_HOURS", 72)?,
            sos_timeout_secs: positive(&lookup, "SOS_TIMEOUT_SECS", 300)?,
        };
        Ok(config)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }

    pub fn sos_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.sos_timeout_secs)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_interval_ms)
    }

    pub fn relay_retention(&self) -> Option<chrono::Duration> {
        (self.relay_retention_hours > 0).then(|| chrono::Duration::hours(self.relay_retention_hours))
    }

    pub fn relay_retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.relay_max_attempts,
            max_elapsed: (self.relay_max_elapsed_ms > 0).then(|| Duration::from_millis(self.relay_max_elapsed_ms)),
            initial_interval: Duration::from_millis(self.relay_retry_interval_ms),
            max_interval: Duration::from_millis(self.relay_max_retry_interval_ms),
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn positive<T, F>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
    F: Fn(&str) -> Option<String>,
{
    let value = parse_or(lookup, name, default)?;
    if value <= T::default() {
        return Err(ConfigError::NotPositive { name });
    }
    Ok(value)
}
