//! Runtime configuration parsed from environment variables.
//!
//! `main` loads an optional `.env` with `dotenvy` first, then calls
//! [`Config::from_env`]. Parsing goes through a lookup closure so tests can
//! feed a map instead of mutating process env.
//!
//! Only `PORT` is strict. Every other numeric or boolean variable falls back
//! to its default when missing or unparseable.

use std::str::FromStr;
use std::time::Duration;

use crate::services::analytics::DEFAULT_REQUIRED_WEEKLY_HOURS;
use crate::services::dispatch::DEFAULT_IDLE;
use crate::services::hub::{DEFAULT_QUEUE_CAPACITY, DEFAULT_SNAPSHOT_TIMEOUT, HubConfig};
use crate::services::schedule::{DEFAULT_FULL_UPDATE_INTERVAL, DEFAULT_REFRESH_INTERVAL};

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PORT: {0}")]
    InvalidPort(String),
}

/// Slack Socket Mode credentials. Both tokens are required.
#[derive(Clone, PartialEq, Eq)]
pub struct SlackConfig {
    /// `xapp-` token for `apps.connections.open`.
    pub app_token: String,
    /// `xoxb-` token for the Web API.
    pub bot_token: String,
}

impl std::fmt::Debug for SlackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackConfig")
            .field("app_token", &"<redacted>")
            .field("bot_token", &"<redacted>")
            .finish()
    }
}

/// Websocket liveness settings for dashboard connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub interval: Duration,
    /// Silence longer than this drops the connection.
    pub timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self { interval: DEFAULT_HEARTBEAT_INTERVAL, timeout: DEFAULT_HEARTBEAT_TIMEOUT }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    /// `None` disables the Slack adapter.
    pub slack: Option<SlackConfig>,
    pub verbose_logs: bool,
    pub duration_refresh: Duration,
    pub full_update: Duration,
    pub hub: HubConfig,
    pub heartbeat: Heartbeat,
    pub person_queue_idle: Duration,
    pub required_weekly_hours: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_url: None,
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            slack: None,
            verbose_logs: true,
            duration_refresh: DEFAULT_REFRESH_INTERVAL,
            full_update: DEFAULT_FULL_UPDATE_INTERVAL,
            hub: HubConfig::default(),
            heartbeat: Heartbeat::default(),
            person_queue_idle: DEFAULT_IDLE,
            required_weekly_hours: DEFAULT_REQUIRED_WEEKLY_HOURS,
        }
    }
}

impl Config {
    /// Build config from process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but is not a valid port number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `PORT` is set but is not a valid port number.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let port = match get("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(raw.clone()))?,
            None => DEFAULT_PORT,
        };

        let slack = match (get("SLACK_APP_TOKEN"), get("SLACK_BOT_TOKEN")) {
            (Some(app_token), Some(bot_token)) => Some(SlackConfig { app_token, bot_token }),
            _ => None,
        };

        let required_weekly_hours = parse_or(get("REQUIRED_WEEKLY_HOURS"), DEFAULT_REQUIRED_WEEKLY_HOURS);

        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_or(get(key), default.as_secs()).max(1))
        };

        Ok(Self {
            port,
            database_url: get("DATABASE_URL"),
            db_max_connections: parse_or(get("DB_MAX_CONNECTIONS"), DEFAULT_DB_MAX_CONNECTIONS).max(1),
            slack,
            verbose_logs: get("ENABLE_VERBOSE_LOGS")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(true),
            duration_refresh: secs("DURATION_REFRESH_SECS", DEFAULT_REFRESH_INTERVAL),
            full_update: secs("FULL_UPDATE_SECS", DEFAULT_FULL_UPDATE_INTERVAL),
            hub: HubConfig {
                queue_capacity: parse_or(get("BROADCAST_QUEUE_CAPACITY"), DEFAULT_QUEUE_CAPACITY).max(1),
                snapshot_timeout: secs("INITIAL_SNAPSHOT_TIMEOUT_SECS", DEFAULT_SNAPSHOT_TIMEOUT),
                required_weekly_hours,
            },
            heartbeat: Heartbeat {
                interval: secs("HEARTBEAT_INTERVAL_SECS", DEFAULT_HEARTBEAT_INTERVAL),
                timeout: secs("HEARTBEAT_TIMEOUT_SECS", DEFAULT_HEARTBEAT_TIMEOUT),
            },
            person_queue_idle: secs("PERSON_QUEUE_IDLE_SECS", DEFAULT_IDLE),
            required_weekly_hours,
        })
    }
}

fn parse_or<T: FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.parse::<T>().ok()).unwrap_or(default)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
