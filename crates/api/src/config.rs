//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use dispatch::DispatchConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `DISPATCH_SEARCH_RADIUS_KM`: driver search radius (default: `15`)
/// - `DISPATCH_RETRY_DELAY_SECS`: wait before re-trying a deferred order (default: `300`)
/// - `DISPATCH_QUEUE_BATCH`: waiting orders offered per released driver (default: `10`)
/// - `OUTBOX_POLL_INTERVAL_MS`: outbox drain interval (default: `250`)
///
/// Unparseable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub dispatch: DispatchConfig,
    pub outbox_poll_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let dispatch = DispatchConfig {
            search_radius_m: parse(&lookup, "DISPATCH_SEARCH_RADIUS_KM")
                .map(|km: f64| km * 1000.0)
                .unwrap_or(defaults.dispatch.search_radius_m),
            retry_delay: parse(&lookup, "DISPATCH_RETRY_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.dispatch.retry_delay),
            queue_batch_size: parse(&lookup, "DISPATCH_QUEUE_BATCH")
                .unwrap_or(defaults.dispatch.queue_batch_size),
            ..defaults.dispatch
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            dispatch,
            outbox_poll_interval: parse(&lookup, "OUTBOX_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.outbox_poll_interval),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            dispatch: DispatchConfig::default(),
            outbox_poll_interval: Duration::from_millis(250),
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
