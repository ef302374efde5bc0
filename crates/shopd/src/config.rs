//! Process configuration loaded from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use distributed_lock::LockOptions;
use orders::RetryPolicy;
use outbox::RelayConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Process configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `DATABASE_URL`: Postgres connection string. Unset means in-memory storage.
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default: `10`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `METRICS_ADDR`: Prometheus listener address. Unset disables the exporter.
/// - `OUTBOX_POLL_INTERVAL_MS`, `OUTBOX_BATCH_SIZE`, `OUTBOX_MAX_ATTEMPTS`
/// - `STOCK_LOCK_WAIT_MS`, `STOCK_LOCK_LEASE_MS`
/// - `PAYMENT_TIMEOUT_MS`, `PAYMENT_MAX_ATTEMPTS`, `PAYMENT_RETRY_BACKOFF_MS`
///
/// Values that do not parse fall back to their default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub log_level: String,
    pub log_format: LogFormat,
    pub metrics_addr: Option<SocketAddr>,
    pub outbox_poll_interval: Duration,
    pub outbox_batch_size: usize,
    pub outbox_max_attempts: i32,
    pub lock_wait: Duration,
    pub lock_lease: Duration,
    pub payment_timeout: Duration,
    pub payment_max_attempts: u32,
    pub payment_retry_backoff: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let millis = |name: &str, default: Duration| {
            parsed(&lookup, name)
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            database_url: var(&lookup, "DATABASE_URL"),
            database_max_connections: positive(&lookup, "DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            log_level: var(&lookup, "RUST_LOG").unwrap_or(defaults.log_level),
            log_format: parsed(&lookup, "LOG_FORMAT").unwrap_or(defaults.log_format),
            metrics_addr: parsed(&lookup, "METRICS_ADDR"),
            outbox_poll_interval: millis("OUTBOX_POLL_INTERVAL_MS", defaults.outbox_poll_interval),
            outbox_batch_size: positive(&lookup, "OUTBOX_BATCH_SIZE")
                .unwrap_or(defaults.outbox_batch_size),
            outbox_max_attempts: positive(&lookup, "OUTBOX_MAX_ATTEMPTS")
                .unwrap_or(defaults.outbox_max_attempts),
            lock_wait: millis("STOCK_LOCK_WAIT_MS", defaults.lock_wait),
            lock_lease: millis("STOCK_LOCK_LEASE_MS", defaults.lock_lease),
            payment_timeout: millis("PAYMENT_TIMEOUT_MS", defaults.payment_timeout),
            payment_max_attempts: positive(&lookup, "PAYMENT_MAX_ATTEMPTS")
                .unwrap_or(defaults.payment_max_attempts),
            payment_retry_backoff: millis(
                "PAYMENT_RETRY_BACKOFF_MS",
                defaults.payment_retry_backoff,
            ),
        }
    }

    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            batch_size: self.outbox_batch_size,
            poll_interval: self.outbox_poll_interval,
            max_attempts: self.outbox_max_attempts,
        }
    }

    pub fn lock_options(&self) -> LockOptions {
        LockOptions::new(self.lock_wait, self.lock_lease)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.payment_max_attempts,
            timeout: self.payment_timeout,
            backoff: self.payment_retry_backoff,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let relay = RelayConfig::default();
        let retry = RetryPolicy::default();
        let locks = LockOptions::default();
        Self {
            database_url: None,
            database_max_connections: 10,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            metrics_addr: None,
            outbox_poll_interval: relay.poll_interval,
            outbox_batch_size: relay.batch_size,
            outbox_max_attempts: relay.max_attempts,
            lock_wait: locks.wait,
            lock_lease: locks.lease,
            payment_timeout: retry.timeout,
            payment_max_attempts: retry.max_attempts,
            payment_retry_backoff: retry.backoff,
        }
    }
}

/// Trimmed value of `name`; blank counts as unset.
fn var<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    var(lookup, name).and_then(|v| v.parse().ok())
}

fn positive<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialOrd + Default,
{
    parsed(lookup, name).filter(|n: &T| *n > T::default())
}
