use std::net::IpAddr;
use std::time::Duration;

use crate::queue::QueueSettings;

/// Longest accepted retention window for completed jobs.
pub const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub max_body_size: usize,
    pub log_level: String,
    /// Bearer token for the admin job API. When unset the admin API is open.
    pub admin_token: Option<String>,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_retries: i32,
    pub handler_timeout: Duration,
    pub stale_after: Duration,
    pub retention_days: u32,
    pub cleanup_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup, e.g. a map in tests.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let database_url = env.required("DATABASE_URL")?;

        let host: IpAddr = env.parse("WEBHOOK_QUEUE_HOST", "0.0.0.0")?;
        let port: u16 = env.parse("WEBHOOK_QUEUE_PORT", "3000")?;
        let max_body_size: usize = env.parse("WEBHOOK_QUEUE_MAX_BODY_SIZE", "1048576")?;
        let log_level = env.or("WEBHOOK_QUEUE_LOG_LEVEL", "info");

        let admin_token = env
            .get("WEBHOOK_QUEUE_ADMIN_TOKEN")
            .filter(|t| !t.trim().is_empty());

        let poll_interval_ms: u64 = env.parse("WEBHOOK_QUEUE_POLL_INTERVAL_MS", "30000")?;
        if poll_interval_ms == 0 {
            return Err("WEBHOOK_QUEUE_POLL_INTERVAL_MS must be greater than 0".to_string());
        }

        let batch_size: i64 = env.parse("WEBHOOK_QUEUE_BATCH_SIZE", "10")?;
        if batch_size < 1 {
            return Err("WEBHOOK_QUEUE_BATCH_SIZE must be at least 1".to_string());
        }

        let max_retries: i32 = env.parse("WEBHOOK_QUEUE_MAX_RETRIES", "3")?;
        if max_retries < 1 {
            return Err("WEBHOOK_QUEUE_MAX_RETRIES must be at least 1".to_string());
        }

        let handler_timeout_secs: u64 = env.parse("WEBHOOK_QUEUE_HANDLER_TIMEOUT_SECS", "30")?;
        if handler_timeout_secs == 0 {
            return Err("WEBHOOK_QUEUE_HANDLER_TIMEOUT_SECS must be greater than 0".to_string());
        }

        let stale_after_secs: u64 = env.parse("WEBHOOK_QUEUE_STALE_AFTER_SECS", "300")?;
        if stale_after_secs <= handler_timeout_secs {
            return Err(
                "WEBHOOK_QUEUE_STALE_AFTER_SECS must be greater than WEBHOOK_QUEUE_HANDLER_TIMEOUT_SECS"
                    .to_string(),
            );
        }

        let retention_days: u32 = env.parse("WEBHOOK_QUEUE_RETENTION_DAYS", "30")?;
        if retention_days > MAX_RETENTION_DAYS {
            return Err(format!(
                "WEBHOOK_QUEUE_RETENTION_DAYS must be at most {MAX_RETENTION_DAYS}"
            ));
        }

        let cleanup_interval_secs: u64 = env.parse("WEBHOOK_QUEUE_CLEANUP_INTERVAL_SECS", "86400")?;
        if cleanup_interval_secs == 0 {
            return Err("WEBHOOK_QUEUE_CLEANUP_INTERVAL_SECS must be greater than 0".to_string());
        }

        Ok(Config {
            database_url,
            host,
            port,
            max_body_size,
            log_level,
            admin_token,
            poll_interval: Duration::from_millis(poll_interval_ms),
            batch_size,
            max_retries,
            handler_timeout: Duration::from_secs(handler_timeout_secs),
            stale_after: Duration::from_secs(stale_after_secs),
            retention_days,
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
        })
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            handler_timeout: self.handler_timeout,
            stale_after: self.stale_after,
        }
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn required(&self, key: &str) -> Result<String, String> {
        self.get(key)
            .ok_or_else(|| format!("Missing required environment variable: {key}"))
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T>(&self, key: &str, default: &str) -> Result<T, String>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.or(key, default)
            .parse()
            .map_err(|e| format!("Invalid {key}: {e}"))
    }
}
