//! Pool configuration.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::task_queue::DEFAULT_MAX_SIZE;

/// Configuration for a [`Threads`](crate::core::Threads) pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadsConfig {
    /// Execution units to spawn (clamped to the environment's maximum).
    pub thread_count: usize,
    /// Default capacity for task queues built from this configuration.
    pub max_queue_size: usize,
    /// Delay between throttle polls, in milliseconds.
    pub throttle_poll_interval_ms: u64,
    /// Stack size of native executor threads, in bytes.
    pub thread_stack_size: usize,
    /// Name prefix of native executor threads.
    pub thread_name_prefix: String,
}

impl Default for ThreadsConfig {
    fn default() -> Self {
        Self {
            thread_count: 2,
            max_queue_size: DEFAULT_MAX_SIZE,
            throttle_poll_interval_ms: 16,
            thread_stack_size: 2 * 1024 * 1024,
            thread_name_prefix: "pt-thread".into(),
        }
    }
}

impl ThreadsConfig {
    /// Configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of execution units.
    #[must_use]
    pub const fn with_thread_count(mut self, thread_count: usize) -> Self {
        self.thread_count = thread_count;
        self
    }

    /// Set the default task queue capacity.
    #[must_use]
    pub const fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the throttle poll interval.
    #[must_use]
    pub const fn with_throttle_poll_interval_ms(mut self, ms: u64) -> Self {
        self.throttle_poll_interval_ms = ms;
        self
    }

    /// Set the native executor thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the native executor thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Throttle poll interval as a [`Duration`].
    #[must_use]
    pub const fn throttle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.throttle_poll_interval_ms)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.thread_count == 0 {
            return Err("thread_count must be greater than 0".into());
        }
        if self.max_queue_size == 0 {
            return Err("max_queue_size must be greater than 0".into());
        }
        if self.throttle_poll_interval_ms == 0 {
            return Err("throttle_poll_interval_ms must be greater than 0".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.thread_name_prefix.is_empty() {
            return Err("thread_name_prefix must not be empty".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build configuration from `THREADS_*` environment variables, loading a
    /// `.env` file first if one exists. Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns a parse or validation error message.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();

        let mut cfg = Self::default();
        if let Some(v) = read_env("THREADS_COUNT")? {
            cfg.thread_count = v;
        }
        if let Some(v) = read_env("THREADS_MAX_QUEUE_SIZE")? {
            cfg.max_queue_size = v;
        }
        if let Some(v) = read_env("THREADS_THROTTLE_POLL_MS")? {
            cfg.throttle_poll_interval_ms = v;
        }
        if let Some(v) = read_env("THREADS_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }
        if let Ok(prefix) = std::env::var("THREADS_NAME_PREFIX") {
            cfg.thread_name_prefix = prefix;
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn read_env<T>(key: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{key}: {e}")),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = ThreadsConfig::new();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.max_queue_size, 999);
        assert_eq!(cfg.throttle_poll_interval(), Duration::from_millis(16));
    }

    #[test]
    fn test_builder_and_validation() {
        assert!(ThreadsConfig::new().with_thread_count(0).validate().is_err());
        assert!(ThreadsConfig::new().with_max_queue_size(0).validate().is_err());
        assert!(ThreadsConfig::new()
            .with_throttle_poll_interval_ms(0)
            .validate()
            .is_err());
        assert!(ThreadsConfig::new().with_thread_stack_size(1024).validate().is_err());
        assert!(ThreadsConfig::new().with_thread_name_prefix("").validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let cfg = ThreadsConfig::from_json_str(r#"{"thread_count": 6}"#).unwrap();
        assert_eq!(cfg.thread_count, 6);
        assert_eq!(cfg.thread_name_prefix, "pt-thread");

        assert!(ThreadsConfig::from_json_str(r#"{"thread_count": 0}"#).is_err());
        assert!(ThreadsConfig::from_json_str("not json").is_err());
    }
}
