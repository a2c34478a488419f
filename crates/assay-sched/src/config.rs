//! Configuration objects handed to each component at construction.

use std::path::PathBuf;
use std::time::Duration;

/// Query used when the client sends none.
pub const DEFAULT_QUERY: &str = "Summarise my Blood Test Report";

/// Settings for the submission gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Directory uploads are written to. Must be visible to workers.
    pub upload_dir: PathBuf,
    /// Query substituted for an empty or missing one.
    pub default_query: String,
    /// Delay between submission and artifact removal.
    pub cleanup_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("data"),
            default_query: DEFAULT_QUERY.to_string(),
            cleanup_delay: Duration::from_secs(3600),
        }
    }
}

impl GatewayConfig {
    pub fn with_upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.upload_dir = dir.into();
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }
}

/// Settings for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Sleep between polls of an empty queue.
    pub poll_interval: Duration,
    /// Prefix for worker names in stats and logs.
    pub name_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(250),
            name_prefix: "worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Retry policy applied by queue backends.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Extra delivery attempts after the first failure. 0 disables retries.
    pub max_retries: u32,
    /// Base delay before the first retry; doubles per attempt.
    pub retry_backoff: Duration,
    /// Upper bound for the retry delay.
    pub max_backoff: Duration,
    /// How long a delivery may stay unacknowledged before it is handed out
    /// again. Covers workers that died mid-task.
    pub visibility_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(600),
            visibility_timeout: Duration::from_secs(1800),
        }
    }
}

impl QueueConfig {
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Delay before retrying a delivery that just failed on `attempt`
    /// (1-based), or `None` once retries are exhausted.
    pub fn retry_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt > self.max_retries {
            return None;
        }
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        Some(self.retry_backoff.saturating_mul(factor).min(self.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_retries_by_default() {
        let config = QueueConfig::default();
        assert_eq!(config.retry_delay(1), None);
    }

    #[test]
    fn test_exponential_backoff() {
        let config = QueueConfig::default()
            .with_max_retries(3)
            .with_retry_backoff(Duration::from_secs(2));
        assert_eq!(config.retry_delay(1), Some(Duration::from_secs(2)));
        assert_eq!(config.retry_delay(2), Some(Duration::from_secs(4)));
        assert_eq!(config.retry_delay(3), Some(Duration::from_secs(8)));
        assert_eq!(config.retry_delay(4), None);
    }

    #[test]
    fn test_backoff_capped() {
        let config = QueueConfig {
            max_retries: 20,
            retry_backoff: Duration::from_secs(60),
            max_backoff: Duration::from_secs(300),
            ..QueueConfig::default()
        };
        assert_eq!(config.retry_delay(10), Some(Duration::from_secs(300)));
    }
}
