//! Worker configuration
//!
//! Storage target and queue consumption tuning. Backend settings are read
//! separately by [`ForwarderConfig::from_env`](ferry_forwarder::ForwarderConfig::from_env).

use ferry_engine::ConsumerConfig;
use std::time::Duration;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL URL of the durable store
    pub storage_connection: String,

    /// How long to wait before polling an empty queue again
    pub poll_interval: Duration,

    /// How long a received message stays hidden before redelivery
    pub visibility_timeout: Duration,

    /// Deliveries after which a message is moved to the poison queue
    pub max_dequeue_count: u32,

    /// Max deliveries processed concurrently
    pub max_parallel_jobs: usize,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(storage_connection: String) -> Self {
        let defaults = ConsumerConfig::default();
        Self {
            storage_connection,
            poll_interval: defaults.poll_interval,
            visibility_timeout: defaults.visibility_timeout,
            max_dequeue_count: defaults.max_dequeue_count,
            max_parallel_jobs: defaults.max_parallel_jobs,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - STORAGE_CONNECTION (required)
    /// - WORKER_POLL_INTERVAL (optional, seconds, default: 2)
    /// - WORKER_VISIBILITY_TIMEOUT (optional, seconds, default: 300)
    /// - WORKER_MAX_DEQUEUE_COUNT (optional, default: 5)
    /// - WORKER_MAX_PARALLEL_JOBS (optional, default: 4)
    pub fn from_env() -> anyhow::Result<Self> {
        let storage_connection = std::env::var("STORAGE_CONNECTION")
            .map_err(|_| anyhow::anyhow!("STORAGE_CONNECTION environment variable not set"))?;

        let mut config = Self::new(storage_connection);

        if let Some(secs) = env_parse::<u64>("WORKER_POLL_INTERVAL") {
            config.poll_interval = Duration::from_secs(secs);
        }

        if let Some(secs) = env_parse::<u64>("WORKER_VISIBILITY_TIMEOUT") {
            config.visibility_timeout = Duration::from_secs(secs);
        }

        if let Some(count) = env_parse::<u32>("WORKER_MAX_DEQUEUE_COUNT") {
            config.max_dequeue_count = count;
        }

        if let Some(jobs) = env_parse::<usize>("WORKER_MAX_PARALLEL_JOBS") {
            config.max_parallel_jobs = jobs;
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage_connection.trim().is_empty() {
            anyhow::bail!("storage_connection cannot be empty");
        }

        if self.poll_interval.as_secs() == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.visibility_timeout.as_secs() == 0 {
            anyhow::bail!("visibility_timeout must be greater than 0");
        }

        if self.max_dequeue_count == 0 {
            anyhow::bail!("max_dequeue_count must be greater than 0");
        }

        if self.max_parallel_jobs == 0 {
            anyhow::bail!("max_parallel_jobs must be greater than 0");
        }

        Ok(())
    }

    pub fn consumer(&self) -> ConsumerConfig {
        ConsumerConfig {
            poll_interval: self.poll_interval,
            visibility_timeout: self.visibility_timeout,
            max_dequeue_count: self.max_dequeue_count,
            max_parallel_jobs: self.max_parallel_jobs,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<T>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new("postgres://ferry@localhost/ferry".to_string())
    }

    #[test]
    fn test_default_config() {
        let config = config();
        assert_eq!(config.poll_interval, Duration::from_secs(2));
        assert_eq!(config.visibility_timeout, Duration::from_secs(300));
        assert_eq!(config.max_dequeue_count, 5);
        assert_eq!(config.max_parallel_jobs, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = config();

        config.storage_connection = String::new();
        assert!(config.validate().is_err());
        config.storage_connection = "postgres://db/ferry".to_string();

        config.max_parallel_jobs = 0;
        assert!(config.validate().is_err());
        config.max_parallel_jobs = 1;

        config.visibility_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
        config.visibility_timeout = Duration::from_secs(30);

        assert!(config.validate().is_ok());
        assert_eq!(config.consumer().visibility_timeout, Duration::from_secs(30));
    }
}
