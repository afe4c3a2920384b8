//! Forwarder configuration
//!
//! Backend address, token audience and the retry schedule.

use std::time::Duration;

use crate::retry::Backoff;

/// Audience the execution backend expects bearer tokens for
pub const DEFAULT_AUDIENCE: &str = "https://dynamicsessions.io";

/// Forwarder configuration
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Backend base address without trailing slash; `None` when unset
    pub endpoint: Option<String>,

    /// Audience (resource) bearer tokens are requested for
    pub audience: String,

    /// Attempt ceiling for one forward
    pub max_attempts: u32,

    /// First backoff delay
    pub initial_delay: Duration,

    /// Growth factor applied after every transient outcome
    pub multiplier: f64,

    /// Upper bound for the computed backoff delay
    pub max_delay: Duration,

    /// Per-request deadline; an expired request counts as a transport failure
    pub request_timeout: Duration,
}

impl ForwarderConfig {
    /// Creates a configuration with the default retry schedule
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            endpoint: endpoint.and_then(normalize_endpoint),
            audience: DEFAULT_AUDIENCE.to_string(),
            max_attempts: 12,
            initial_delay: Duration::from_secs(1),
            multiplier: 1.8,
            max_delay: Duration::from_secs(12),
            request_timeout: Duration::from_secs(100),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - POOL_ENDPOINT (optional here, required by every forward)
    /// - BACKEND_AUDIENCE (optional, default: https://dynamicsessions.io)
    /// - FORWARD_MAX_ATTEMPTS (optional, default: 12)
    /// - FORWARD_REQUEST_TIMEOUT (optional, seconds, default: 100)
    pub fn from_env() -> Self {
        let mut config = Self::new(std::env::var("POOL_ENDPOINT").ok());

        if let Some(audience) = std::env::var("BACKEND_AUDIENCE")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            config.audience = audience;
        }

        config.max_attempts = std::env::var("FORWARD_MAX_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(config.max_attempts);

        if let Some(secs) = std::env::var("FORWARD_REQUEST_TIMEOUT")
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            config.request_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Sets the backend endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = normalize_endpoint(endpoint.into());
        self
    }

    /// Fresh backoff schedule for one forward
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.initial_delay, self.multiplier, self.max_delay)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                anyhow::bail!("POOL_ENDPOINT must start with http:// or https://");
            }
        }

        if self.audience.trim().is_empty() {
            anyhow::bail!("backend audience cannot be empty");
        }

        if self.max_attempts == 0 {
            anyhow::bail!("max_attempts must be greater than 0");
        }

        if self.request_timeout.is_zero() {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        if self.multiplier < 1.0 {
            anyhow::bail!("backoff multiplier must be at least 1.0");
        }

        Ok(())
    }
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self::new(None)
    }
}

fn normalize_endpoint(endpoint: String) -> Option<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ForwarderConfig::default();
        assert_eq!(config.endpoint, None);
        assert_eq!(config.max_attempts, 12);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.max_delay, Duration::from_secs(12));
        assert_eq!(config.request_timeout, Duration::from_secs(100));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_endpoint_is_normalized() {
        let config = ForwarderConfig::new(Some("https://pool.example/ ".to_string()));
        assert_eq!(config.endpoint.as_deref(), Some("https://pool.example"));

        let blank = ForwarderConfig::new(Some("   ".to_string()));
        assert_eq!(blank.endpoint, None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ForwarderConfig::default().with_endpoint("pool.example");
        assert!(config.validate().is_err());

        config = config.with_endpoint("https://pool.example");
        assert!(config.validate().is_ok());

        config.max_attempts = 0;
        assert!(config.validate().is_err());
        config.max_attempts = 12;

        config.request_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
