//! Gateway configuration

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (e.g., "0.0.0.0:8080")
    pub bind_addr: String,

    /// PostgreSQL URL of the durable store
    pub storage_connection: String,
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - STORAGE_CONNECTION (required)
    /// - GATEWAY_BIND_ADDR (optional, default: 0.0.0.0:8080)
    pub fn from_env() -> anyhow::Result<Self> {
        let storage_connection = std::env::var("STORAGE_CONNECTION")
            .map_err(|_| anyhow::anyhow!("STORAGE_CONNECTION environment variable not set"))?;

        let bind_addr = std::env::var("GATEWAY_BIND_ADDR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());

        Ok(Self {
            bind_addr,
            storage_connection,
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage_connection.trim().is_empty() {
            anyhow::bail!("STORAGE_CONNECTION cannot be empty");
        }

        if !self.storage_connection.starts_with("postgres://")
            && !self.storage_connection.starts_with("postgresql://")
        {
            anyhow::bail!("STORAGE_CONNECTION must be a postgres:// URL");
        }

        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("GATEWAY_BIND_ADDR '{}' is not a socket address", self.bind_addr);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(storage: &str, bind: &str) -> Config {
        Config {
            bind_addr: bind.to_string(),
            storage_connection: storage.to_string(),
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(config("postgres://ferry@localhost/ferry", "0.0.0.0:8080").validate().is_ok());
        assert!(config("postgresql://db/ferry", "127.0.0.1:9000").validate().is_ok());
        assert!(config("", "0.0.0.0:8080").validate().is_err());
        assert!(config("mysql://db/ferry", "0.0.0.0:8080").validate().is_err());
        assert!(config("postgres://db/ferry", "localhost").validate().is_err());
    }
}
