//! Configuration module
//!
//! Handles CLI configuration.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Ferry gateway
    pub gateway_url: String,
}
