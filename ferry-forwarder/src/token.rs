//! Bearer token providers
//!
//! The forwarder asks for a token on every attempt; providers are free to
//! cache. Two implementations exist:
//! - [`StaticTokenProvider`]: a fixed token, for development and tests
//! - [`ManagedIdentityTokenProvider`]: the platform's managed identity

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::TokenError;

/// Tokens are refreshed this long before they expire
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";

/// Produces bearer tokens for a fixed audience
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn token(&self, audience: &str) -> Result<String, TokenError>;
}

/// Picks a provider from the environment
///
/// - BACKEND_TOKEN set: static token
/// - IDENTITY_ENDPOINT and IDENTITY_HEADER set: hosted managed identity
/// - otherwise: the instance metadata endpoint
pub fn token_provider_from_env() -> Arc<dyn TokenProvider> {
    if let Some(token) = std::env::var("BACKEND_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
    {
        info!("Using static backend token from BACKEND_TOKEN");
        return Arc::new(StaticTokenProvider::new(token));
    }

    match (
        std::env::var("IDENTITY_ENDPOINT").ok(),
        std::env::var("IDENTITY_HEADER").ok(),
    ) {
        (Some(endpoint), Some(header)) => {
            info!("Using managed identity endpoint {}", endpoint);
            Arc::new(ManagedIdentityTokenProvider::new(IdentitySource::Hosted {
                endpoint,
                header,
            }))
        }
        _ => {
            info!("Using instance metadata identity endpoint");
            Arc::new(ManagedIdentityTokenProvider::new(
                IdentitySource::InstanceMetadata,
            ))
        }
    }
}

// =============================================================================
// Static Provider
// =============================================================================

/// Always hands out the same token
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _audience: &str) -> Result<String, TokenError> {
        Ok(self.token.clone())
    }
}

// =============================================================================
// Managed Identity Provider
// =============================================================================

/// Where managed identity tokens come from
#[derive(Debug, Clone)]
pub enum IdentitySource {
    /// App Service / Container Apps style local identity endpoint
    Hosted { endpoint: String, header: String },
    /// VM instance metadata service
    InstanceMetadata,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: SystemTime,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Epoch seconds; identity endpoints send it as a string
    expires_on: Option<Value>,
}

/// Fetches tokens from the managed identity endpoint, caching per audience
pub struct ManagedIdentityTokenProvider {
    client: Client,
    source: IdentitySource,
    cache: Mutex<HashMap<String, CachedToken>>,
}

impl ManagedIdentityTokenProvider {
    pub fn new(source: IdentitySource) -> Self {
        Self::with_client(source, Client::new())
    }

    pub fn with_client(source: IdentitySource, client: Client) -> Self {
        Self {
            client,
            source,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(&self, audience: &str) -> Result<CachedToken, TokenError> {
        let request = match &self.source {
            IdentitySource::Hosted { endpoint, header } => self
                .client
                .get(endpoint)
                .query(&[("resource", audience), ("api-version", "2019-08-01")])
                .header("X-IDENTITY-HEADER", header),
            IdentitySource::InstanceMetadata => self
                .client
                .get(IMDS_ENDPOINT)
                .query(&[("resource", audience), ("api-version", "2018-02-01")])
                .header("Metadata", "true"),
        };

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TokenError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| TokenError::Malformed(e.to_string()))?;

        if parsed.access_token.is_empty() {
            return Err(TokenError::Malformed("empty access_token".to_string()));
        }

        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: expiry_from(parsed.expires_on.as_ref()),
        })
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityTokenProvider {
    async fn token(&self, audience: &str) -> Result<String, TokenError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.get(audience) {
            if SystemTime::now() + REFRESH_MARGIN < cached.expires_at {
                return Ok(cached.token.clone());
            }
        }

        debug!("Fetching managed identity token for {}", audience);
        let fresh = self.fetch(audience).await?;
        let token = fresh.token.clone();
        cache.insert(audience.to_string(), fresh);

        Ok(token)
    }
}

/// Reads `expires_on` as epoch seconds, given as a string or a number.
/// Unknown expiry means the token is used once and then refetched.
fn expiry_from(value: Option<&Value>) -> SystemTime {
    let secs = match value {
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    };

    secs.and_then(|s| UNIX_EPOCH.checked_add(Duration::from_secs(s)))
        .unwrap_or(UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_provider_ignores_audience() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.token("https://a").await.unwrap(), "abc");
        assert_eq!(provider.token("https://b").await.unwrap(), "abc");
    }

    #[test]
    fn test_expiry_accepts_strings_and_numbers() {
        let expected = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(expiry_from(Some(&json!("1700000000"))), expected);
        assert_eq!(expiry_from(Some(&json!(1_700_000_000u64))), expected);
        assert_eq!(expiry_from(Some(&json!("soon"))), UNIX_EPOCH);
        assert_eq!(expiry_from(None), UNIX_EPOCH);
        assert_eq!(expiry_from(Some(&json!(u64::MAX))), UNIX_EPOCH);
    }
}
