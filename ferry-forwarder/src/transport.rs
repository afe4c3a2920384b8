//! HTTP transport seam
//!
//! The forwarder talks to the backend through [`Transport`] so retry
//! behaviour can be exercised without a network.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Client, Method};
use std::time::Duration;

use crate::error::TransportError;
use crate::retry::parse_retry_after;

/// One authenticated request to the backend
#[derive(Debug, Clone)]
pub struct BackendCall {
    pub method: Method,
    pub url: String,
    pub bearer: String,
    /// Sent as `x-corr` so backend logs can be joined with ours
    pub correlation: String,
    /// JSON body, if any
    pub body: Option<Vec<u8>>,
}

/// What came back, before any classification
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub retry_after: Option<Duration>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, call: BackendCall) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] over a shared reqwest connection pool
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client))
    }

    /// Uses a preconfigured client (timeouts, proxies, TLS...)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, call: BackendCall) -> Result<RawResponse, TransportError> {
        let mut request = self
            .client
            .request(call.method, &call.url)
            .header(AUTHORIZATION, format!("Bearer {}", call.bearer))
            .header(ACCEPT, "application/json")
            .header("x-corr", &call.correlation);

        if let Some(body) = call.body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = response.bytes().await?.to_vec();

        Ok(RawResponse {
            status,
            content_type,
            retry_after,
            body,
        })
    }
}
