//! API client module
//!
//! HTTP client for the Ferry gateway.

use anyhow::{Context, Result};
use ferry_core::domain::operation::Operation;
use ferry_core::dto::job::JobAccepted;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;

/// A status read as the gateway answered it
#[derive(Debug, Clone)]
pub struct StatusReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl StatusReply {
    /// The gateway answers 202 while a job is queued or running
    pub fn is_terminal(&self) -> bool {
        self.status == 200
    }

    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// HTTP client for the Ferry gateway
pub struct ApiClient {
    base_url: String,
    client: Client,
}

impl ApiClient {
    /// Create a new API client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the gateway
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Submit a job
    ///
    /// # Arguments
    /// * `operation` - The job kind
    /// * `body` - The JSON request body
    pub async fn submit(&self, operation: Operation, body: Vec<u8>) -> Result<JobAccepted> {
        let url = format!("{}/api/{}", self.base_url, operation);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send submit request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed with status {}: {}", status, error_text);
        }

        response
            .json()
            .await
            .context("Failed to parse response JSON")
    }

    /// Read a job's status
    ///
    /// # Arguments
    /// * `include_output` - Ask for the stored output of a succeeded job
    /// * `debug` - Ask for checkpoint diagnostics
    pub async fn status(
        &self,
        operation: Operation,
        job_id: &str,
        include_output: bool,
        debug: bool,
    ) -> Result<StatusReply> {
        let url = format!("{}/api/jobs/{}/{}", self.base_url, operation, job_id);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("includeOutput", include_output.to_string()),
                ("debug", debug.to_string()),
            ])
            .send()
            .await
            .context("Failed to send status request")?;

        let status = response.status();
        if status.as_u16() != 200 && status.as_u16() != 202 {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("Request failed with status {}: {}", status, error_text);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .context("Failed to read status response")?
            .to_vec();

        Ok(StatusReply {
            status: status.as_u16(),
            content_type,
            body,
        })
    }
}
