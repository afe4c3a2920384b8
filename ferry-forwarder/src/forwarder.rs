//! Resilient forwarding client
//!
//! Posts a normalized payload to `{backend}/runner?identifier={session}`
//! with a fresh bearer token on every attempt. Transient outcomes (network
//! failures, 429/502/503/504) are retried on a capped exponential backoff,
//! honouring `Retry-After`; everything else is returned immediately.

use async_trait::async_trait;
use ferry_core::domain::operation::Operation;
use ferry_core::text::{clip, clip_bytes, correlation_id};
use reqwest::{Method, Url};
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::ForwarderConfig;
use crate::error::{ForwardError, TransportError};
use crate::payload::RunnerPayload;
use crate::retry::is_retryable;
use crate::token::{TokenProvider, token_provider_from_env};
use crate::transport::{BackendCall, RawResponse, ReqwestTransport, Transport};
use crate::{Backend, ForwardResponse};

/// Characters of a response body kept in log lines
const LOG_SNIPPET: usize = 400;

/// Characters of a health probe body kept in a [`PingReport`]
const PING_SNIPPET: usize = 500;

/// The backend-facing client
pub struct Forwarder {
    config: ForwarderConfig,
    tokens: Arc<dyn TokenProvider>,
    transport: Arc<dyn Transport>,
}

impl Forwarder {
    pub fn new(
        config: ForwarderConfig,
        tokens: Arc<dyn TokenProvider>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            config,
            tokens,
            transport,
        }
    }

    /// Builds a forwarder from `POOL_ENDPOINT`, `BACKEND_AUDIENCE`, the
    /// token-related variables and a reqwest transport bounded by
    /// `request_timeout`
    pub fn from_env() -> Result<Self, TransportError> {
        let config = ForwarderConfig::from_env();
        let transport = ReqwestTransport::with_timeout(config.request_timeout)?;
        Ok(Self::new(
            config,
            token_provider_from_env(),
            Arc::new(transport),
        ))
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.config
    }

    /// Forwards `body` for `action` under the backend session `session_id`.
    ///
    /// Backend error statuses come back as a normal [`ForwardResponse`].
    /// Errors are reserved for missing configuration and token failures.
    pub async fn forward_action(
        &self,
        action: &str,
        body: &[u8],
        session_id: &str,
    ) -> Result<ForwardResponse, ForwardError> {
        let started = Instant::now();
        let corr = correlation_id();

        info!(
            "Forwarding '{}' for session '{}' (corr {}, {} bytes)",
            action,
            session_id,
            corr,
            body.len()
        );

        let Some(endpoint) = self.config.endpoint.as_deref() else {
            error!("Cannot forward (corr {}): POOL_ENDPOINT is not set", corr);
            return Err(ForwardError::MissingEndpoint);
        };

        let payload = match RunnerPayload::from_request(action, body) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Rejecting request body (corr {}): {}", corr, e);
                return Ok(ForwardResponse::json(400, r#"{"error":"invalid_json"}"#));
            }
        };

        let url = runner_url(endpoint, session_id)?;
        let json = serde_json::to_vec(&payload)?;

        debug!(
            "Mapped payload (corr {}): url='{}' code_present={} json_len={}",
            corr,
            url,
            payload.code.is_some(),
            json.len()
        );

        let max_attempts = self.config.max_attempts;
        let mut backoff = self.config.backoff();

        for attempt in 1..=max_attempts {
            let bearer = match self.tokens.token(&self.config.audience).await {
                Ok(token) => token,
                Err(e) => {
                    error!(
                        "Token acquisition failed (corr {}, attempt {}): {}",
                        corr, attempt, e
                    );
                    return Err(ForwardError::Token(e));
                }
            };

            debug!(
                "Attempt {}/{} (corr {}, token_len {}, backoff {:?})",
                attempt,
                max_attempts,
                corr,
                bearer.len(),
                backoff.current()
            );

            let call = BackendCall {
                method: Method::POST,
                url: url.clone(),
                bearer,
                correlation: corr.clone(),
                body: Some(json.clone()),
            };

            let request_started = Instant::now();
            let delay = match self.transport.execute(call).await {
                Err(e) => {
                    warn!(
                        "Backend unreachable (corr {}, attempt {}, {} ms): {}",
                        corr,
                        attempt,
                        request_started.elapsed().as_millis(),
                        clip(&e.to_string(), 800)
                    );
                    backoff.current()
                }
                Ok(response) => {
                    debug!(
                        "Backend answered {} (corr {}, attempt {}, {} ms, ct '{}', {} bytes): '{}'",
                        response.status,
                        corr,
                        attempt,
                        request_started.elapsed().as_millis(),
                        response.content_type.as_deref().unwrap_or("-"),
                        response.body.len(),
                        clip_bytes(&response.body, LOG_SNIPPET)
                    );

                    if !is_retryable(response.status) {
                        info!(
                            "Forward finished with {} for session '{}' (corr {}, {} attempt(s), {} ms)",
                            response.status,
                            session_id,
                            corr,
                            attempt,
                            started.elapsed().as_millis()
                        );
                        return Ok(response.into());
                    }

                    let delay = backoff.delay_for(response.retry_after);
                    warn!(
                        "Backend returned {} (corr {}, attempt {}), retry_after={:?}, sleeping {:?}",
                        response.status, corr, attempt, response.retry_after, delay
                    );
                    delay
                }
            };

            if attempt < max_attempts {
                tokio::time::sleep(delay).await;
            }
            backoff.advance();
        }

        warn!(
            "Giving up on session '{}' after {} attempts (corr {}, {} ms): rate limited",
            session_id,
            max_attempts,
            corr,
            started.elapsed().as_millis()
        );

        Ok(ForwardResponse::json(429, r#"{"error":"rate_limited"}"#))
    }

    /// Authenticated `GET {backend}/healthstatus` used by diagnostics
    pub async fn ping(&self) -> PingReport {
        let Some(endpoint) = self.config.endpoint.as_deref() else {
            return PingReport::failed(None, 0, "POOL_ENDPOINT not set".to_string());
        };

        let url = format!("{}/healthstatus", endpoint);
        let started = Instant::now();

        let bearer = match self.tokens.token(&self.config.audience).await {
            Ok(token) => token,
            Err(e) => {
                return PingReport::failed(Some(url), elapsed_ms(started), e.to_string());
            }
        };

        let call = BackendCall {
            method: Method::GET,
            url: url.clone(),
            bearer,
            correlation: correlation_id(),
            body: None,
        };

        match self.transport.execute(call).await {
            Ok(response) => PingReport {
                url: Some(url),
                status: Some(response.status),
                elapsed_ms: elapsed_ms(started),
                body_snippet: Some(clip_bytes(&response.body, PING_SNIPPET)),
                error: None,
            },
            Err(e) => PingReport::failed(Some(url), elapsed_ms(started), e.to_string()),
        }
    }
}

#[async_trait]
impl Backend for Forwarder {
    async fn forward(
        &self,
        operation: Operation,
        body: &[u8],
        session_id: &str,
    ) -> Result<ForwardResponse, ForwardError> {
        self.forward_action(operation.as_str(), body, session_id)
            .await
    }
}

impl From<RawResponse> for ForwardResponse {
    fn from(raw: RawResponse) -> Self {
        Self {
            status: raw.status,
            content_type: raw
                .content_type
                .unwrap_or_else(|| "application/json".to_string()),
            body: raw.body,
        }
    }
}

/// Result of a backend health probe
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    pub url: Option<String>,
    pub status: Option<u16>,
    pub elapsed_ms: u64,
    pub body_snippet: Option<String>,
    pub error: Option<String>,
}

impl PingReport {
    fn failed(url: Option<String>, elapsed_ms: u64, error: String) -> Self {
        Self {
            url,
            status: None,
            elapsed_ms,
            body_snippet: None,
            error: Some(error),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn runner_url(endpoint: &str, session_id: &str) -> Result<String, ForwardError> {
    Url::parse_with_params(
        &format!("{}/runner", endpoint),
        &[("identifier", session_id)],
    )
    .map(String::from)
    .map_err(|e| ForwardError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    })
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TokenError, TransportError};
    use crate::token::StaticTokenProvider;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted outcome for one attempt
    enum Step {
        Respond(u16, Option<Duration>, &'static str),
        Fail,
    }

    /// Transport replaying a script and recording every call
    struct ScriptedTransport {
        script: Mutex<VecDeque<Step>>,
        calls: Mutex<Vec<(Instant, BackendCall)>>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Step>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(Instant, BackendCall)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, call: BackendCall) -> Result<RawResponse, TransportError> {
            self.calls.lock().unwrap().push((Instant::now(), call));
            let step = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Step::Respond(503, None, "busy"));
            match step {
                Step::Respond(status, retry_after, body) => Ok(RawResponse {
                    status,
                    content_type: Some("application/json".to_string()),
                    retry_after,
                    body: body.as_bytes().to_vec(),
                }),
                Step::Fail => Err(TransportError("connection refused".to_string())),
            }
        }
    }

    struct FailingTokens;

    #[async_trait]
    impl TokenProvider for FailingTokens {
        async fn token(&self, _audience: &str) -> Result<String, TokenError> {
            Err(TokenError::Malformed("no identity".to_string()))
        }
    }

    fn forwarder(transport: Arc<ScriptedTransport>) -> Forwarder {
        Forwarder::new(
            ForwarderConfig::default().with_endpoint("https://pool.example/"),
            Arc::new(StaticTokenProvider::new("tok")),
            transport,
        )
    }

    const BODY: &[u8] = br#"{"code":"print(1)"}"#;

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_statuses_until_success() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(429, None, "slow down"),
            Step::Respond(503, None, "busy"),
            Step::Respond(200, None, r#"{"ok":true}"#),
        ]);

        let response = forwarder(transport.clone())
            .forward_action("compile", BODY, "sess-abc1234")
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, br#"{"ok":true}"#);
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_synthetic_rate_limit() {
        let transport = ScriptedTransport::new(Vec::new());

        let response = forwarder(transport.clone())
            .forward_action("run", BODY, "sess-abc1234")
            .await
            .unwrap();

        assert_eq!(response.status, 429);
        assert_eq!(response.body, br#"{"error":"rate_limited"}"#);
        assert_eq!(response.content_type, "application/json");
        assert_eq!(transport.calls().len(), 12);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_after_takes_precedence_over_backoff() {
        let transport = ScriptedTransport::new(vec![
            Step::Respond(503, None, "busy"),
            Step::Respond(429, Some(Duration::from_secs(5)), "slow down"),
            Step::Respond(200, None, "{}"),
        ]);

        forwarder(transport.clone())
            .forward_action("compile", BODY, "sess-abc1234")
            .await
            .unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 3);
        // First gap uses the initial backoff, the second the server hint
        // rather than the 1.8s computed delay.
        assert!(calls[1].0 - calls[0].0 >= Duration::from_secs(1));
        assert!(calls[2].0 - calls[1].0 >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_are_retried() {
        let transport = ScriptedTransport::new(vec![
            Step::Fail,
            Step::Fail,
            Step::Respond(201, None, "{}"),
        ]);

        let response = forwarder(transport.clone())
            .forward_action("compile", BODY, "sess-abc1234")
            .await
            .unwrap();

        assert_eq!(response.status, 201);
        let calls = transport.calls();
        assert!(calls[2].0 - calls[1].0 >= Duration::from_millis(1800));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthorized_is_not_retried() {
        let transport = ScriptedTransport::new(vec![Step::Respond(401, None, "denied")]);

        let response = forwarder(transport.clone())
            .forward_action("compile", BODY, "sess-abc1234")
            .await
            .unwrap();

        assert_eq!(response.status, 401);
        assert_eq!(response.body, b"denied");
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_request_shape() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, None, "{}")]);

        forwarder(transport.clone())
            .forward_action("compile", BODY, "sess a&b")
            .await
            .unwrap();

        let (_, call) = transport.calls().remove(0);
        assert_eq!(call.method, Method::POST);
        assert_eq!(call.url, "https://pool.example/runner?identifier=sess+a%26b");
        assert_eq!(call.bearer, "tok");
        assert_eq!(call.correlation.len(), 12);

        let sent: serde_json::Value = serde_json::from_slice(&call.body.unwrap()).unwrap();
        assert_eq!(sent["action"], "compile");
        assert_eq!(sent["code"], "print(1)");
        assert!(sent["candidateId"].is_null());
    }

    #[tokio::test]
    async fn test_invalid_body_is_a_400_without_calling_backend() {
        let transport = ScriptedTransport::new(Vec::new());

        let response = forwarder(transport.clone())
            .forward_action("compile", b"not json", "sess-abc1234")
            .await
            .unwrap();

        assert_eq!(response.status, 400);
        assert_eq!(response.body, br#"{"error":"invalid_json"}"#);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_endpoint_fails_fast() {
        let transport = ScriptedTransport::new(Vec::new());
        let forwarder = Forwarder::new(
            ForwarderConfig::default(),
            Arc::new(StaticTokenProvider::new("tok")),
            transport.clone(),
        );

        let err = forwarder
            .forward_action("compile", BODY, "sess-abc1234")
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::MissingEndpoint));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_token_failure_is_terminal() {
        let transport = ScriptedTransport::new(Vec::new());
        let forwarder = Forwarder::new(
            ForwarderConfig::default().with_endpoint("https://pool.example"),
            Arc::new(FailingTokens),
            transport.clone(),
        );

        let err = forwarder
            .forward_action("compile", BODY, "sess-abc1234")
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Token(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_missing_content_type_defaults_to_json() {
        let raw = RawResponse {
            status: 200,
            content_type: None,
            retry_after: None,
            body: b"x".to_vec(),
        };
        let response = ForwardResponse::from(raw);
        assert_eq!(response.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_ping_reports_status() {
        let transport = ScriptedTransport::new(vec![Step::Respond(200, None, "healthy")]);

        let report = forwarder(transport.clone()).ping().await;

        assert_eq!(report.status, Some(200));
        assert_eq!(report.body_snippet.as_deref(), Some("healthy"));
        assert_eq!(
            report.url.as_deref(),
            Some("https://pool.example/healthstatus")
        );
        assert_eq!(transport.calls()[0].1.method, Method::GET);
    }
}
