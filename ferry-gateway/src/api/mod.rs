//! API Module
//!
//! HTTP intake and status boundary of the job pipeline.

pub mod diagnostics;
pub mod error;
pub mod health;
pub mod jobs;
pub mod submit;

use axum::{
    Router,
    routing::{get, post},
};
use ferry_engine::{JobStatusReader, JobSubmitter, Stores};
use ferry_forwarder::Forwarder;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub submitter: Arc<JobSubmitter>,
    pub reader: Arc<JobStatusReader>,
    pub forwarder: Arc<Forwarder>,
}

impl AppState {
    pub fn new(stores: Stores, forwarder: Forwarder) -> Self {
        Self {
            submitter: Arc::new(JobSubmitter::new(stores.clone())),
            reader: Arc::new(JobStatusReader::new(stores.clone())),
            forwarder: Arc::new(forwarder),
            stores,
        }
    }
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/diagnostics", get(diagnostics::diagnostics))
        .route("/api/jobs/{operation}/{job_id}", get(jobs::get_job_status))
        .route("/api/{operation}", post(submit::submit_job))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Reads a boolean query flag: `1`/`true` and `0`/`false`, any case
pub(crate) fn parse_flag(value: Option<&str>, default: bool) -> bool {
    match value.map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if v == "1" || v == "true" => true,
        Some(v) if v == "0" || v == "false" => false,
        _ => default,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::AppState;
    use axum::body::to_bytes;
    use axum::response::Response;
    use ferry_engine::Stores;
    use ferry_forwarder::{Forwarder, ForwarderConfig, ReqwestTransport, StaticTokenProvider};
    use ferry_store::MemoryStore;
    use std::sync::Arc;

    pub fn state(store: &Arc<MemoryStore>) -> AppState {
        let forwarder = Forwarder::new(
            ForwarderConfig::default(),
            Arc::new(StaticTokenProvider::new("test")),
            Arc::new(ReqwestTransport::new()),
        );
        AppState::new(Stores::shared(store.clone()), forwarder)
    }

    pub async fn body_bytes(response: Response) -> Vec<u8> {
        to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(Some("1"), false));
        assert!(parse_flag(Some("TRUE"), false));
        assert!(!parse_flag(Some("false"), true));
        assert!(!parse_flag(Some("0"), true));
        assert!(parse_flag(Some("maybe"), true));
        assert!(!parse_flag(None, false));
    }
}
