//! Diagnostics API Handler
//!
//! Reports which settings are present (never their values) and optionally
//! probes the queues and the backend.

use axum::{
    Json,
    extract::{Query, State},
};
use ferry_store::WorkQueue;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::api::{AppState, parse_flag};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsParams {
    pub ping_queues: Option<String>,
    pub ping_runner: Option<String>,
}

/// GET /api/diagnostics?pingQueues=1&pingRunner=1
pub async fn diagnostics(
    State(state): State<AppState>,
    Query(params): Query<DiagnosticsParams>,
) -> Json<Value> {
    let mut report = Map::new();

    report.insert(
        "POOL_ENDPOINT_set".to_string(),
        Value::Bool(state.forwarder.config().endpoint.is_some()),
    );
    report.insert(
        "STORAGE_CONNECTION_set".to_string(),
        Value::Bool(env_is_set("STORAGE_CONNECTION")),
    );

    if parse_flag(params.ping_queues.as_deref(), false) {
        report.insert("queues".to_string(), queue_report(state.stores.queue.as_ref()).await);
    }

    if parse_flag(params.ping_runner.as_deref(), false) {
        let ping = state.forwarder.ping().await;
        tracing::debug!("Backend ping: status={:?} error={:?}", ping.status, ping.error);
        report.insert(
            "runnerPing".to_string(),
            serde_json::to_value(ping).unwrap_or(Value::Null),
        );
    }

    Json(Value::Object(report))
}

async fn queue_report(queue: &dyn WorkQueue) -> Value {
    match queue.depth().await {
        Ok(depth) => json!({
            "jobs": {
                "approxMessageCount": depth.ready + depth.in_flight,
                "ready": depth.ready,
                "inFlight": depth.in_flight,
            },
            "jobsPoison": { "approxMessageCount": depth.poison },
        }),
        Err(e) => {
            tracing::warn!("Queue diagnostics failed: {}", e);
            json!({ "error": "Queue diagnostics failed", "exception": e.to_string() })
        }
    }
}

fn env_is_set(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.trim().is_empty())
}
