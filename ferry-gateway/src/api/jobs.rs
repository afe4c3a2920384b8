//! Job Status API Handler

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use ferry_core::domain::operation::Operation;
use ferry_engine::{JobView, StatusError, StatusQuery};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::{AppState, parse_flag};

/// Query parameters of a status read
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusParams {
    pub include_output: Option<String>,
    pub debug: Option<String>,
}

impl StatusParams {
    fn query(&self) -> StatusQuery {
        StatusQuery {
            include_output: parse_flag(self.include_output.as_deref(), true),
            debug: parse_flag(self.debug.as_deref(), false),
        }
    }
}

/// GET /api/jobs/{operation}/{job_id}
/// 202 while the job is pending, 200 once it is terminal
pub async fn get_job_status(
    State(state): State<AppState>,
    Path((operation, job_id)): Path<(String, String)>,
    Query(params): Query<StatusParams>,
) -> ApiResult<Response> {
    let not_found = || ApiError::NotFound(format!("Job {}/{} not found", operation, job_id));

    let op: Operation = operation.parse().map_err(|_| not_found())?;
    let id = Uuid::parse_str(&job_id).map_err(|_| not_found())?;

    tracing::debug!("Reading status of {}/{}", op, id.simple());

    let view = state
        .reader
        .get_status(op, id, params.query())
        .await
        .map_err(|e| match e {
            StatusError::NotFound { .. } => not_found(),
            StatusError::Store(err) => ApiError::StoreError(err),
        })?;

    Ok(view_response(view))
}

/// Maps a status view to its HTTP shape
pub fn view_response(view: JobView) -> Response {
    match view {
        JobView::Pending(body) => (StatusCode::ACCEPTED, Json(body)).into_response(),
        JobView::Failed(body) | JobView::Succeeded(body) | JobView::Degraded(body) => {
            (StatusCode::OK, Json(body)).into_response()
        }
        JobView::Output { content_type, body } => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, content_type)],
            body,
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{body_bytes, state};
    use chrono::Utc;
    use ferry_core::domain::job::{JobRecord, JobStatus};
    use ferry_store::{BlobStore, JobTable, MemoryStore, names};
    use std::sync::Arc;

    async fn read(store: &Arc<MemoryStore>, operation: &str, job_id: &str, params: StatusParams) -> Response {
        get_job_status(
            State(state(store)),
            Path((operation.to_string(), job_id.to_string())),
            Query(params),
        )
        .await
        .into_response()
    }

    async fn insert(store: &MemoryStore, status: JobStatus) -> JobRecord {
        let mut record = JobRecord::queued(Operation::Run, Uuid::new_v4(), Utc::now());
        record.status = status;
        if status == JobStatus::Failed {
            record.error_message = Some("backend returned 401: denied".to_string());
        }
        if status == JobStatus::Succeeded {
            record.output_ref = Some(record.input_ref.clone());
        }
        store.insert(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn test_pending_job_answers_202() {
        let store = Arc::new(MemoryStore::new());
        let record = insert(&store, JobStatus::Running).await;

        let response = read(&store, "run", &record.job_id.to_string(), StatusParams::default()).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "Running");
        assert_eq!(body["jobId"], record.job_id.simple().to_string());
    }

    #[tokio::test]
    async fn test_failed_job_answers_200_with_error() {
        let store = Arc::new(MemoryStore::new());
        let record = insert(&store, JobStatus::Failed).await;

        let response = read(&store, "run", &record.job_id.simple().to_string(), StatusParams::default()).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "Failed");
        assert_eq!(body["error"], "backend returned 401: denied");
    }

    #[tokio::test]
    async fn test_succeeded_job_serves_stored_output() {
        let store = Arc::new(MemoryStore::new());
        let record = insert(&store, JobStatus::Succeeded).await;
        store.ensure_container(names::OUTPUT_CONTAINER).await.unwrap();
        store
            .put(names::OUTPUT_CONTAINER, &record.input_ref, br#"{"exitCode":0}"#)
            .await
            .unwrap();

        let id = record.job_id.simple().to_string();
        let response = read(&store, "run", &id, StatusParams::default()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_bytes(response).await, br#"{"exitCode":0}"#);

        let params = StatusParams {
            include_output: Some("false".to_string()),
            debug: Some("1".to_string()),
        };
        let response = read(&store, "run", &id, params).await;
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["status"], "Succeeded");
        assert_eq!(body["outputRef"], record.input_ref);
        assert_eq!(body["diagnostics"]["attempts"], 0);
    }

    #[tokio::test]
    async fn test_unknown_or_malformed_ids_are_not_found() {
        let store = Arc::new(MemoryStore::new());
        let missing = Uuid::new_v4().to_string();

        for (operation, id) in [("run", missing.as_str()), ("run", "not-a-uuid"), ("deploy", missing.as_str())] {
            let response = read(&store, operation, id, StatusParams::default()).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }
    }
}
