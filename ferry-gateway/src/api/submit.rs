//! Intake API Handler
//!
//! Accepts a job for one of the fixed operations and answers before any
//! backend work happens.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use ferry_core::domain::operation::Operation;
use ferry_core::dto::job::{JobAccepted, status_url};
use tokio::time::Instant;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /api/{operation}
/// Persist and enqueue a job, answering 202 with its status location
pub async fn submit_job(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let started = Instant::now();
    let operation: Operation = operation
        .parse()
        .map_err(|_| ApiError::NotFound(format!("unknown operation '{}'", operation)))?;

    if body.iter().all(u8::is_ascii_whitespace) {
        tracing::warn!("Rejecting {} submission: empty body", operation);
        return Err(ApiError::BadRequest("body_empty".to_string()));
    }

    let submission = state
        .submitter
        .submit(operation, &body)
        .await
        .map_err(|e| ApiError::InternalError {
            message: "enqueue_failed".to_string(),
            detail: e.to_string(),
        })?;

    let job_id = submission.job_id.simple().to_string();
    let location = status_url(submission.operation, &job_id);

    tracing::info!(
        "Accepted {} job {} in {} ms",
        submission.operation,
        job_id,
        started.elapsed().as_millis()
    );

    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, location.clone())],
        Json(JobAccepted {
            job_id,
            operation: submission.operation,
            status_url: location,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{body_bytes, state};
    use ferry_store::{MemoryStore, QueueDepth, WorkQueue};
    use std::sync::Arc;

    async fn submit(store: &Arc<MemoryStore>, operation: &str, body: &'static [u8]) -> axum::response::Response {
        submit_job(
            State(state(store)),
            Path(operation.to_string()),
            Bytes::from_static(body),
        )
        .await
        .into_response()
    }

    #[tokio::test]
    async fn test_accepted_submission_points_at_status() {
        let store = Arc::new(MemoryStore::new());

        let response = submit(&store, "compile", br#"{"code":"print(1)"}"#).await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let location = response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string();

        let accepted: JobAccepted = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(accepted.operation, Operation::Compile);
        assert_eq!(accepted.job_id.len(), 32);
        assert_eq!(location, format!("/api/jobs/compile/{}", accepted.job_id));
        assert_eq!(accepted.status_url, location);
        assert_eq!(store.depth().await.unwrap().ready, 1);
    }

    #[tokio::test]
    async fn test_blank_body_is_rejected() {
        let store = Arc::new(MemoryStore::new());

        let response = submit(&store, "run", b"  \n").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["error"], "body_empty");
        assert_eq!(store.depth().await.unwrap(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_unknown_operation_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let response = submit(&store, "deploy", b"{}").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
