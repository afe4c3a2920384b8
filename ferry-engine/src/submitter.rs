//! Job Submitter
//!
//! Turns an intake request into a durable job. The write order is fixed:
//! input blob, then job record, then work message. A worker that receives a
//! message can therefore always resolve both the record and the input, and
//! a failure part-way through never leaves a message pointing at nothing.

use chrono::Utc;
use ferry_core::domain::job::JobRecord;
use ferry_core::domain::message::WorkMessage;
use ferry_core::domain::operation::Operation;
use ferry_core::text::{clip_bytes, correlation_id};
use ferry_store::{StoreError, names};
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::Stores;

/// Intake bodies are logged up to this many characters
const INTAKE_SNIPPET: usize = 300;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Failed to provision storage: {0}")]
    Provision(#[source] StoreError),

    #[error("Failed to upload job input: {0}")]
    Input(#[source] StoreError),

    #[error("Failed to create job record: {0}")]
    Record(#[source] StoreError),

    #[error("Failed to encode work message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to enqueue job: {0}")]
    Enqueue(#[source] StoreError),
}

/// An accepted job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub job_id: Uuid,
    pub operation: Operation,
}

pub struct JobSubmitter {
    stores: Stores,
}

impl JobSubmitter {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    /// Persists `body` as a new queued job for `operation` and enqueues it
    pub async fn submit(
        &self,
        operation: Operation,
        body: &[u8],
    ) -> Result<Submission, SubmitError> {
        let corr = correlation_id();
        let job_id = Uuid::new_v4();
        let record = JobRecord::queued(operation, job_id, Utc::now());

        info!(
            "Submitting {} job {} (corr {}, session '{}', {} bytes)",
            operation,
            job_id.simple(),
            corr,
            record.session_id,
            body.len()
        );
        debug!(
            "Intake body (corr {}): '{}'",
            corr,
            clip_bytes(body, INTAKE_SNIPPET)
        );

        self.stores.ensure().await.map_err(|e| {
            error!("Storage provisioning failed (corr {}): {}", corr, e);
            SubmitError::Provision(e)
        })?;

        self.stores
            .blobs
            .put(names::INPUT_CONTAINER, &record.input_ref, body)
            .await
            .map_err(|e| {
                error!("Input upload failed (corr {}): {}", corr, e);
                SubmitError::Input(e)
            })?;

        self.stores.jobs.insert(&record).await.map_err(|e| {
            error!("Record insert failed (corr {}): {}", corr, e);
            SubmitError::Record(e)
        })?;

        let message = WorkMessage::new(operation, job_id).to_bytes()?;
        let message_id = self.stores.queue.send(&message).await.map_err(|e| {
            error!("Enqueue failed (corr {}): {}", corr, e);
            SubmitError::Enqueue(e)
        })?;

        info!(
            "Enqueued {} job {} as message {} (corr {})",
            operation,
            job_id.simple(),
            message_id,
            corr
        );

        Ok(Submission { job_id, operation })
    }
}
