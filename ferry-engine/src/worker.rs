//! Job Worker
//!
//! Runs once per queue delivery and is safe to run any number of times for
//! the same message:
//!
//! ```text
//! Queued --begin--> Running --2xx--> Succeeded
//!                           --non-2xx / error--> Failed
//! ```
//!
//! A delivery that finds a terminal record exits without side effects.
//! Only the "mark running" write is version-checked; every later write is
//! a blind overwrite so retries never fail on a stale version.

use anyhow::{Context, anyhow};
use chrono::Utc;
use ferry_core::domain::job::{JobRecord, JobStatus, blob_name, steps};
use ferry_core::domain::message::WorkMessage;
use ferry_core::domain::operation::Operation;
use ferry_core::text::{clip, clip_bytes};
use ferry_forwarder::{Backend, ForwardResponse};
use ferry_store::{StoreError, names};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::Stores;

/// Backend body characters kept in a failure summary
const ERROR_BODY_LIMIT: usize = 1000;

/// Characters of an exception chain kept on the record
const EXCEPTION_LIMIT: usize = 4000;

/// Backend body characters kept as the diagnostics snippet
const SNIPPET_LIMIT: usize = 400;

/// How a delivery ended when the message should be acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The job reached this terminal status during this delivery
    Completed(JobStatus),
    /// The job was already terminal; nothing was touched
    AlreadyTerminal,
    /// The message was unreadable and can never succeed
    Dropped,
}

/// Reasons to leave a message on the queue for redelivery
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("No job record for {operation}/{job_id}")]
    RecordMissing { operation: Operation, job_id: Uuid },

    #[error("Job {operation}/{job_id} was modified concurrently")]
    Contended { operation: Operation, job_id: Uuid },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub struct JobWorker {
    stores: Stores,
    backend: Arc<dyn Backend>,
}

impl JobWorker {
    pub fn new(stores: Stores, backend: Arc<dyn Backend>) -> Self {
        Self { stores, backend }
    }

    /// Processes one delivered message body
    pub async fn handle(&self, raw: &[u8]) -> Result<Outcome, WorkerError> {
        let message = match WorkMessage::from_bytes(raw) {
            Ok(message) => message,
            Err(e) => {
                warn!(
                    "Dropping unreadable work message ({} bytes): {} '{}'",
                    raw.len(),
                    e,
                    clip_bytes(raw, 200)
                );
                return Ok(Outcome::Dropped);
            }
        };

        let WorkMessage { operation, job_id } = message;
        let job = job_id.simple();

        let Some(current) = self.stores.jobs.get(operation, job_id).await? else {
            error!("Job record {}/{} not found for delivered message", operation, job);
            return Err(WorkerError::RecordMissing { operation, job_id });
        };

        if current.value.is_terminal() {
            info!(
                "Job {}/{} already {}, skipping delivery",
                operation, job, current.value.status
            );
            return Ok(Outcome::AlreadyTerminal);
        }

        let mut record = current.value;
        debug_assert!(record.status.can_transition_to(JobStatus::Running));
        record.status = JobStatus::Running;
        record.attempts += 1;
        record.checkpoint(steps::RUNNING, Utc::now());

        match self.stores.jobs.replace(&record, current.etag).await {
            Ok(_) => {
                info!(
                    "Job {}/{} running (attempt {}, session '{}')",
                    operation, job, record.attempts, record.session_id
                );
            }
            Err(e) if e.is_conflict() => return self.resolve_contention(operation, job_id).await,
            Err(e) => {
                let failure = anyhow::Error::new(e).context("Failed to mark job running");
                return self.record_exception(record, failure).await;
            }
        }

        let result = self.execute(&mut record).await;
        match result {
            Ok(status) => Ok(Outcome::Completed(status)),
            Err(e) => self.record_exception(record, e).await,
        }
    }

    /// Steps after "mark running": input, backend call, outcome
    async fn execute(&self, record: &mut JobRecord) -> anyhow::Result<JobStatus> {
        let input = self
            .stores
            .blobs
            .get(names::INPUT_CONTAINER, &record.input_ref)
            .await
            .context("Failed to read job input")?
            .ok_or_else(|| anyhow!("Input blob '{}' does not exist", record.input_ref))?;

        record.checkpoint(steps::INPUT_LOADED, Utc::now());
        self.save(record).await?;

        debug!(
            "Loaded input for {}/{} ({} bytes)",
            record.operation,
            record.job_id.simple(),
            input.len()
        );

        let response = self
            .backend
            .forward(record.operation, &input, &record.session_id)
            .await
            .context("Backend call failed")?;

        record.last_http_status = Some(response.status);
        record.last_content_type = Some(response.content_type.clone());
        record.last_snippet = Some(clip_bytes(&response.body, SNIPPET_LIMIT));
        record.checkpoint(steps::BACKEND_RESPONDED, Utc::now());
        self.save(record).await?;

        if response.is_success() {
            let name = blob_name(&record.job_id);
            let document = output_document(record.operation, &response)?;
            self.stores
                .blobs
                .put(names::OUTPUT_CONTAINER, &name, &document)
                .await
                .context("Failed to write job output")?;

            record.status = JobStatus::Succeeded;
            record.output_ref = Some(name);
            record.error_message = None;
            record.checkpoint(steps::SUCCEEDED, Utc::now());
        } else {
            record.status = JobStatus::Failed;
            record.error_message = Some(format!(
                "backend returned {}: {}",
                response.status,
                clip(&response.body_text(), ERROR_BODY_LIMIT)
            ));
            record.checkpoint(steps::FAILED, Utc::now());
        }
        self.save(record).await?;

        info!(
            "Job {}/{} {} (backend status {})",
            record.operation,
            record.job_id.simple(),
            record.status,
            response.status
        );

        Ok(record.status)
    }

    /// Marks the job failed with the error chain and acknowledges the
    /// delivery. Only a failure to persist that verdict is returned.
    async fn record_exception(
        &self,
        mut record: JobRecord,
        failure: anyhow::Error,
    ) -> Result<Outcome, WorkerError> {
        let detail = format!("{:#}", failure);
        error!(
            "Job {}/{} failed with exception: {}",
            record.operation,
            record.job_id.simple(),
            detail
        );

        record.status = JobStatus::Failed;
        record.error_message = Some(clip(&detail, EXCEPTION_LIMIT));
        record.checkpoint(steps::EXCEPTION, Utc::now());

        self.stores.jobs.upsert(&record).await?;
        Ok(Outcome::Completed(JobStatus::Failed))
    }

    /// Another writer won the "mark running" race
    async fn resolve_contention(
        &self,
        operation: Operation,
        job_id: Uuid,
    ) -> Result<Outcome, WorkerError> {
        match self.stores.jobs.get(operation, job_id).await? {
            Some(latest) if latest.value.is_terminal() => {
                info!(
                    "Job {}/{} finished concurrently as {}",
                    operation,
                    job_id.simple(),
                    latest.value.status
                );
                Ok(Outcome::AlreadyTerminal)
            }
            Some(_) => {
                warn!(
                    "Job {}/{} is being worked on elsewhere, leaving message for redelivery",
                    operation,
                    job_id.simple()
                );
                Err(WorkerError::Contended { operation, job_id })
            }
            None => Err(WorkerError::RecordMissing { operation, job_id }),
        }
    }

    async fn save(&self, record: &JobRecord) -> anyhow::Result<()> {
        self.stores
            .jobs
            .upsert(record)
            .await
            .with_context(|| format!("Failed to save checkpoint '{}'", step_of(record)))?;
        Ok(())
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn step_of(record: &JobRecord) -> &str {
    record.last_step.as_deref().unwrap_or("-")
}

/// Whether a content type denotes a JSON document
pub fn is_json_content_type(content_type: &str) -> bool {
    let media = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    media == "application/json" || media.ends_with("+json")
}

/// The bytes stored as job output.
///
/// JSON bodies are kept verbatim; anything else is wrapped so the output
/// blob is always a JSON document.
fn output_document(operation: Operation, response: &ForwardResponse) -> anyhow::Result<Vec<u8>> {
    if is_json_content_type(&response.content_type) {
        return Ok(response.body.clone());
    }

    let envelope = json!({
        "operation": operation,
        "ok": true,
        "contentType": response.content_type,
        "body": response.body_text(),
    });
    serde_json::to_vec(&envelope).context("Failed to encode output envelope")
}
