//! Job Status Reader
//!
//! Read-only view of a job for polling clients.

use ferry_core::domain::job::JobStatus;
use ferry_core::domain::operation::Operation;
use ferry_core::dto::job::{JobDiagnostics, JobStatusBody};
use ferry_store::{StoreError, names};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::Stores;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("Job {operation}/{job_id} not found")]
    NotFound { operation: Operation, job_id: Uuid },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Caller-controlled parts of a status read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusQuery {
    /// Return the stored output instead of metadata for succeeded jobs
    pub include_output: bool,
    /// Attach checkpoint diagnostics to metadata responses
    pub debug: bool,
}

impl Default for StatusQuery {
    fn default() -> Self {
        Self {
            include_output: true,
            debug: false,
        }
    }
}

/// What a client gets to see of a job
#[derive(Debug, Clone, PartialEq)]
pub enum JobView {
    /// Queued or running
    Pending(JobStatusBody),
    /// Failed, with the error summary
    Failed(JobStatusBody),
    /// Succeeded, metadata only
    Succeeded(JobStatusBody),
    /// Succeeded, the stored output document
    Output { content_type: String, body: Vec<u8> },
    /// Succeeded, but the output could not be read
    Degraded(JobStatusBody),
}

impl JobView {
    /// Whether the job has finished
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobView::Pending(_))
    }
}

pub struct JobStatusReader {
    stores: Stores,
}

impl JobStatusReader {
    pub fn new(stores: Stores) -> Self {
        Self { stores }
    }

    pub async fn get_status(
        &self,
        operation: Operation,
        job_id: Uuid,
        query: StatusQuery,
    ) -> Result<JobView, StatusError> {
        let record = self
            .stores
            .jobs
            .get(operation, job_id)
            .await?
            .ok_or(StatusError::NotFound { operation, job_id })?
            .value;

        debug!(
            "Status read {}/{}: {} (step {:?})",
            operation,
            job_id.simple(),
            record.status,
            record.last_step
        );

        let mut body = JobStatusBody::from_record(&record);
        if query.debug {
            body.diagnostics = Some(JobDiagnostics::from(&record));
        }

        let view = match record.status {
            JobStatus::Queued | JobStatus::Running => JobView::Pending(body),
            JobStatus::Failed => {
                body.error = record.error_message.clone();
                JobView::Failed(body)
            }
            JobStatus::Succeeded => {
                body.output_ref = record.output_ref.clone();
                if !query.include_output {
                    return Ok(JobView::Succeeded(body));
                }

                let Some(name) = record.output_ref.as_deref() else {
                    body.warning = Some("output reference missing".to_string());
                    return Ok(JobView::Degraded(body));
                };

                match self.stores.blobs.get(names::OUTPUT_CONTAINER, name).await {
                    Ok(Some(output)) => JobView::Output {
                        content_type: "application/json".to_string(),
                        body: output,
                    },
                    Ok(None) => {
                        warn!("Output blob '{}' missing for succeeded job", name);
                        body.warning = Some(format!("output '{}' not found", name));
                        JobView::Degraded(body)
                    }
                    Err(e) => {
                        warn!("Output blob '{}' unreadable: {}", name, e);
                        body.warning = Some(format!("output unavailable: {}", e));
                        JobView::Degraded(body)
                    }
                }
            }
        };

        Ok(view)
    }
}
