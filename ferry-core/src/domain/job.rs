//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::operation::Operation;

/// Length of the backend session identity
pub const SESSION_ID_LEN: usize = 12;

/// Checkpoint labels written to [`JobRecord::last_step`]
pub mod steps {
    pub const ENQUEUED: &str = "Enqueued";
    pub const RUNNING: &str = "Running";
    pub const INPUT_LOADED: &str = "InputLoaded";
    pub const BACKEND_RESPONDED: &str = "BackendResponded";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const EXCEPTION: &str = "Exception";
}

/// Job execution status
///
/// Moves strictly forward: `Queued -> Running -> {Succeeded, Failed}`.
/// `Running -> Running` is allowed because a redelivered message restarts a
/// job whose previous worker died mid-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Running => "Running",
            JobStatus::Succeeded => "Succeeded",
            JobStatus::Failed => "Failed",
        }
    }

    /// Terminal states are absorbing
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match (self, next) {
            (JobStatus::Queued, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Running) => true,
            (JobStatus::Running, JobStatus::Succeeded | JobStatus::Failed) => true,
            // Failures before "mark running" still have to land somewhere.
            (JobStatus::Queued, JobStatus::Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(JobStatus::Queued),
            "Running" => Ok(JobStatus::Running),
            "Succeeded" => Ok(JobStatus::Succeeded),
            "Failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

/// The authoritative state of one job, keyed by `(operation, job_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub operation: Operation,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Stable per-job backend session identity
    pub session_id: String,
    /// Blob name of the persisted request body
    pub input_ref: String,
    /// Blob name of the persisted result, set only on success
    pub output_ref: Option<String>,

    /// Worker invocations that reached the "mark running" step
    pub attempts: u32,
    pub last_step: Option<String>,
    pub error_message: Option<String>,

    // Backend call diagnostics
    pub last_http_status: Option<u16>,
    pub last_content_type: Option<String>,
    pub last_snippet: Option<String>,
}

impl JobRecord {
    /// Builds the initial record the submitter writes for a fresh job
    pub fn queued(operation: Operation, job_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            operation,
            job_id,
            status: JobStatus::Queued,
            created_at: now,
            updated_at: now,
            session_id: session_id_for(&job_id),
            input_ref: blob_name(&job_id),
            output_ref: None,
            attempts: 0,
            last_step: Some(steps::ENQUEUED.to_string()),
            error_message: None,
            last_http_status: None,
            last_content_type: None,
            last_snippet: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advances `updated_at` without ever moving it backwards
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.updated_at {
            self.updated_at = now;
        }
    }

    /// Records a checkpoint label and bumps `updated_at`
    pub fn checkpoint(&mut self, step: &str, now: DateTime<Utc>) {
        self.last_step = Some(step.to_string());
        self.touch(now);
    }
}

/// Blob name used for both the input and the output of a job
pub fn blob_name(job_id: &Uuid) -> String {
    format!("{}.json", job_id.simple())
}

/// Derives the fixed-length backend session identity for a job.
///
/// `sess-` followed by the leading hex digits of the job id, truncated to
/// [`SESSION_ID_LEN`] characters.
pub fn session_id_for(job_id: &Uuid) -> String {
    let mut id = format!("sess-{}", job_id.simple());
    id.truncate(SESSION_ID_LEN);
    id
}
