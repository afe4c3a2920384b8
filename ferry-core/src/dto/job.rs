//! Job DTOs for the intake and status boundaries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::job::{JobRecord, JobStatus};
use crate::domain::operation::Operation;

/// Path of the status resource for a job
pub fn status_url(operation: Operation, job_id: &str) -> String {
    format!("/api/jobs/{}/{}", operation, job_id)
}

/// Response to an accepted submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: String,
    pub operation: Operation,
    pub status_url: String,
}

/// Status body for everything except a materialized output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusBody {
    pub job_id: String,
    pub operation: Operation,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<JobDiagnostics>,
}

impl JobStatusBody {
    pub fn from_record(record: &JobRecord) -> Self {
        Self {
            job_id: record.job_id.simple().to_string(),
            operation: record.operation,
            status: record.status,
            error: None,
            output_ref: None,
            warning: None,
            diagnostics: None,
        }
    }
}

/// Checkpoint fields exposed when a caller asks for debug output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDiagnostics {
    pub attempts: u32,
    pub last_step: Option<String>,
    pub last_http_status: Option<u16>,
    pub last_content_type: Option<String>,
    pub last_snippet: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&JobRecord> for JobDiagnostics {
    fn from(record: &JobRecord) -> Self {
        Self {
            attempts: record.attempts,
            last_step: record.last_step.clone(),
            last_http_status: record.last_http_status,
            last_content_type: record.last_content_type.clone(),
            last_snippet: record.last_snippet.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
