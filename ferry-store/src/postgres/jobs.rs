//! Job records on the `jobs` table

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::domain::job::JobRecord;
use ferry_core::domain::operation::Operation;
use sqlx::Postgres;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryScalar;
use uuid::Uuid;

use super::{PgStore, db};
use crate::{ETag, JobTable, Result, StoreError, Versioned};

type VersionQuery<'q> = QueryScalar<'q, Postgres, i64, PgArguments>;

const COLUMNS: &str = "operation, job_id, status, created_at, updated_at, session_id, input_ref, \
     output_ref, attempts, last_step, error_message, last_http_status, last_content_type, \
     last_snippet";

#[async_trait]
impl JobTable for PgStore {
    async fn ensure(&self) -> Result<()> {
        db::ensure_jobs_table(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, record: &JobRecord) -> Result<ETag> {
        let sql = format!(
            r#"
            INSERT INTO jobs ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT DO NOTHING
            RETURNING version
            "#
        );

        let version = bind_record(sqlx::query_scalar(&sql), record)
            .fetch_optional(&self.pool)
            .await?;

        version.map(ETag).ok_or_else(|| {
            StoreError::Conflict(format!(
                "job {}/{} already exists",
                record.operation, record.job_id
            ))
        })
    }

    async fn get(&self, operation: Operation, job_id: Uuid) -> Result<Option<Versioned<JobRecord>>> {
        let sql = format!(
            "SELECT {COLUMNS}, version FROM jobs WHERE operation = $1 AND job_id = $2"
        );

        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(operation.as_str())
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Versioned::try_from).transpose()
    }

    async fn replace(&self, record: &JobRecord, etag: ETag) -> Result<ETag> {
        let version = bind_record(
            sqlx::query_scalar(
                r#"
                UPDATE jobs
                SET status = $3, created_at = $4, updated_at = $5, session_id = $6,
                    input_ref = $7, output_ref = $8, attempts = $9, last_step = $10,
                    error_message = $11, last_http_status = $12, last_content_type = $13,
                    last_snippet = $14, version = version + 1
                WHERE operation = $1 AND job_id = $2 AND version = $15
                RETURNING version
                "#,
            ),
            record,
        )
        .bind(etag.0)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = version {
            return Ok(ETag(version));
        }

        // Distinguish a lost race from a missing row.
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT version FROM jobs WHERE operation = $1 AND job_id = $2",
        )
        .bind(record.operation.as_str())
        .bind(record.job_id)
        .fetch_optional(&self.pool)
        .await?;

        match exists {
            Some(_) => Err(StoreError::Conflict(format!(
                "job {}/{} changed since it was read",
                record.operation, record.job_id
            ))),
            None => Err(StoreError::NotFound(format!(
                "job {}/{}",
                record.operation, record.job_id
            ))),
        }
    }

    async fn upsert(&self, record: &JobRecord) -> Result<ETag> {
        let sql = format!(
            r#"
            INSERT INTO jobs ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (operation, job_id) DO UPDATE
            SET status = EXCLUDED.status,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at,
                session_id = EXCLUDED.session_id,
                input_ref = EXCLUDED.input_ref,
                output_ref = EXCLUDED.output_ref,
                attempts = EXCLUDED.attempts,
                last_step = EXCLUDED.last_step,
                error_message = EXCLUDED.error_message,
                last_http_status = EXCLUDED.last_http_status,
                last_content_type = EXCLUDED.last_content_type,
                last_snippet = EXCLUDED.last_snippet,
                version = jobs.version + 1
            RETURNING version
            "#
        );

        let version = bind_record(sqlx::query_scalar(&sql), record)
            .fetch_one(&self.pool)
            .await?;

        Ok(ETag(version))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Binds the record columns as `$1..$14` in [`COLUMNS`] order
fn bind_record<'q>(query: VersionQuery<'q>, record: &'q JobRecord) -> VersionQuery<'q> {
    query
        .bind(record.operation.as_str())
        .bind(record.job_id)
        .bind(record.status.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(record.session_id.as_str())
        .bind(record.input_ref.as_str())
        .bind(record.output_ref.as_deref())
        .bind(i32::try_from(record.attempts).unwrap_or(i32::MAX))
        .bind(record.last_step.as_deref())
        .bind(record.error_message.as_deref())
        .bind(record.last_http_status.map(i32::from))
        .bind(record.last_content_type.as_deref())
        .bind(record.last_snippet.as_deref())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    operation: String,
    job_id: Uuid,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    session_id: String,
    input_ref: String,
    output_ref: Option<String>,
    attempts: i32,
    last_step: Option<String>,
    error_message: Option<String>,
    last_http_status: Option<i32>,
    last_content_type: Option<String>,
    last_snippet: Option<String>,
    version: i64,
}

impl TryFrom<JobRow> for Versioned<JobRecord> {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self> {
        let operation = row
            .operation
            .parse::<Operation>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let status = row.status.parse().map_err(StoreError::Corrupt)?;

        let record = JobRecord {
            operation,
            job_id: row.job_id,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
            session_id: row.session_id,
            input_ref: row.input_ref,
            output_ref: row.output_ref,
            attempts: u32::try_from(row.attempts).unwrap_or(0),
            last_step: row.last_step,
            error_message: row.error_message,
            last_http_status: row.last_http_status.and_then(|s| u16::try_from(s).ok()),
            last_content_type: row.last_content_type,
            last_snippet: row.last_snippet,
        };

        Ok(Versioned {
            value: record,
            etag: ETag(row.version),
        })
    }
}
