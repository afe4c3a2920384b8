//! Ferry Durable Store
//!
//! Storage seams used by the job lifecycle engine:
//! - [`BlobStore`]: key-addressed payloads (job input and output)
//! - [`WorkQueue`]: at-least-once work items with a poison path
//! - [`JobTable`]: job records keyed by `(operation, job_id)`
//!
//! Two backends are provided: [`MemoryStore`] for tests and local runs, and
//! [`PgStore`] on PostgreSQL for deployments.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use ferry_core::domain::job::JobRecord;
use ferry_core::domain::operation::Operation;
use std::time::Duration;
use uuid::Uuid;

/// Resource names shared by every deployment
pub mod names {
    pub const JOBS_QUEUE: &str = "jobs";
    pub const POISON_QUEUE: &str = "jobs-poison";
    pub const JOBS_TABLE: &str = "Jobs";
    pub const INPUT_CONTAINER: &str = "job-input";
    pub const OUTPUT_CONTAINER: &str = "job-output";
}

// =============================================================================
// Shared Types
// =============================================================================

/// Opaque version tag returned by every record write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ETag(pub i64);

/// A value together with the version it was read at
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub etag: ETag,
}

/// One delivery of a queue message.
///
/// The receipt identifies this particular delivery; once the visibility
/// timeout lapses the message is handed out again with a new receipt and
/// the old one stops working.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub id: i64,
    pub receipt: Uuid,
    /// Number of times the message has been received, including this one
    pub dequeue_count: u32,
    pub body: Vec<u8>,
}

/// Approximate queue counts for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepth {
    pub ready: u64,
    pub in_flight: u64,
    pub poison: u64,
}

// =============================================================================
// Store Traits
// =============================================================================

/// Key-addressed blob storage grouped in containers
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Creates the container if it does not exist yet
    async fn ensure_container(&self, container: &str) -> Result<()>;

    /// Writes a blob, overwriting any previous content
    async fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<()>;

    /// Reads a blob, `None` if it does not exist
    async fn get(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>>;
}

/// The jobs work queue
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Creates the queue (and its poison queue) if needed
    async fn ensure(&self) -> Result<()>;

    /// Appends a message and returns its id
    async fn send(&self, body: &[u8]) -> Result<i64>;

    /// Receives the oldest visible message and hides it for `visibility`
    async fn receive(&self, visibility: Duration) -> Result<Option<Delivery>>;

    /// Acknowledges a delivery, removing the message for good
    async fn delete(&self, delivery: &Delivery) -> Result<()>;

    /// Moves a delivered message to the poison queue
    async fn dead_letter(&self, delivery: &Delivery) -> Result<()>;

    async fn depth(&self) -> Result<QueueDepth>;
}

/// Job record table keyed by `(operation, job_id)`
#[async_trait]
pub trait JobTable: Send + Sync {
    /// Creates the table if needed
    async fn ensure(&self) -> Result<()>;

    /// Inserts a new record; [`StoreError::Conflict`] if the key exists
    async fn insert(&self, record: &JobRecord) -> Result<ETag>;

    async fn get(&self, operation: Operation, job_id: Uuid) -> Result<Option<Versioned<JobRecord>>>;

    /// Version-checked replace; [`StoreError::Conflict`] when `etag` is stale
    async fn replace(&self, record: &JobRecord, etag: ETag) -> Result<ETag>;

    /// Unconditional last-writer-wins overwrite
    async fn upsert(&self, record: &JobRecord) -> Result<ETag>;
}
