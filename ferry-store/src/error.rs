//! Error types for the durable store

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by any durable store backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record, blob or message does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A version-checked write lost against a concurrent writer, or an
    /// insert hit an existing key
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A blob was written to a container that was never created
    #[error("Container '{0}' does not exist")]
    ContainerMissing(String),

    /// Stored data could not be mapped back to domain types
    #[error("Corrupt data: {0}")]
    Corrupt(String),

    /// Underlying database failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
