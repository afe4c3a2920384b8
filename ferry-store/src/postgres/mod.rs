//! PostgreSQL durable store
//!
//! Records, blobs and queue messages all live in one database. Tables are
//! created idempotently by [`db::run_migrations`] or by the individual
//! `ensure` calls on each trait.

pub mod db;
mod blobs;
mod jobs;
mod queue;

use sqlx::PgPool;

/// Durable store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects, runs migrations and returns a ready store
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = db::create_pool(database_url).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
