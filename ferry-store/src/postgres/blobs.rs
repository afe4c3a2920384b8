//! Blob storage on the `blobs` table

use async_trait::async_trait;

use super::{PgStore, db};
use crate::{BlobStore, Result, StoreError};

#[async_trait]
impl BlobStore for PgStore {
    async fn ensure_container(&self, container: &str) -> Result<()> {
        db::ensure_blob_tables(&self.pool).await?;

        sqlx::query("INSERT INTO blob_containers (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(container)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn put(&self, container: &str, name: &str, data: &[u8]) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO blobs (container, name, data, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (container, name)
            DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(container)
        .bind(name)
        .bind(data)
        .bind(chrono::Utc::now())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(err)) if err.is_foreign_key_violation() => {
                Err(StoreError::ContainerMissing(container.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn get(&self, container: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let data = sqlx::query_scalar::<_, Vec<u8>>(
            "SELECT data FROM blobs WHERE container = $1 AND name = $2",
        )
        .bind(container)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(data)
    }
}
