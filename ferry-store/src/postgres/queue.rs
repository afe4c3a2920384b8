//! Work queue on the `queue_messages` table
//!
//! Receiving a message pushes its `visible_at` into the future and stamps a
//! fresh receipt. Competing consumers skip rows locked by each other, so a
//! message is handed to one consumer at a time until its visibility lapses.

use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use super::{PgStore, db};
use crate::names::{JOBS_QUEUE, POISON_QUEUE};
use crate::{Delivery, QueueDepth, Result, StoreError, WorkQueue};

#[async_trait]
impl WorkQueue for PgStore {
    async fn ensure(&self) -> Result<()> {
        db::ensure_queue_table(&self.pool).await?;
        Ok(())
    }

    async fn send(&self, body: &[u8]) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO queue_messages (queue, body) VALUES ($1, $2) RETURNING id",
        )
        .bind(JOBS_QUEUE)
        .bind(body)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!("Enqueued message {} ({} bytes)", id, body.len());
        Ok(id)
    }

    async fn receive(&self, visibility: Duration) -> Result<Option<Delivery>> {
        let receipt = Uuid::new_v4();

        let row = sqlx::query_as::<_, (i64, Vec<u8>, i32)>(
            r#"
            UPDATE queue_messages
            SET visible_at = now() + make_interval(secs => $2),
                dequeue_count = dequeue_count + 1,
                receipt = $3
            WHERE id = (
                SELECT id FROM queue_messages
                WHERE queue = $1 AND visible_at <= now()
                ORDER BY id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, body, dequeue_count
            "#,
        )
        .bind(JOBS_QUEUE)
        .bind(visibility.as_secs_f64())
        .bind(receipt)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, body, dequeue_count)| Delivery {
            id,
            receipt,
            dequeue_count: u32::try_from(dequeue_count).unwrap_or(0),
            body,
        }))
    }

    async fn delete(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query("DELETE FROM queue_messages WHERE id = $1 AND receipt = $2")
            .bind(delivery.id)
            .bind(delivery.receipt)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(stale(delivery));
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE queue_messages
            SET queue = $1, visible_at = now(), receipt = NULL
            WHERE id = $2 AND receipt = $3
            "#,
        )
        .bind(POISON_QUEUE)
        .bind(delivery.id)
        .bind(delivery.receipt)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(stale(delivery));
        }
        Ok(())
    }

    async fn depth(&self) -> Result<QueueDepth> {
        let (ready, in_flight, poison) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE queue = $1 AND visible_at <= now()),
                COUNT(*) FILTER (WHERE queue = $1 AND visible_at > now()),
                COUNT(*) FILTER (WHERE queue = $2)
            FROM queue_messages
            "#,
        )
        .bind(JOBS_QUEUE)
        .bind(POISON_QUEUE)
        .fetch_one(&self.pool)
        .await?;

        Ok(QueueDepth {
            ready: ready.max(0) as u64,
            in_flight: in_flight.max(0) as u64,
            poison: poison.max(0) as u64,
        })
    }
}

fn stale(delivery: &Delivery) -> StoreError {
    StoreError::NotFound(format!(
        "message {} with receipt {}",
        delivery.id, delivery.receipt
    ))
}
