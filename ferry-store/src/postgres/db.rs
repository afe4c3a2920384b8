use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    ensure_jobs_table(pool).await?;
    ensure_blob_tables(pool).await?;
    ensure_queue_table(pool).await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

pub async fn ensure_jobs_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            operation VARCHAR(32) NOT NULL,
            job_id UUID NOT NULL,
            status VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            session_id VARCHAR(64) NOT NULL,
            input_ref TEXT NOT NULL,
            output_ref TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_step TEXT,
            error_message TEXT,
            last_http_status INTEGER,
            last_content_type TEXT,
            last_snippet TEXT,
            version BIGINT NOT NULL DEFAULT 1,
            PRIMARY KEY (operation, job_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn ensure_blob_tables(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blob_containers (
            name VARCHAR(63) PRIMARY KEY,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS blobs (
            container VARCHAR(63) NOT NULL REFERENCES blob_containers(name),
            name TEXT NOT NULL,
            data BYTEA NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (container, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn ensure_queue_table(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS queue_messages (
            id BIGSERIAL PRIMARY KEY,
            queue VARCHAR(63) NOT NULL,
            body BYTEA NOT NULL,
            enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            visible_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            dequeue_count INTEGER NOT NULL DEFAULT 0,
            receipt UUID
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_queue_messages_ready ON queue_messages(queue, visible_at, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
