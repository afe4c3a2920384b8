//! Ferry Worker
//!
//! Consumes the jobs queue and drives every job to a terminal state.
//!
//! Architecture:
//! - Configuration: storage target and consumer tuning from the environment
//! - Store: PostgreSQL-backed blobs, queue and job table
//! - Forwarder: authenticated, retrying client for the execution backend
//! - Consumer: bounded-parallel queue loop feeding the job worker

mod config;

use anyhow::{Context, Result};
use ferry_engine::{JobWorker, QueueConsumer, Stores};
use ferry_forwarder::Forwarder;
use ferry_store::PgStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ferry_worker=info,ferry_engine=info,ferry_forwarder=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Ferry Worker");

    let config = Config::from_env()?;
    config.validate()?;
    info!(
        "Loaded configuration: poll={:?}, visibility={:?}, max_dequeue={}, parallel={}",
        config.poll_interval,
        config.visibility_timeout,
        config.max_dequeue_count,
        config.max_parallel_jobs
    );

    let forwarder = Forwarder::from_env().context("Failed to build backend client")?;
    forwarder
        .config()
        .validate()
        .context("Invalid backend configuration")?;
    match &forwarder.config().endpoint {
        Some(endpoint) => info!("Forwarding to {}", endpoint),
        None => warn!("POOL_ENDPOINT is not set; every job will fail until it is configured"),
    }

    let store = connect_with_retry(&config.storage_connection).await?;
    let stores = Stores::shared(Arc::new(store));
    stores
        .ensure()
        .await
        .context("Failed to provision durable store")?;
    info!("Durable store ready");

    let worker = Arc::new(JobWorker::new(stores.clone(), Arc::new(forwarder)));
    let consumer = QueueConsumer::new(config.consumer(), stores.queue.clone(), worker);

    if let Err(e) = consumer.run(shutdown_signal()).await {
        error!("Consumer error: {:#}", e);
        return Err(e);
    }

    Ok(())
}

/// Connects to the store, retrying with exponential backoff.
///
/// The database is often still starting when the worker container comes up.
async fn connect_with_retry(url: &str) -> Result<PgStore> {
    const MAX_RETRIES: u32 = 10;
    const INITIAL_DELAY_MS: u64 = 500;
    const MAX_DELAY_MS: u64 = 30_000;

    let mut attempt = 0;
    let mut delay_ms = INITIAL_DELAY_MS;

    loop {
        attempt += 1;

        match PgStore::connect(url).await {
            Ok(store) => {
                if attempt > 1 {
                    info!("Connected to durable store after {} attempt(s)", attempt);
                }
                return Ok(store);
            }
            Err(e) => {
                if attempt >= MAX_RETRIES {
                    error!("Failed to connect to durable store after {} attempts", MAX_RETRIES);
                    return Err(anyhow::anyhow!("Failed to connect to durable store: {}", e));
                }

                warn!(
                    "Failed to connect to durable store (attempt {}/{}): {}",
                    attempt, MAX_RETRIES, e
                );
                warn!("Retrying in {} ms...", delay_ms);

                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}
