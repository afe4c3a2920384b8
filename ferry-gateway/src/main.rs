//! Ferry Gateway
//!
//! HTTP front door of the job pipeline: accepts submissions, serves job
//! status, and exposes health and diagnostics endpoints. No backend work
//! happens here; jobs are picked up by `ferry-worker`.

use anyhow::{Context, Result};
use ferry_engine::Stores;
use ferry_forwarder::Forwarder;
use ferry_store::PgStore;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod config;

use crate::api::AppState;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ferry_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Ferry Gateway...");

    let config = Config::from_env()?;
    config.validate()?;

    let forwarder = Forwarder::from_env().context("Failed to build backend client")?;
    if forwarder.config().endpoint.is_none() {
        tracing::warn!("POOL_ENDPOINT is not set; jobs will fail until it is configured");
    }

    tracing::info!("Connecting to durable store...");

    let store = PgStore::connect(&config.storage_connection)
        .await
        .context("Failed to connect to durable store")?;
    let stores = Stores::shared(Arc::new(store));
    stores
        .ensure()
        .await
        .context("Failed to provision durable store")?;

    tracing::info!("Durable store ready");

    let app = api::create_router(AppState::new(stores, forwarder));

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
