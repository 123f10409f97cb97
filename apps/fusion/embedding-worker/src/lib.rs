//! Embedding Worker Service
//!
//! A background worker that keeps incident embeddings backfilled.
//!
//! ## Architecture
//!
//! ```text
//! Incident seed file (INCIDENTS_PATH, optional)
//!   ↓
//! MemoryRecordStore
//!   ↓ (interval trigger, BACKFILL_INTERVAL_SECS)
//! EmbeddingService::process_missing
//!   ↓
//! OpenAIProvider or deterministic fallback
//! ```
//!
//! ## Features
//!
//! - Runs on a fixed interval until SIGINT/SIGTERM
//! - Graceful shutdown: trips the service cancel token so the in-flight
//!   sub-batch finishes before the loop exits
//! - Works without any remote provider configured

use core_config::{Environment, env_parse_or};
use domain_embedding::{
    EmbeddingService, IncidentRecord, MemoryRecordStore, OpenAIConfig, OpenAIProvider,
    PipelineConfig,
};
use eyre::{Result, WrapErr};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

/// Run the embedding worker
///
/// 1. Sets up structured logging (env-aware: JSON for prod, pretty for dev)
/// 2. Loads the pipeline configuration and optional OpenAI provider
/// 3. Seeds the record store from `INCIDENTS_PATH` when set
/// 4. Backfills missing embeddings on a fixed interval with graceful
///    shutdown handling
pub async fn run() -> Result<()> {
    core_config::tracing::install_color_eyre();
    let environment = Environment::from_env();
    core_config::tracing::init_tracing(&environment);

    info!(
        name = env!("CARGO_PKG_NAME"),
        version = env!("CARGO_PKG_VERSION"),
        "Starting embedding worker service"
    );
    info!("Environment: {:?}", environment);

    let pipeline = PipelineConfig::from_env();
    let interval_secs: u64 =
        env_parse_or("BACKFILL_INTERVAL_SECS", 300).wrap_err("Invalid backfill interval")?;

    let store = load_store().await?;
    info!(records = store.len(), "Record store ready");

    let mut service = EmbeddingService::with_config(store, pipeline.clone());
    if let Some(config) = OpenAIConfig::from_env() {
        let config = config.with_dimensions(pipeline.dimension as u32);
        service = service.with_provider(Arc::new(OpenAIProvider::new(config)));
    }

    service
        .hydrate_indexes()
        .await
        .wrap_err("Failed to hydrate vector indexes")?;

    // Set up a shutdown signal
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let cancel = service.cancel_token();

    tokio::spawn(async move {
        if let Err(e) = shutdown_signal().await {
            error!("Error waiting for shutdown signal: {}", e);
        }
        let _ = shutdown_tx.send(true);
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    info!(interval_secs, "Starting backfill loop");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match service.process_missing(None).await {
                    Ok(outcome) => {
                        info!(
                            processed = outcome.processed,
                            errors = outcome.errors,
                            "Backfill pass complete"
                        );
                    }
                    Err(e) => error!(error = %e, "Backfill pass failed"),
                }
            }
            _ = shutdown_rx.changed() => {
                // Let the in-flight sub-batch finish, then stop
                cancel.cancel();
                break;
            }
        }
    }

    match service.stats().await {
        Ok(stats) => info!(total = stats.total, "Embedding worker service stopped"),
        Err(e) => error!(error = %e, "Failed to read final stats"),
    }
    Ok(())
}

/// Seed the in-memory store from `INCIDENTS_PATH` (JSON array of records)
async fn load_store() -> Result<MemoryRecordStore> {
    let Ok(path) = std::env::var("INCIDENTS_PATH") else {
        info!("INCIDENTS_PATH not set; starting with an empty store");
        return Ok(MemoryRecordStore::new());
    };

    let raw = tokio::fs::read(&path)
        .await
        .wrap_err_with(|| format!("Failed to read incidents file {path}"))?;
    let records: Vec<IncidentRecord> =
        serde_json::from_slice(&raw).wrap_err_with(|| format!("Malformed incidents file {path}"))?;
    info!(path = %path, records = records.len(), "Loaded incident seed file");
    Ok(MemoryRecordStore::with_records(records))
}

/// Wait for a shutdown signal (SIGINT or SIGTERM)
async fn shutdown_signal() -> Result<()> {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        },
    }

    Ok(())
}
