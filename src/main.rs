//! LDES fragmentation server
//!
//! Runs the bucketizer and paginator workers side by side until Ctrl-C.
//!
//! Usage: `ldes-server [config.toml]`. Without a path the default locations
//! are searched; `LDES_*` environment variables override either.

use ldes_server::config::Config;
use ldes_server::logging::init_tracing;
use ldes_server::storage::Database;
use ldes_server::worker::run_worker;
use ldes_server::{BucketPaginator, MemberBucketizer};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => Config::load_with_env(&path)?,
        None => Config::load_default(),
    };
    init_tracing(&config.logging);

    tracing::info!("Starting LDES server v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::from_config(&config.storage);
    db.initialize()?;
    tracing::info!(path = ?db.path(), "Database ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut handles = Vec::new();

    if config.bucketizer.enabled {
        let worker = Arc::new(MemberBucketizer::from_config(
            db.clone(),
            &config.storage,
            &config.bucketizer,
        ));
        handles.push(tokio::spawn(run_worker(
            worker,
            config.bucketizer.loop_delay(),
            shutdown_rx.clone(),
        )));
    }

    if config.paginator.enabled {
        let worker = Arc::new(BucketPaginator::from_config(
            db.clone(),
            &config.storage,
            &config.paginator,
        ));
        handles.push(tokio::spawn(run_worker(
            worker,
            config.paginator.loop_delay(),
            shutdown_rx.clone(),
        )));
    }

    if handles.is_empty() {
        tracing::warn!("Both workers are disabled, nothing to do");
        return Ok(());
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down, waiting for in-flight ticks");
    // receivers may already be gone when every worker was one-shot
    let _ = shutdown_tx.send(true);

    for handle in handles {
        match handle.await {
            Ok(report) => tracing::info!(
                ticks = report.ticks,
                members = report.members,
                aborted = report.aborted,
                failed = report.failed,
                "Worker finished"
            ),
            Err(e) => tracing::error!(error = %e, "Worker task panicked"),
        }
    }

    tracing::info!("LDES server shutdown complete");
    Ok(())
}
