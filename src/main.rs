//! Collection Backup Tool
//!
//! Backs up every table of a PostgreSQL database to date-partitioned,
//! chunked JSON objects in S3 and reports chunk failures and per-table
//! summaries to an SQS work queue.

// collection-backup/src/main.rs
mod backup;
mod config;
mod errors;
mod utils;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run_app().await {
        Ok(_) => {
            tracing::info!("✅ Backup run completed.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<()> {
    // .env is optional; real deployments usually inject the environment
    if let Err(e) = dotenv::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let config_path = env::var("BACKUP_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));
    let app_config = AppConfig::load(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    tracing::info!(
        bucket = %app_config.storage.bucket_name,
        queue_url = %app_config.queue.queue_url,
        partitions = ?app_config.partitions,
        "🚀 Starting backup process"
    );

    let report = backup::run_backup_flow(&app_config).await;
    report.log_summary();

    if !report.connected {
        anyhow::bail!("Backup did not run: source database unreachable");
    }
    Ok(())
}
