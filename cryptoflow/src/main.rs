// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::{env, process, sync::Arc};

use binance_source::{BinanceSource, FetchError};
use chrono::Utc;
use compaction_engine::{CompactionEngine, CompactionError};
use config::ConfigError;
use core_types::AppConfig;
use ingestion_service::{IngestionService, TriggerEvent};
use log::{info, warn};
use metrics::Metrics;
use raw_store::{FsObjectStore, ObjectStore, RawStore, S3ObjectStore};
use thiserror::Error;
use tokio::net::TcpListener;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("cryptoflow failed: {err}");
        process::exit(1);
    }
}

#[derive(Debug, Error)]
enum AppError {
    #[error("usage: cryptoflow <ingest|compact>")]
    Usage,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Compaction(#[from] CompactionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("response serialization: {0}")]
    Serialize(#[from] serde_json::Error),
}

enum Command {
    Ingest,
    Compact,
}

fn parse_command() -> Result<Command, AppError> {
    match env::args().nth(1).as_deref() {
        Some("ingest") => Ok(Command::Ingest),
        Some("compact") => Ok(Command::Compact),
        _ => Err(AppError::Usage),
    }
}

fn build_store(config: &AppConfig) -> Arc<dyn ObjectStore> {
    match config.storage.backend.as_str() {
        "s3" => Arc::new(S3ObjectStore::new(&config.storage)),
        _ => Arc::new(FsObjectStore::new(config.storage.fs_root.clone())),
    }
}

#[tokio::main]
async fn run() -> Result<(), AppError> {
    let command = parse_command()?;
    let config = AppConfig::load()?;
    info!(
        "cryptoflow starting: backend={} symbols={} interval={}",
        config.storage.backend,
        config.symbols.len(),
        config.interval
    );

    let metrics = Arc::new(Metrics::new());
    match TcpListener::bind(&config.metrics_addr).await {
        Ok(listener) => {
            let metrics = Arc::clone(&metrics);
            info!("metrics exporter listening on {}", config.metrics_addr);
            tokio::spawn(async move {
                if let Err(err) = metrics.serve(listener).await {
                    warn!("metrics exporter stopped: {err}");
                }
            });
        }
        Err(err) => warn!("metrics exporter disabled ({}): {err}", config.metrics_addr),
    }

    let store = build_store(&config);
    match command {
        Command::Ingest => {
            let source = Arc::new(BinanceSource::new(config.rest_base_url.clone())?);
            let raw_store = RawStore::new(Arc::clone(&store), &config.storage.raw_dataset);
            let service = IngestionService::new(source, raw_store, Arc::clone(&metrics), &config);
            let response = service
                .handle(TriggerEvent {
                    source: Some("cli".to_string()),
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Compact => {
            let engine =
                CompactionEngine::new(Arc::clone(&store), &config).with_metrics(Arc::clone(&metrics));
            let summary = engine.run_once(Utc::now()).await?;
            info!(
                "compacted {} rows into {} objects, watermark {}",
                summary.rows_written,
                summary.objects_written.len(),
                summary.watermark
            );
        }
    }
    Ok(())
}
