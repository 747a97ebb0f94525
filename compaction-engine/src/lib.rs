// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Incremental compaction of raw candle records into parquet partitions.
//!
//! Each run reads the watermark, plans the day partitions that may hold
//! new data, streams and normalizes raw records above the watermark,
//! writes one parquet object per output partition, and advances the
//! watermark only after every write has landed.

pub mod partition;
pub mod planner;
pub mod reader;
pub mod watermark;
pub mod writer;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use core_types::{AppConfig, CompactedRecord};
use futures::StreamExt;
use log::{info, warn};
use metrics::Metrics;
use raw_store::{symbol_base_path, ObjectStore, StoreError};
use thiserror::Error;

pub use partition::derive_partition;
pub use planner::PartitionPlanner;
pub use reader::read_incremental;
pub use watermark::{WatermarkError, WatermarkStore};
pub use writer::ParquetPartitionWriter;

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("compaction config: {0}")]
    Config(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
    #[error(transparent)]
    Watermark(#[from] WatermarkError),
}

/// Outcome of a single compaction run.
#[derive(Debug, Default)]
pub struct CompactionSummary {
    pub partitions_planned: usize,
    pub rows_written: usize,
    pub objects_written: Vec<String>,
    pub watermark: i64,
}

pub struct CompactionEngine {
    store: Arc<dyn ObjectStore>,
    base_paths: Vec<String>,
    planner: PartitionPlanner,
    writer: ParquetPartitionWriter,
    watermark: WatermarkStore,
    metrics: Option<Arc<Metrics>>,
}

impl CompactionEngine {
    pub fn new(store: Arc<dyn ObjectStore>, config: &AppConfig) -> Self {
        let base_paths = config
            .symbols
            .iter()
            .map(|symbol| symbol_base_path(&config.storage.raw_dataset, symbol))
            .collect();
        let planner = PartitionPlanner::new(config.compaction.bootstrap_start_date);
        let writer =
            ParquetPartitionWriter::new(Arc::clone(&store), config.compaction.output_root.clone());
        let watermark =
            WatermarkStore::new(Arc::clone(&store), config.compaction.watermark_key.clone());
        Self {
            store,
            base_paths,
            planner,
            writer,
            watermark,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// One full read/transform/write/advance cycle. `now` bounds the
    /// partition plan; passing it in keeps runs reproducible in tests.
    ///
    /// A run that finds no new rows leaves the watermark untouched and
    /// writes nothing.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<CompactionSummary, CompactionError> {
        let last_open_time = self.watermark.read().await?;
        let partitions = self.planner.plan(&self.base_paths, last_open_time, now)?;
        let partitions_planned = partitions.len();
        if let Some(m) = &self.metrics {
            m.set_partitions_planned(partitions_planned as i64);
        }

        let mut stream = read_incremental(
            Arc::clone(&self.store),
            partitions,
            last_open_time,
            self.metrics.clone(),
        );
        let mut records: Vec<CompactedRecord> = Vec::new();
        while let Some(item) = stream.next().await {
            records.push(item?);
        }

        if records.is_empty() {
            info!("compaction run found no new rows above watermark {last_open_time}");
            if let Some(m) = &self.metrics {
                m.inc_compaction_runs();
            }
            return Ok(CompactionSummary {
                partitions_planned,
                watermark: last_open_time,
                ..Default::default()
            });
        }

        let new_watermark = records
            .iter()
            .map(|r| r.open_time)
            .max()
            .unwrap_or(last_open_time);
        let run_id = now.timestamp_millis();
        let objects_written = self.writer.write_run(&records, run_id).await?;

        // Advance only after every object has landed; a crash before this
        // point just reprocesses the same rows next run.
        if let Err(err) = self.watermark.advance(last_open_time, new_watermark).await {
            if matches!(err, WatermarkError::Conflict { .. }) {
                warn!("another run advanced the watermark first; run_id {run_id} output is stale: {err}");
            }
            return Err(err.into());
        }

        if let Some(m) = &self.metrics {
            m.add_compaction_rows_written(records.len() as u64);
            m.set_watermark_ms(new_watermark);
            m.inc_compaction_runs();
        }
        info!(
            "compaction run complete: {} rows, {} objects, watermark {} -> {}",
            records.len(),
            objects_written.len(),
            last_open_time,
            new_watermark
        );
        Ok(CompactionSummary {
            partitions_planned,
            rows_written: records.len(),
            objects_written,
            watermark: new_watermark,
        })
    }
}
