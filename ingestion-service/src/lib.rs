// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Ingestion pass: one invocation fetches the latest kline per
//! configured symbol and writes it to the raw store under its
//! idempotent key. Per-symbol failures are isolated; only configuration
//! problems (caught at startup) are fatal to an invocation.

mod record;

pub use record::build_record;

use async_trait::async_trait;
use binance_source::{BinanceSource, FetchError, KlineSample};
use chrono::Utc;
use core_types::AppConfig;
use log::{error, info};
use metrics::Metrics;
use raw_store::RawStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source seam so the ingestion loop can be driven by a scripted fake
/// in tests.
#[async_trait]
pub trait KlineFetcher: Send + Sync + 'static {
    async fn fetch_latest(&self, symbol: &str, interval: &str)
        -> Result<KlineSample, FetchError>;
}

#[async_trait]
impl KlineFetcher for BinanceSource {
    async fn fetch_latest(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<KlineSample, FetchError> {
        BinanceSource::fetch_latest(self, symbol, interval).await
    }
}

/// Opaque trigger payload from the scheduler.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerEvent {
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvocationResponse {
    pub status: String,
    pub ingested: Vec<String>,
    pub invoked_at: String,
}

pub struct IngestionService {
    source: Arc<dyn KlineFetcher>,
    raw_store: RawStore,
    metrics: Arc<Metrics>,
    exchange: String,
    symbols: Vec<String>,
    interval: String,
}

impl IngestionService {
    pub fn new(
        source: Arc<dyn KlineFetcher>,
        raw_store: RawStore,
        metrics: Arc<Metrics>,
        config: &AppConfig,
    ) -> Self {
        Self {
            source,
            raw_store,
            metrics,
            exchange: config.exchange.clone(),
            symbols: config.symbols.clone(),
            interval: config.interval.clone(),
        }
    }

    /// Runs one ingestion pass. A fetch or write failure for one symbol
    /// is logged and skipped; the remaining symbols still run, and the
    /// response lists only the keys that were durably written.
    pub async fn handle(&self, trigger: TriggerEvent) -> InvocationResponse {
        info!(
            "ingestion pass started trigger={:?} symbols={}",
            trigger.source,
            self.symbols.len()
        );
        let mut ingested = Vec::new();
        for symbol in &self.symbols {
            let sample = match self.source.fetch_latest(symbol, &self.interval).await {
                Ok(sample) => sample,
                Err(err) => {
                    error!("fetch failed symbol={symbol}: {err}");
                    self.metrics.inc_fetch_errors();
                    continue;
                }
            };
            self.metrics.inc_klines_fetched();
            let record = build_record(&sample, &self.exchange, symbol, &self.interval);
            match self.raw_store.put_record(&record).await {
                Ok(key) => {
                    info!(
                        "ingested kline symbol={symbol} event_time={} key={key}",
                        record.event_time
                    );
                    self.metrics.inc_raw_records_written();
                    ingested.push(key);
                }
                Err(err) => {
                    error!("raw write failed symbol={symbol}: {err}");
                    self.metrics.inc_raw_write_errors();
                }
            }
        }
        info!("ingestion pass completed ingested={}", ingested.len());
        InvocationResponse {
            status: "SUCCESS".to_string(),
            ingested,
            invoked_at: Utc::now().to_rfc3339(),
        }
    }
}
