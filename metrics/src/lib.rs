// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Prometheus metrics for the ingestion and compaction pipelines, with
//! a hyper v1 text-format exporter.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct Metrics {
    registry: Registry,
    klines_fetched: IntCounter,
    fetch_errors: IntCounter,
    raw_records_written: IntCounter,
    raw_write_errors: IntCounter,
    compaction_rows_read: IntCounter,
    compaction_rows_dropped: IntCounter,
    compaction_rows_written: IntCounter,
    compaction_runs: IntCounter,
    watermark_ms: IntGauge,
    partitions_planned: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let klines_fetched =
            IntCounter::new("klines_fetched_total", "Klines fetched from the exchange").unwrap();
        let fetch_errors =
            IntCounter::new("fetch_errors_total", "Per-symbol kline fetch failures").unwrap();
        let raw_records_written =
            IntCounter::new("raw_records_written_total", "Raw records written to bronze").unwrap();
        let raw_write_errors =
            IntCounter::new("raw_write_errors_total", "Raw record write failures").unwrap();
        let compaction_rows_read = IntCounter::new(
            "compaction_rows_read_total",
            "Raw records read during compaction",
        )
        .unwrap();
        let compaction_rows_dropped = IntCounter::new(
            "compaction_rows_dropped_total",
            "Malformed records dropped during compaction",
        )
        .unwrap();
        let compaction_rows_written = IntCounter::new(
            "compaction_rows_written_total",
            "Normalized records written to silver",
        )
        .unwrap();
        let compaction_runs =
            IntCounter::new("compaction_runs_total", "Completed compaction runs").unwrap();
        let watermark_ms = IntGauge::new(
            "watermark_open_time_ms",
            "Persisted watermark (max processed open_time, epoch ms)",
        )
        .unwrap();
        let partitions_planned = IntGauge::new(
            "partitions_planned",
            "Day partitions enumerated by the last planning pass",
        )
        .unwrap();
        for collector in [
            &klines_fetched,
            &fetch_errors,
            &raw_records_written,
            &raw_write_errors,
            &compaction_rows_read,
            &compaction_rows_dropped,
            &compaction_rows_written,
            &compaction_runs,
        ] {
            registry.register(Box::new(collector.clone())).unwrap();
        }
        registry.register(Box::new(watermark_ms.clone())).unwrap();
        registry
            .register(Box::new(partitions_planned.clone()))
            .unwrap();
        Self {
            registry,
            klines_fetched,
            fetch_errors,
            raw_records_written,
            raw_write_errors,
            compaction_rows_read,
            compaction_rows_dropped,
            compaction_rows_written,
            compaction_runs,
            watermark_ms,
            partitions_planned,
        }
    }

    pub fn inc_klines_fetched(&self) {
        self.klines_fetched.inc();
    }
    pub fn inc_fetch_errors(&self) {
        self.fetch_errors.inc();
    }
    pub fn inc_raw_records_written(&self) {
        self.raw_records_written.inc();
    }
    pub fn inc_raw_write_errors(&self) {
        self.raw_write_errors.inc();
    }
    pub fn add_compaction_rows_read(&self, n: u64) {
        self.compaction_rows_read.inc_by(n);
    }
    pub fn add_compaction_rows_dropped(&self, n: u64) {
        self.compaction_rows_dropped.inc_by(n);
    }
    pub fn add_compaction_rows_written(&self, n: u64) {
        self.compaction_rows_written.inc_by(n);
    }
    pub fn inc_compaction_runs(&self) {
        self.compaction_runs.inc();
    }
    pub fn set_watermark_ms(&self, value: i64) {
        self.watermark_ms.set(value);
    }
    pub fn set_partitions_planned(&self, value: i64) {
        self.partitions_planned.set(value);
    }

    pub fn klines_fetched(&self) -> u64 {
        self.klines_fetched.get()
    }
    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.get()
    }
    pub fn raw_records_written(&self) -> u64 {
        self.raw_records_written.get()
    }
    pub fn raw_write_errors(&self) -> u64 {
        self.raw_write_errors.get()
    }

    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .unwrap_or_default();
        String::from_utf8_lossy(&buffer).into_owned()
    }

    async fn handle_metrics(
        &self,
        _req: Request<Incoming>,
    ) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
        Ok(Response::new(Full::new(Bytes::from(self.render()))))
    }

    pub async fn serve(
        self: &Arc<Self>,
        listener: TcpListener,
    ) -> Result<(), Box<dyn Error + Send + Sync>> {
        loop {
            let (socket, _) = listener.accept().await?;
            let io = TokioIo::new(socket);
            let metrics = self.clone();
            let service = service_fn(move |req| {
                let metrics = metrics.clone();
                async move { metrics.handle_metrics(req).await }
            });
            tokio::spawn(async move {
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    eprintln!("metrics connection error: {err:?}");
                }
            });
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
