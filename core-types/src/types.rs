// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One exchange candle exactly as ingested. OHLCV fields stay strings
/// until the compaction read path casts them; `ingest_time` is wall
/// clock at build time and not part of record identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    pub exchange: String,
    pub symbol: String,
    pub interval: String,
    pub event_time: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub ingest_time: String,
}

/// Normalized candle emitted by the incremental reader: numeric fields
/// cast, `event_date`/`hour` derived from `event_time` with the same UTC
/// rules the raw object key uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactedRecord {
    pub exchange: String,
    pub symbol: String,
    pub interval: String,
    pub event_time: String,
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ingest_time: String,
    pub event_date: String,
    pub hour: String,
}

/// Event instant of a candle. `open_time` is epoch milliseconds; the
/// derivation truncates to whole seconds before converting to UTC, so
/// retries of the same candle always land on the same instant. An
/// out-of-range input clamps to the epoch, which keeps the derivation
/// deterministic even for garbage timestamps.
pub fn event_time_utc(open_time_ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(open_time_ms.div_euclid(1000), 0).unwrap_or(DateTime::UNIX_EPOCH)
}

/// `(event_date, hour)` partition components for a UTC instant. The raw
/// key builder and the compaction partition deriver both go through
/// here, so the two layers cannot disagree about placement.
pub fn partition_parts(ts: DateTime<Utc>) -> (String, String) {
    (
        ts.format("%Y-%m-%d").to_string(),
        ts.format("%H").to_string(),
    )
}
