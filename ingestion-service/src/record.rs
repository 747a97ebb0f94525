// Copyright (c) James Kassemi, SC, US. All rights reserved.

use binance_source::KlineSample;
use chrono::Utc;
use core_types::{event_time_utc, RawRecord};

/// Builds the canonical raw record for one validated kline. Pure except
/// for the `ingest_time` wall-clock read; the sample has already passed
/// the 7-field check at parse time, so no I/O and no failure modes here.
pub fn build_record(
    sample: &KlineSample,
    exchange: &str,
    symbol: &str,
    interval: &str,
) -> RawRecord {
    RawRecord {
        exchange: exchange.to_string(),
        symbol: symbol.to_string(),
        interval: interval.to_string(),
        event_time: event_time_utc(sample.open_time).to_rfc3339(),
        open_time: sample.open_time,
        close_time: sample.close_time,
        open: sample.open.clone(),
        high: sample.high.clone(),
        low: sample.low.clone(),
        close: sample.close.clone(),
        volume: sample.volume.clone(),
        ingest_time: Utc::now().to_rfc3339(),
    }
}
