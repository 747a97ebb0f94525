// Copyright (c) James Kassemi, SC, US. All rights reserved.

use core_types::{event_time_utc, partition_parts};

/// Idempotent object key for one raw candle. Derived purely from
/// `(symbol, open_time)` for a given dataset, so a retried ingestion of
/// the same candle always lands on the same key.
pub fn raw_object_key(dataset: &str, symbol: &str, open_time_ms: i64) -> String {
    let (event_date, hour) = partition_parts(event_time_utc(open_time_ms));
    format!(
        "bronze/{dataset}/symbol={symbol}/event_date={event_date}/hour={hour}/open_time={open_time_ms}.json"
    )
}

/// Day-partition prefix root for one symbol; the planner appends
/// `event_date=YYYY-MM-DD/` segments underneath this.
pub fn symbol_base_path(dataset: &str, symbol: &str) -> String {
    format!("bronze/{dataset}/symbol={symbol}/")
}
