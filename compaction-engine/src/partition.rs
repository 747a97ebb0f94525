// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::{DateTime, Utc};
use core_types::partition_parts;

/// Derives the compacted partition columns from a record's `event_time`.
/// Goes through the same [`partition_parts`] helper the raw key builder
/// uses, so ingestion and compaction always agree on placement. Returns
/// `None` for an unparseable timestamp (the record is then treated as
/// malformed and dropped).
pub fn derive_partition(event_time: &str) -> Option<(String, String)> {
    let ts: DateTime<Utc> = event_time.parse().ok()?;
    Some(partition_parts(ts))
}
