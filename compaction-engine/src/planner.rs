// Copyright (c) James Kassemi, SC, US. All rights reserved.

use crate::CompactionError;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::event_time_utc;
use log::info;

/// Enumerates the day partitions that may hold unread raw data.
///
/// The plan is intentionally inclusive of the watermark's own day: a day
/// can contain both processed and new records, and the reader's exact
/// `open_time` filter is what keeps day granularity safe.
pub struct PartitionPlanner {
    bootstrap_start_date: Option<NaiveDate>,
}

impl PartitionPlanner {
    pub fn new(bootstrap_start_date: Option<NaiveDate>) -> Self {
        Self {
            bootstrap_start_date,
        }
    }

    /// Day partitions from the watermark's UTC date (truncating) through
    /// `now`'s UTC date, inclusive, per base path. With no watermark yet
    /// the configured bootstrap date bounds the walk; without one the
    /// run refuses to scan from the epoch.
    pub fn plan(
        &self,
        base_paths: &[String],
        last_open_time: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, CompactionError> {
        let start_date = if last_open_time > 0 {
            event_time_utc(last_open_time).date_naive()
        } else {
            self.bootstrap_start_date.ok_or_else(|| {
                CompactionError::Config(
                    "no watermark and no compaction.bootstrap_start_date configured".to_string(),
                )
            })?
        };
        let end_date = now.date_naive();
        let mut partitions = Vec::new();
        for base in base_paths {
            let mut day = start_date;
            while day <= end_date {
                partitions.push(format!("{base}event_date={}/", day.format("%Y-%m-%d")));
                let Some(next) = day.succ_opt() else { break };
                day = next;
            }
        }
        info!(
            "planned {} partitions across {} base paths ({} -> {})",
            partitions.len(),
            base_paths.len(),
            start_date,
            end_date
        );
        Ok(partitions)
    }
}
