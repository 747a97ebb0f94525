// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared record types, configuration, and retry policy for the
//! cryptoflow ingestion/compaction pipeline.

pub mod config;
pub mod retry;
pub mod types;

pub use config::{AppConfig, CompactionConfig, StorageConfig};
pub use retry::RetryPolicy;
pub use types::{event_time_utc, partition_parts, CompactedRecord, RawRecord};
