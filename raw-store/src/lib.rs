// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Append-only object store for raw candle records.
//!
//! The crate exposes:
//! - [`ObjectStore`]: async put/get/list over a key namespace, with
//!   filesystem ([`FsObjectStore`]) and S3 ([`S3ObjectStore`]) backends.
//! - [`RawStore`]: serializes a [`RawRecord`] and writes it under its
//!   idempotent [`raw_object_key`].

pub mod fs;
pub mod key;
pub mod s3;

use async_trait::async_trait;
use bytes::Bytes;
use core_types::RawRecord;
use std::sync::Arc;
use thiserror::Error;

pub use fs::FsObjectStore;
pub use key::{raw_object_key, symbol_base_path};
pub use s3::S3ObjectStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("s3 error: {0}")]
    S3(String),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Durable key/value object storage. `put` to an existing key is a full
/// overwrite, which is what makes retried ingestion converge instead of
/// duplicating.
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StoreError>;

    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;

    /// All object keys under `prefix`, in lexicographic order. A prefix
    /// with no objects yields an empty list, not an error.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

/// Raw-record facade over an [`ObjectStore`].
#[derive(Clone)]
pub struct RawStore {
    store: Arc<dyn ObjectStore>,
    dataset: String,
}

impl RawStore {
    pub fn new(store: Arc<dyn ObjectStore>, dataset: impl Into<String>) -> Self {
        Self {
            store,
            dataset: dataset.into(),
        }
    }

    /// Writes `record` under its idempotent key and returns the key.
    /// A failure here is the caller's to isolate; nothing is retried.
    pub async fn put_record(&self, record: &RawRecord) -> Result<String, StoreError> {
        let key = raw_object_key(&self.dataset, &record.symbol, record.open_time);
        let body = serde_json::to_vec(record)?;
        self.store.put(&key, Bytes::from(body)).await?;
        Ok(key)
    }

    /// Prefix covering every partition of one symbol, for the planner.
    pub fn symbol_base_path(&self, symbol: &str) -> String {
        symbol_base_path(&self.dataset, symbol)
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(symbol: &str, open_time: i64, close: &str) -> RawRecord {
        RawRecord {
            exchange: "binance".to_string(),
            symbol: symbol.to_string(),
            interval: "1h".to_string(),
            event_time: core_types::event_time_utc(open_time).to_rfc3339(),
            open_time,
            close_time: open_time + 3_599_999,
            open: "100.0".to_string(),
            high: "101.0".to_string(),
            low: "99.0".to_string(),
            close: close.to_string(),
            volume: "12.5".to_string(),
            ingest_time: "2021-01-01T00:00:07+00:00".to_string(),
        }
    }

    #[tokio::test]
    async fn put_record_uses_idempotent_key() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FsObjectStore::new(dir.path()));
        let raw = RawStore::new(store, "coin_prices");

        let key = raw
            .put_record(&sample_record("BTCUSDT", 1_609_459_200_000, "29050.0"))
            .await
            .unwrap();
        assert_eq!(
            key,
            "bronze/coin_prices/symbol=BTCUSDT/event_date=2021-01-01/hour=00/open_time=1609459200000.json"
        );
    }

    #[tokio::test]
    async fn reingesting_same_candle_overwrites_in_place() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let raw = RawStore::new(Arc::clone(&store), "coin_prices");

        let first = raw
            .put_record(&sample_record("BTCUSDT", 1_609_459_200_000, "29050.0"))
            .await
            .unwrap();
        let second = raw
            .put_record(&sample_record("BTCUSDT", 1_609_459_200_000, "29051.5"))
            .await
            .unwrap();
        assert_eq!(first, second);

        let keys = store
            .list("bronze/coin_prices/symbol=BTCUSDT/")
            .await
            .unwrap();
        assert_eq!(keys.len(), 1);

        let body = store.get(&first).await.unwrap();
        let stored: RawRecord = serde_json::from_slice(&body).unwrap();
        assert_eq!(stored.close, "29051.5");
    }

    #[tokio::test]
    async fn distinct_open_times_produce_distinct_keys() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let raw = RawStore::new(Arc::clone(&store), "coin_prices");

        raw.put_record(&sample_record("BTCUSDT", 1_000, "1.0"))
            .await
            .unwrap();
        raw.put_record(&sample_record("BTCUSDT", 2_000, "2.0"))
            .await
            .unwrap();
        let keys = store
            .list("bronze/coin_prices/symbol=BTCUSDT/")
            .await
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with("open_time=1000.json"));
        assert!(keys[1].ends_with("open_time=2000.json"));
    }
}
