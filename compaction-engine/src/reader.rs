// Copyright (c) James Kassemi, SC, US. All rights reserved.

use crate::partition::derive_partition;
use core_types::CompactedRecord;
use futures::Stream;
use log::warn;
use metrics::Metrics;
use raw_store::{ObjectStore, StoreError};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Reads every raw object under the planned partitions as a lazy,
/// single-pass stream of normalized records.
///
/// Numeric fields are cast (string or number
/// accepted), records that fail any cast are dropped with a warning,
/// and only records with `open_time > last_open_time` (strict) are
/// yielded. Store failures end the stream with an `Err` item; the run
/// is expected to abort on it.
pub fn read_incremental(
    store: Arc<dyn ObjectStore>,
    partitions: Vec<String>,
    last_open_time: i64,
    metrics: Option<Arc<Metrics>>,
) -> Pin<Box<dyn Stream<Item = Result<CompactedRecord, StoreError>> + Send>> {
    let (tx, rx) = mpsc::channel(100);
    tokio::spawn(async move {
        for partition in partitions {
            let keys = match store.list(&partition).await {
                Ok(keys) => keys,
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            };
            for key in keys {
                let body = match store.get(&key).await {
                    Ok(body) => body,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };
                if let Some(m) = metrics.as_ref() {
                    m.add_compaction_rows_read(1);
                }
                let Some(record) = cast_record(&body) else {
                    warn!("dropping malformed raw object key={key}");
                    if let Some(m) = metrics.as_ref() {
                        m.add_compaction_rows_dropped(1);
                    }
                    continue;
                };
                if record.open_time <= last_open_time {
                    continue;
                }
                if tx.send(Ok(record)).await.is_err() {
                    return;
                }
            }
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

/// Casts one raw JSON object into a [`CompactedRecord`]. Any missing or
/// uncastable field makes the whole record malformed.
fn cast_record(body: &[u8]) -> Option<CompactedRecord> {
    let value: Value = serde_json::from_slice(body).ok()?;
    let event_time = field_str(&value, "event_time")?;
    let (event_date, hour) = derive_partition(&event_time)?;
    Some(CompactedRecord {
        exchange: field_str(&value, "exchange")?,
        symbol: field_str(&value, "symbol")?,
        interval: field_str(&value, "interval")?,
        open_time: cast_i64(value.get("open_time")?)?,
        close_time: cast_i64(value.get("close_time")?)?,
        open: cast_f64(value.get("open")?)?,
        high: cast_f64(value.get("high")?)?,
        low: cast_f64(value.get("low")?)?,
        close: cast_f64(value.get("close")?)?,
        volume: cast_f64(value.get("volume")?)?,
        ingest_time: field_str(&value, "ingest_time")?,
        event_time,
        event_date,
        hour,
    })
}

fn field_str(value: &Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(str::to_string)
}

fn cast_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn cast_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use futures::StreamExt;
    use raw_store::FsObjectStore;
    use tempfile::tempdir;

    fn raw_json(open_time: i64, volume: &str) -> String {
        format!(
            r#"{{"exchange":"binance","symbol":"BTCUSDT","interval":"1h",
                "event_time":"1970-01-01T00:00:00+00:00","open_time":{open_time},
                "close_time":{close},"open":"1.0","high":"2.0","low":"0.5",
                "close":"1.5","volume":{volume},"ingest_time":"1970-01-01T00:00:07+00:00"}}"#,
            close = open_time + 3_599_999
        )
    }

    async fn seeded_store(objects: &[(&str, String)]) -> (tempfile::TempDir, Arc<dyn ObjectStore>) {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        for (key, body) in objects {
            store.put(key, Bytes::from(body.clone())).await.unwrap();
        }
        (dir, Arc::new(store))
    }

    const PARTITION: &str = "bronze/coin_prices/symbol=BTCUSDT/event_date=1970-01-01/";

    #[tokio::test]
    async fn never_yields_records_at_or_below_watermark() {
        let (_dir, store) = seeded_store(&[
            (
                "bronze/coin_prices/symbol=BTCUSDT/event_date=1970-01-01/hour=00/open_time=1000.json",
                raw_json(1_000, r#""10.0""#),
            ),
            (
                "bronze/coin_prices/symbol=BTCUSDT/event_date=1970-01-01/hour=00/open_time=2000.json",
                raw_json(2_000, r#""10.0""#),
            ),
        ])
        .await;
        let mut stream = read_incremental(store, vec![PARTITION.to_string()], 1_000, None);
        let mut yielded = Vec::new();
        while let Some(item) = stream.next().await {
            yielded.push(item.unwrap());
        }
        assert_eq!(yielded.len(), 1);
        assert_eq!(yielded[0].open_time, 2_000);
    }

    #[tokio::test]
    async fn malformed_record_is_dropped_not_fatal() {
        let (_dir, store) = seeded_store(&[
            (
                "bronze/coin_prices/symbol=BTCUSDT/event_date=1970-01-01/hour=00/open_time=1000.json",
                raw_json(1_000, r#""not-a-number""#),
            ),
            (
                "bronze/coin_prices/symbol=BTCUSDT/event_date=1970-01-01/hour=00/open_time=2000.json",
                raw_json(2_000, "42.5"),
            ),
        ])
        .await;
        let metrics = Arc::new(Metrics::new());
        let mut stream = read_incremental(
            store,
            vec![PARTITION.to_string()],
            0,
            Some(Arc::clone(&metrics)),
        );
        let mut yielded = Vec::new();
        while let Some(item) = stream.next().await {
            yielded.push(item.unwrap());
        }
        assert_eq!(yielded.len(), 1);
        assert_eq!(yielded[0].volume, 42.5);
    }

    #[tokio::test]
    async fn casts_string_and_numeric_fields() {
        let (_dir, store) = seeded_store(&[(
            "bronze/coin_prices/symbol=BTCUSDT/event_date=1970-01-01/hour=00/open_time=5000.json",
            raw_json(5_000, r#""123.25""#),
        )])
        .await;
        let mut stream = read_incremental(store, vec![PARTITION.to_string()], 0, None);
        let record = stream.next().await.unwrap().unwrap();
        assert_eq!(record.open, 1.0);
        assert_eq!(record.volume, 123.25);
        assert_eq!(record.close_time, 5_000 + 3_599_999);
        assert_eq!(record.event_date, "1970-01-01");
        assert_eq!(record.hour, "00");
    }

    #[tokio::test]
    async fn empty_partitions_yield_empty_stream() {
        let (_dir, store) = seeded_store(&[]).await;
        let mut stream = read_incremental(store, vec![PARTITION.to_string()], 0, None);
        assert!(stream.next().await.is_none());
    }
}
