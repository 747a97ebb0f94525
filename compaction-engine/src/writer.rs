// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use core_types::CompactedRecord;
use log::info;
use parquet::arrow::ArrowWriter;
use raw_store::ObjectStore;

use crate::CompactionError;

/// Writes compacted records as one parquet object per hive-style partition.
///
/// Partition columns (exchange, symbol, event_date, hour) live in the object
/// key only; the file carries the remaining columns. The `run_id` in the file
/// name keeps successive runs from clobbering each other's output.
pub struct ParquetPartitionWriter {
    store: Arc<dyn ObjectStore>,
    output_root: String,
}

fn compacted_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("interval", DataType::Utf8, false),
        Field::new("open_time", DataType::Int64, false),
        Field::new("close_time", DataType::Int64, false),
        Field::new("open", DataType::Float64, false),
        Field::new("high", DataType::Float64, false),
        Field::new("low", DataType::Float64, false),
        Field::new("close", DataType::Float64, false),
        Field::new("volume", DataType::Float64, false),
        Field::new("event_time", DataType::Utf8, false),
        Field::new("ingest_time", DataType::Utf8, false),
    ]))
}

fn records_to_batch(rows: &[&CompactedRecord]) -> Result<RecordBatch, CompactionError> {
    let len = rows.len();
    let mut intervals = Vec::with_capacity(len);
    let mut open_times = Vec::with_capacity(len);
    let mut close_times = Vec::with_capacity(len);
    let mut opens = Vec::with_capacity(len);
    let mut highs = Vec::with_capacity(len);
    let mut lows = Vec::with_capacity(len);
    let mut closes = Vec::with_capacity(len);
    let mut volumes = Vec::with_capacity(len);
    let mut event_times = Vec::with_capacity(len);
    let mut ingest_times = Vec::with_capacity(len);
    for row in rows {
        intervals.push(row.interval.clone());
        open_times.push(row.open_time);
        close_times.push(row.close_time);
        opens.push(row.open);
        highs.push(row.high);
        lows.push(row.low);
        closes.push(row.close);
        volumes.push(row.volume);
        event_times.push(row.event_time.clone());
        ingest_times.push(row.ingest_time.clone());
    }
    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(intervals)),
        Arc::new(Int64Array::from(open_times)),
        Arc::new(Int64Array::from(close_times)),
        Arc::new(Float64Array::from(opens)),
        Arc::new(Float64Array::from(highs)),
        Arc::new(Float64Array::from(lows)),
        Arc::new(Float64Array::from(closes)),
        Arc::new(Float64Array::from(volumes)),
        Arc::new(StringArray::from(event_times)),
        Arc::new(StringArray::from(ingest_times)),
    ];
    Ok(RecordBatch::try_new(compacted_schema(), arrays)?)
}

impl ParquetPartitionWriter {
    pub fn new(store: Arc<dyn ObjectStore>, output_root: impl Into<String>) -> Self {
        Self {
            store,
            output_root: output_root.into(),
        }
    }

    fn partition_key(
        &self,
        exchange: &str,
        symbol: &str,
        event_date: &str,
        hour: &str,
        run_id: i64,
    ) -> String {
        format!(
            "{}/exchange={exchange}/symbol={symbol}/event_date={event_date}/hour={hour}/part-{run_id}.parquet",
            self.output_root
        )
    }

    /// Write one parquet object per partition present in `records`. Returns
    /// the keys written.
    pub async fn write_run(
        &self,
        records: &[CompactedRecord],
        run_id: i64,
    ) -> Result<Vec<String>, CompactionError> {
        let mut partitions: BTreeMap<(String, String, String, String), Vec<&CompactedRecord>> =
            BTreeMap::new();
        for record in records {
            partitions
                .entry((
                    record.exchange.clone(),
                    record.symbol.clone(),
                    record.event_date.clone(),
                    record.hour.clone(),
                ))
                .or_default()
                .push(record);
        }

        let mut written = Vec::with_capacity(partitions.len());
        for ((exchange, symbol, event_date, hour), rows) in &partitions {
            let batch = records_to_batch(rows)?;
            let mut buf = Vec::new();
            let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), None)?;
            writer.write(&batch)?;
            writer.close()?;

            let key = self.partition_key(exchange, symbol, event_date, hour, run_id);
            let bytes = buf.len();
            self.store.put(&key, buf.into()).await?;
            info!("compaction wrote {} rows to {} ({} bytes)", rows.len(), key, bytes);
            written.push(key);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Float64Array, Int64Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use raw_store::FsObjectStore;
    use tempfile::tempdir;

    fn record(symbol: &str, open_time: i64, hour: &str, volume: f64) -> CompactedRecord {
        CompactedRecord {
            exchange: "binance".to_string(),
            symbol: symbol.to_string(),
            interval: "1h".to_string(),
            open_time,
            close_time: open_time + 3_599_999,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume,
            event_time: "1970-01-01T00:00:00+00:00".to_string(),
            ingest_time: "1970-01-01T00:00:07+00:00".to_string(),
            event_date: "1970-01-01".to_string(),
            hour: hour.to_string(),
        }
    }

    #[tokio::test]
    async fn writes_one_object_per_partition() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let writer = ParquetPartitionWriter::new(Arc::clone(&store), "silver");

        let records = vec![
            record("BTCUSDT", 0, "00", 10.0),
            record("BTCUSDT", 3_600_000, "01", 11.0),
            record("ETHUSDT", 0, "00", 12.0),
        ];
        let written = writer.write_run(&records, 42).await.unwrap();
        assert_eq!(written.len(), 3);
        assert!(written.contains(
            &"silver/exchange=binance/symbol=BTCUSDT/event_date=1970-01-01/hour=00/part-42.parquet"
                .to_string()
        ));
        assert!(written.contains(
            &"silver/exchange=binance/symbol=ETHUSDT/event_date=1970-01-01/hour=00/part-42.parquet"
                .to_string()
        ));
    }

    #[tokio::test]
    async fn written_parquet_round_trips() {
        let dir = tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(dir.path()));
        let writer = ParquetPartitionWriter::new(Arc::clone(&store), "silver");

        let records = vec![
            record("BTCUSDT", 0, "00", 10.0),
            record("BTCUSDT", 60_000, "00", 20.5),
        ];
        let written = writer.write_run(&records, 7).await.unwrap();
        assert_eq!(written.len(), 1);

        let body = store.get(&written[0]).await.unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(body)
            .unwrap()
            .build()
            .unwrap();
        let batches: Vec<_> = reader.collect::<Result<Vec<_>, _>>().unwrap();
        let total: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total, 2);

        let batch = &batches[0];
        let open_time = batch
            .column_by_name("open_time")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(open_time.value(0), 0);
        assert_eq!(open_time.value(1), 60_000);
        let volume = batch
            .column_by_name("volume")
            .unwrap()
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(volume.value(1), 20.5);
    }
}
