// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Binance REST kline source: fetches the latest candle for one
//! `(symbol, interval)` pair and validates the positional payload.

use core_types::RetryPolicy;
use log::info;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
const READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("exchange API error: status={0}")]
    Status(u16),
    #[error("failed to decode exchange response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid kline data received ({fields} fields)")]
    InvalidSample { fields: usize },
}

/// One positional kline row as returned by `/api/v3/klines`. Price and
/// volume fields stay strings; casting happens at compaction time.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineSample {
    pub open_time: i64,
    pub open: String,
    pub high: String,
    pub low: String,
    pub close: String,
    pub volume: String,
    pub close_time: i64,
}

pub struct BinanceSource {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl BinanceSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(READ_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            retry: RetryPolicy::network(),
        })
    }

    /// Fetches the most recent kline for `(symbol, interval)`. Transport
    /// and non-200 failures are retried under the network policy; a
    /// malformed payload fails immediately.
    pub async fn fetch_latest(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<KlineSample, FetchError> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let body = self
            .retry
            .run(|_| {
                let client = self.client.clone();
                let url = url.clone();
                async move {
                    let resp = client
                        .get(&url)
                        .query(&[("symbol", symbol), ("interval", interval), ("limit", "1")])
                        .send()
                        .await?;
                    let status = resp.status();
                    if !status.is_success() {
                        return Err(FetchError::Status(status.as_u16()));
                    }
                    Ok(resp.bytes().await?)
                }
            })
            .await?;
        let sample = parse_latest_kline(&body)?;
        info!(
            "fetched kline symbol={} interval={} open_time={} close_time={}",
            symbol, interval, sample.open_time, sample.close_time
        );
        Ok(sample)
    }
}

/// Parses the first row of a klines response. Fails with
/// [`FetchError::InvalidSample`] when the response is empty or the row
/// carries fewer than the 7 positional fields a candle needs.
pub fn parse_latest_kline(body: &[u8]) -> Result<KlineSample, FetchError> {
    let rows: Vec<Value> = serde_json::from_slice(body)?;
    let row = rows
        .first()
        .and_then(Value::as_array)
        .ok_or(FetchError::InvalidSample { fields: 0 })?;
    if row.len() < 7 {
        return Err(FetchError::InvalidSample { fields: row.len() });
    }
    Ok(KlineSample {
        open_time: field_i64(&row[0]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
        open: field_string(&row[1]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
        high: field_string(&row[2]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
        low: field_string(&row[3]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
        close: field_string(&row[4]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
        volume: field_string(&row[5]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
        close_time: field_i64(&row[6]).ok_or(FetchError::InvalidSample { fields: row.len() })?,
    })
}

fn field_i64(value: &Value) -> Option<i64> {
    value.as_i64()
}

fn field_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
