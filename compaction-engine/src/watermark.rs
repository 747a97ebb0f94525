// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use log::info;
use raw_store::{ObjectStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("watermark load: {0}")]
    Load(StoreError),
    #[error("watermark corrupt: {0}")]
    Corrupt(serde_json::Error),
    #[error("watermark moved: expected {expected}, found {actual}")]
    Conflict { expected: i64, actual: i64 },
    #[error("watermark persist: {0}")]
    Persist(StoreError),
}

#[derive(Debug, Serialize, Deserialize)]
struct WatermarkDoc {
    last_open_time: i64,
}

/// High-water mark for compaction, stored as a single JSON document.
///
/// The stored value is the largest `open_time` ever compacted. A missing
/// document reads as zero, which makes the first run pick up everything
/// after the bootstrap date.
pub struct WatermarkStore {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl WatermarkStore {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    pub async fn read(&self) -> Result<i64, WatermarkError> {
        match self.store.get(&self.key).await {
            Ok(body) => {
                let doc: WatermarkDoc =
                    serde_json::from_slice(&body).map_err(WatermarkError::Corrupt)?;
                Ok(doc.last_open_time)
            }
            Err(StoreError::NotFound(_)) => Ok(0),
            Err(err) => Err(WatermarkError::Load(err)),
        }
    }

    /// Overwrite the watermark, but only if it still holds `expected`.
    ///
    /// The re-read narrows the window in which two concurrent runs could
    /// both commit; the loser gets a `Conflict` and must retry from a
    /// fresh read.
    pub async fn advance(&self, expected: i64, new: i64) -> Result<(), WatermarkError> {
        let actual = self.read().await?;
        if actual != expected {
            return Err(WatermarkError::Conflict { expected, actual });
        }
        let doc = WatermarkDoc {
            last_open_time: new,
        };
        let body = serde_json::to_vec(&doc).map_err(WatermarkError::Corrupt)?;
        self.store
            .put(&self.key, body.into())
            .await
            .map_err(WatermarkError::Persist)?;
        info!("watermark advanced: {} -> {}", expected, new);
        Ok(())
    }
}
