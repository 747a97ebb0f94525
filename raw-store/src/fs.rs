// Copyright (c) James Kassemi, SC, US. All rights reserved.

use crate::{ObjectStore, StoreError};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;

/// Local-filesystem object store. Keys map directly onto paths below
/// `root`; writes go through a temp file + rename so a concurrent reader
/// sees either the old object or the new one, never a torn write.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, key: &str, body: Bytes) -> Result<(), StoreError> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tmp = path.with_extension(format!("tmp.{nanos}"));
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        match fs::read(self.object_path(key)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.object_path(prefix.trim_end_matches('/'));
        if !fs::try_exists(&dir).await? {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        let mut pending = vec![dir];
        while let Some(current) = pending.pop() {
            let mut entries = fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                } else if !is_temp_file(&path) {
                    keys.push(relative_key(&self.root, &path));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// An object mid-write, named `<key stem>.tmp.<nanos>` until its rename.
fn is_temp_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(".tmp."))
}

fn relative_key(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn put_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store
            .put("bronze/a/b/record.json", Bytes::from_static(b"{\"x\":1}"))
            .await
            .unwrap();
        let body = store.get("bronze/a/b/record.json").await.unwrap();
        assert_eq!(&body[..], b"{\"x\":1}");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        match store.get("bronze/missing.json").await {
            Err(StoreError::NotFound(key)) => assert_eq!(key, "bronze/missing.json"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store.put("k.json", Bytes::from_static(b"old")).await.unwrap();
        store.put("k.json", Bytes::from_static(b"new")).await.unwrap();
        assert_eq!(&store.get("k.json").await.unwrap()[..], b"new");
    }

    #[tokio::test]
    async fn list_walks_nested_partitions_in_order() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        for key in [
            "bronze/d/symbol=BTC/event_date=2021-01-02/hour=01/open_time=2.json",
            "bronze/d/symbol=BTC/event_date=2021-01-01/hour=00/open_time=1.json",
        ] {
            store.put(key, Bytes::from_static(b"{}")).await.unwrap();
        }
        let keys = store.list("bronze/d/symbol=BTC/").await.unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys[0].contains("2021-01-01"));
        assert!(keys[1].contains("2021-01-02"));
    }

    #[tokio::test]
    async fn list_missing_prefix_is_empty() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        assert!(store.list("bronze/nothing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_skips_in_flight_temp_files() {
        let dir = tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        store
            .put("bronze/d/hour=00/a.json", Bytes::from_static(b"{}"))
            .await
            .unwrap();
        // A writer that died mid-put leaves its temp file behind.
        tokio::fs::write(
            dir.path().join("bronze/d/hour=00/a.tmp.123456789"),
            b"partial",
        )
        .await
        .unwrap();
        let keys = store.list("bronze/d/").await.unwrap();
        assert_eq!(keys, vec!["bronze/d/hour=00/a.json".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_overwrites_never_expose_torn_reads() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FsObjectStore::new(dir.path()));
        let key = "metadata/silver_watermark.json";
        let old = Bytes::from_static(b"{\"last_open_time\":1000}");
        let new = Bytes::from_static(b"{\"last_open_time\":2000}");
        store.put(key, old.clone()).await.unwrap();

        let writes = {
            let store = store.clone();
            let (old, new) = (old.clone(), new.clone());
            tokio::spawn(async move {
                for i in 0..500u32 {
                    let body = if i % 2 == 0 { new.clone() } else { old.clone() };
                    store
                        .put("metadata/silver_watermark.json", body)
                        .await
                        .unwrap();
                }
            })
        };
        for _ in 0..500 {
            let body = store.get(key).await.unwrap();
            assert!(
                body == old || body == new,
                "torn read: {:?}",
                String::from_utf8_lossy(&body)
            );
        }
        writes.await.unwrap();
    }
}
