//! File-backed store
//!
//! All entries live in one JSON object. Writes go to a sibling temp file
//! which is then renamed over the original.

use super::KeyStore;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                Error::StorageUnavailable(format!(
                    "{} is not a valid store file: {}",
                    self.path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(Error::StorageUnavailable(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let unavailable = |e: std::io::Error| {
            Error::StorageUnavailable(format!("Failed to write {}: {}", self.path.display(), e))
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(unavailable)?;
        }

        let tmp = self.path.with_extension("tmp");
        let json = serde_json::to_vec_pretty(entries)?;
        tokio::fs::write(&tmp, json).await.map_err(unavailable)?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(unavailable)?;
        Ok(())
    }
}

#[async_trait]
impl KeyStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }
}
