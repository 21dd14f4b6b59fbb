//! Durable key/value persistence for the wallet key and connection flag
//!
//! Backends are a closed set selected by `StoreConfig`. Every component that
//! persists state receives a `SharedStore` handle explicitly.

mod file;
mod memory;

use crate::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Hex-encoded private key
pub const PRIVATE_KEY: &str = "zeroWalletPrivateKey";
/// `"true"` / `"false"`
pub const CONNECTED: &str = "ZeroWalletConnected";

/// Default location of the file store, relative to the working directory
pub const DEFAULT_STORE_PATH: &str = ".zero-wallet/store.json";

/// String key/value store
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read a value, `None` if it was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, replacing any previous one
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

pub type SharedStore = Arc<dyn KeyStore>;

/// Store backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Process-local, lost on exit
    Memory,
    /// JSON file on disk
    File { path: PathBuf },
}

impl StoreConfig {
    pub fn build(&self) -> SharedStore {
        match self {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            StoreConfig::File { path } => Arc::new(FileStore::new(path.clone())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            StoreConfig::File { .. } => "file",
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::File {
            path: PathBuf::from(DEFAULT_STORE_PATH),
        }
    }
}

impl FromStr for StoreConfig {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "memory" => Ok(StoreConfig::Memory),
            "file" => Ok(StoreConfig::default()),
            other => Err(Error::Configuration(format!(
                "Unknown store type: {}. Use 'memory' or 'file'",
                other
            ))),
        }
    }
}

/// Read the connection flag; anything but `"true"` counts as disconnected
pub async fn is_connected(store: &dyn KeyStore) -> Result<bool> {
    Ok(store.get(CONNECTED).await?.as_deref() == Some("true"))
}

pub async fn set_connected(store: &dyn KeyStore, connected: bool) -> Result<()> {
    store
        .set(CONNECTED, if connected { "true" } else { "false" })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_from_name() {
        assert_eq!("memory".parse::<StoreConfig>().unwrap(), StoreConfig::Memory);
        assert_eq!("FILE".parse::<StoreConfig>().unwrap(), StoreConfig::default());
    }

    #[test]
    fn test_unknown_store_is_configuration_error() {
        let err = "browser-session".parse::<StoreConfig>().unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_store_config_deserialize() {
        let parsed: StoreConfig =
            serde_json::from_value(serde_json::json!({ "type": "file", "path": "/tmp/w.json" }))
                .unwrap();
        assert_eq!(
            parsed,
            StoreConfig::File {
                path: PathBuf::from("/tmp/w.json")
            }
        );
    }

    #[tokio::test]
    async fn test_connected_flag() {
        let store = StoreConfig::Memory.build();
        assert!(!is_connected(store.as_ref()).await.unwrap());

        set_connected(store.as_ref(), true).await.unwrap();
        assert_eq!(store.get(CONNECTED).await.unwrap().as_deref(), Some("true"));
        assert!(is_connected(store.as_ref()).await.unwrap());

        set_connected(store.as_ref(), false).await.unwrap();
        assert!(!is_connected(store.as_ref()).await.unwrap());
    }
}
