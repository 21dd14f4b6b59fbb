//! Configuration for the zero-wallet connector

pub mod rpc;

use crate::chains::{ids, SupportedChain};
use crate::recovery::{GoogleDriveOptions, RecoveryConfig};
use crate::store::StoreConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use url::Url;

pub use rpc::RpcConfig;

/// Environment variable names read by `ConnectorOptions::from_env`
pub mod env_vars {
    pub const SERVER_DOMAIN: &str = "ZERO_WALLET_SERVER_DOMAIN";
    pub const GAS_TANK: &str = "ZERO_WALLET_GAS_TANK";
    pub const STORE: &str = "ZERO_WALLET_STORE";
    pub const RECOVERY: &str = "ZERO_WALLET_RECOVERY";
    pub const DEFAULT_CHAIN: &str = "ZERO_WALLET_CHAIN_ID";
    pub const DRIVE_ACCESS_TOKEN: &str = "GOOGLE_DRIVE_ACCESS_TOKEN";
}

/// Gas tank used when none is configured
pub const DEFAULT_GAS_TANK: &str = "default";

/// URLs of the six zero-wallet server endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEndpoints {
    pub nonce_provider: String,
    pub nonce_refresher: String,
    pub authorizer: String,
    pub gas_station: String,
    pub transaction_builder: String,
    pub scw_deployer: String,
}

impl ServerEndpoints {
    /// Standard endpoint layout under one server domain
    ///
    /// `domain` may be a bare host (`api.example.org`) or a URL.
    pub fn from_domain(domain: &str) -> Result<Self> {
        let domain = domain.trim().trim_end_matches('/');
        let base = if domain.contains("://") {
            domain.to_string()
        } else {
            format!("https://{}", domain)
        };
        Url::parse(&base)
            .map_err(|e| Error::Configuration(format!("Invalid server domain {}: {}", domain, e)))?;

        let endpoint = |path: &str| format!("{}/api/{}", base, path);
        Ok(Self {
            nonce_provider: endpoint("auth/nonce"),
            nonce_refresher: endpoint("auth/nonce/refresh"),
            authorizer: endpoint("auth/authorize"),
            gas_station: endpoint("tx/send"),
            transaction_builder: endpoint("tx/build"),
            scw_deployer: endpoint("scw/deploy"),
        })
    }

    /// Check every endpoint is an absolute http(s) URL
    pub fn validate(&self) -> Result<()> {
        for (name, value) in self.iter() {
            let url = Url::parse(value)
                .map_err(|e| Error::Configuration(format!("Invalid {} URL {}: {}", name, value, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::Configuration(format!(
                    "{} URL must use http or https: {}",
                    name, value
                )));
            }
        }
        Ok(())
    }

    fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("nonce_provider", self.nonce_provider.as_str()),
            ("nonce_refresher", self.nonce_refresher.as_str()),
            ("authorizer", self.authorizer.as_str()),
            ("gas_station", self.gas_station.as_str()),
            ("transaction_builder", self.transaction_builder.as_str()),
            ("scw_deployer", self.scw_deployer.as_str()),
        ]
        .into_iter()
    }
}

/// What `connect()` does when the session is already connected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConnectPolicy {
    /// Fail with `AlreadyConnected`
    #[default]
    Reject,
    /// Return the existing session
    Reuse,
}

/// What `connect()` does when backing up a freshly created key fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackupFailurePolicy {
    /// Log a warning and keep the unprotected key
    #[default]
    Warn,
    /// Abort the connect; nothing is persisted
    Fail,
}

/// Receipt polling after relay submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptPolling {
    /// Delay between `eth_getTransactionByHash` polls
    pub interval_ms: u64,
    /// Give up after this many polls; unbounded when absent
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

impl Default for ReceiptPolling {
    fn default() -> Self {
        Self {
            interval_ms: 4_000,
            max_attempts: None,
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectorOptions {
    /// JSON-RPC URL per chain id; one provider is built for each entry
    pub rpc_urls: BTreeMap<u64, String>,
    /// Chain the connector starts on
    #[serde(default = "default_chain_id")]
    pub default_chain_id: u64,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    pub server: ServerEndpoints,
    #[serde(default = "default_gas_tank")]
    pub gas_tank_name: String,
    #[serde(default)]
    pub connect_policy: ConnectPolicy,
    #[serde(default)]
    pub backup_failure_policy: BackupFailurePolicy,
    #[serde(default)]
    pub receipt_polling: ReceiptPolling,
}

fn default_chain_id() -> u64 {
    ids::POLYGON
}

fn default_gas_tank() -> String {
    DEFAULT_GAS_TANK.to_string()
}

impl ConnectorOptions {
    /// Options with defaults for everything but the endpoints
    pub fn new(rpc_urls: BTreeMap<u64, String>, server: ServerEndpoints) -> Self {
        Self {
            rpc_urls,
            default_chain_id: default_chain_id(),
            store: StoreConfig::default(),
            recovery: RecoveryConfig::default(),
            server,
            gas_tank_name: default_gas_tank(),
            connect_policy: ConnectPolicy::default(),
            backup_failure_policy: BackupFailurePolicy::default(),
            receipt_polling: ReceiptPolling::default(),
        }
    }

    /// Build options from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build options through an arbitrary variable lookup
    ///
    /// The server domain is required. Google Drive recovery is selected when
    /// a Drive access token is present, unless a recovery name is given.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let domain = lookup(env_vars::SERVER_DOMAIN).ok_or_else(|| {
            Error::Configuration(format!("{} is not set", env_vars::SERVER_DOMAIN))
        })?;
        let mut options = Self::new(
            RpcConfig::from_lookup(&lookup).into_urls(),
            ServerEndpoints::from_domain(&domain)?,
        );

        if let Some(tank) = lookup(env_vars::GAS_TANK) {
            options.gas_tank_name = tank;
        }
        if let Some(store) = lookup(env_vars::STORE) {
            options.store = store.parse()?;
        }
        options.recovery = match lookup(env_vars::RECOVERY) {
            Some(name) => name.parse()?,
            None if lookup(env_vars::DRIVE_ACCESS_TOKEN).is_some() => {
                RecoveryConfig::GoogleDrive(GoogleDriveOptions::default())
            }
            None => RecoveryConfig::Disabled,
        };
        if let Some(chain) = lookup(env_vars::DEFAULT_CHAIN) {
            options.default_chain_id = chain.trim().parse().map_err(|_| {
                Error::Configuration(format!("{} is not a chain id: {}", env_vars::DEFAULT_CHAIN, chain))
            })?;
        }

        options.validate()?;
        Ok(options)
    }

    /// Load options from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
        let options: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_urls.is_empty() {
            return Err(Error::Configuration("No RPC URLs configured".to_string()));
        }
        for (chain_id, url) in &self.rpc_urls {
            SupportedChain::lookup(*chain_id)?;
            Url::parse(url).map_err(|e| {
                Error::Configuration(format!("Invalid RPC URL for chain {}: {}", chain_id, e))
            })?;
        }
        if !self.rpc_urls.contains_key(&self.default_chain_id) {
            return Err(Error::Configuration(format!(
                "No RPC URL for default chain {}",
                self.default_chain_id
            )));
        }
        if self.gas_tank_name.trim().is_empty() {
            return Err(Error::Configuration("Gas tank name is empty".to_string()));
        }
        if self.receipt_polling.interval_ms == 0 {
            return Err(Error::Configuration(
                "Receipt polling interval must be positive".to_string(),
            ));
        }
        self.server.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn options_deserialize_defaults() {
        let value = serde_json::json!({
            "rpc_urls": { "137": "https://polygon-rpc.com" },
            "server": ServerEndpoints::from_domain("zero.example.org").unwrap()
        });
        let parsed: ConnectorOptions = serde_json::from_value(value).expect("parse options");

        assert_eq!(parsed.default_chain_id, ids::POLYGON);
        assert_eq!(parsed.gas_tank_name, DEFAULT_GAS_TANK);
        assert_eq!(parsed.connect_policy, ConnectPolicy::Reject);
        assert_eq!(parsed.backup_failure_policy, BackupFailurePolicy::Warn);
        assert_eq!(parsed.recovery, RecoveryConfig::Disabled);
        assert_eq!(parsed.receipt_polling, ReceiptPolling::default());
        parsed.validate().unwrap();
    }

    #[test]
    fn options_deserialize_explicit() {
        let value = serde_json::json!({
            "rpc_urls": { "5": "https://rpc.ankr.com/eth_goerli" },
            "default_chain_id": 5,
            "store": { "type": "memory" },
            "recovery": { "type": "google_drive", "allow_multi_keys": false },
            "server": ServerEndpoints::from_domain("https://zero.example.org/").unwrap(),
            "gas_tank_name": "tank",
            "connect_policy": "reuse",
            "backup_failure_policy": "fail",
            "receipt_polling": { "interval_ms": 250, "max_attempts": 3 }
        });
        let parsed: ConnectorOptions = serde_json::from_value(value).expect("parse options");

        assert_eq!(parsed.store, StoreConfig::Memory);
        assert_eq!(parsed.connect_policy, ConnectPolicy::Reuse);
        assert_eq!(parsed.backup_failure_policy, BackupFailurePolicy::Fail);
        assert_eq!(parsed.receipt_polling.max_attempts, Some(3));
        match parsed.recovery {
            RecoveryConfig::GoogleDrive(drive) => {
                assert!(!drive.allow_multi_keys);
                assert_eq!(drive.folder_name, ".zero-wallet");
            }
            other => panic!("unexpected recovery {:?}", other),
        }
    }

    #[test]
    fn endpoints_from_domain() {
        let endpoints = ServerEndpoints::from_domain("zero.example.org").unwrap();
        assert_eq!(endpoints.nonce_provider, "https://zero.example.org/api/auth/nonce");
        assert_eq!(endpoints.gas_station, "https://zero.example.org/api/tx/send");
        endpoints.validate().unwrap();

        let local = ServerEndpoints::from_domain("http://localhost:3000/").unwrap();
        assert_eq!(local.scw_deployer, "http://localhost:3000/api/scw/deploy");
    }

    #[test]
    fn endpoints_reject_non_http_scheme() {
        let mut endpoints = ServerEndpoints::from_domain("zero.example.org").unwrap();
        endpoints.authorizer = "ftp://zero.example.org/authorize".to_string();
        assert!(matches!(endpoints.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn validate_rejects_unknown_chain() {
        let mut urls = BTreeMap::new();
        urls.insert(1, "https://eth.llamarpc.com".to_string());
        let mut options =
            ConnectorOptions::new(urls, ServerEndpoints::from_domain("zero.example.org").unwrap());
        options.default_chain_id = 1;

        assert!(matches!(options.validate(), Err(Error::UnsupportedChain(1))));
    }

    #[test]
    fn validate_requires_default_chain_url() {
        let mut urls = BTreeMap::new();
        urls.insert(ids::CELO, "https://forno.celo.org".to_string());
        let options =
            ConnectorOptions::new(urls, ServerEndpoints::from_domain("zero.example.org").unwrap());

        assert!(matches!(options.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn from_env_requires_server_domain() {
        assert!(matches!(
            ConnectorOptions::from_lookup(lookup_from(&[])),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn from_env_reads_overrides() {
        let options = ConnectorOptions::from_lookup(lookup_from(&[
            (env_vars::SERVER_DOMAIN, "zero.example.org"),
            (env_vars::GAS_TANK, "tank-1"),
            (env_vars::STORE, "memory"),
            (env_vars::DRIVE_ACCESS_TOKEN, "ya29.token"),
            (env_vars::DEFAULT_CHAIN, "42220"),
        ]))
        .unwrap();

        assert_eq!(options.gas_tank_name, "tank-1");
        assert_eq!(options.store, StoreConfig::Memory);
        assert_eq!(options.default_chain_id, ids::CELO);
        assert!(matches!(options.recovery, RecoveryConfig::GoogleDrive(_)));
        assert_eq!(options.rpc_urls.len(), SupportedChain::all().len());
    }

    #[test]
    fn from_env_rejects_unknown_store() {
        let result = ConnectorOptions::from_lookup(lookup_from(&[
            (env_vars::SERVER_DOMAIN, "zero.example.org"),
            (env_vars::STORE, "indexeddb"),
        ]));
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
