//! Error types for the zero wallet

use alloy::primitives::B256;
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC error payload (`{ code, message, data }`)
///
/// Cloneable so a memoized in-flight call can hand the same failure to every
/// caller that joined it.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("JSON-RPC error {code}: {message}")]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl RpcError {
    /// Code used when the request never produced a JSON-RPC response
    pub const TRANSPORT_CODE: i64 = -32603;

    pub fn new(code: i64, message: impl Into<String>, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.into(),
            data,
        }
    }

    /// Failure below the JSON-RPC layer (connection refused, bad status, ...)
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(Self::TRANSPORT_CODE, message, None)
    }
}

/// Failure reported by one of the remote wallet services
///
/// The payload is kept exactly as the service sent it so callers see the
/// service's own diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
    pub payload: Option<Value>,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            payload: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "remote service error (HTTP {}): {}", status, self.message),
            None => write!(f, "remote service error: {}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Zero Wallet is not initialized yet")]
    UninitializedWallet,

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("RPC transport error: {0}")]
    RpcTransport(#[from] RpcError),

    #[error("Unsupported chain id: {0}")]
    UnsupportedChain(u64),

    #[error("Invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("Nonce fetch failed: {0}")]
    NonceFetch(RemoteError),

    #[error("Transaction build failed: {0}")]
    TransactionBuild(RemoteError),

    #[error("Relay submission failed: {0}")]
    RelaySubmission(RemoteError),

    #[error("{0}")]
    Remote(RemoteError),

    #[error("Recovery backup failed: {0}")]
    RecoveryBackupFailed(String),

    #[error("No recoverable key found: {0}")]
    RecoveryNotFound(String),

    #[error("Recovery denied: {0}")]
    RecoveryDenied(String),

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Wallet is already connected")]
    AlreadyConnected,

    #[error("Wallet is not connected")]
    NotConnected,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Transaction {tx_hash} was relayed but could not be confirmed: {source}")]
    Confirmation {
        tx_hash: B256,
        #[source]
        source: Box<Error>,
    },

    #[error("Transaction {0} was not mined within the polling window")]
    NotMined(B256),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Hash of the relayed transaction, when the failure happened after the
    /// relay accepted it
    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            Error::Confirmation { tx_hash, .. } => Some(*tx_hash),
            Error::NotMined(hash) => Some(*hash),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_error_keeps_hash() {
        let hash = B256::repeat_byte(0xab);
        let err = Error::Confirmation {
            tx_hash: hash,
            source: Box::new(Error::RpcTransport(RpcError::transport("timeout"))),
        };

        assert_eq!(err.tx_hash(), Some(hash));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_remote_error_display_includes_status() {
        let err = RemoteError::new("gas tank empty").with_status(402);
        assert_eq!(err.to_string(), "remote service error (HTTP 402): gas tank empty");
        assert_eq!(
            RemoteError::new("boom").to_string(),
            "remote service error: boom"
        );
    }
}
