//! Zero Wallet
//!
//! A locally held key that controls a smart-contract wallet (SCW) on several
//! EVM chains. Transactions are built by a remote service, signed here with
//! EIP-712 and relayed by a fee-sponsoring gas station:
//! - Key lifecycle: load, recover or create, then persist in a key store
//! - One chain-aware JSON-RPC provider per configured chain
//! - Relayed transaction pipeline: nonce, build, sign, relay, confirm
//! - Pluggable key recovery (Google Drive)
//!
//! # Security Model
//!
//! - The private key lives in `wallet::WalletKey` and is never logged
//! - It leaves that type only as a `SecretString`, for the store or a backup
//! - The client never broadcasts transactions; the relay does

pub mod chains;
pub mod config;
pub mod connector;
pub mod provider;
pub mod recovery;
pub mod server;
pub mod store;
pub mod wallet;

mod error;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use chains::{ChainContext, SupportedChain};
pub use config::{ConnectorOptions, RpcConfig, ServerEndpoints};
pub use connector::{ConnectData, ConnectorEvent, KeyOrigin, ZeroWalletConnector};
pub use error::{Error, RemoteError, Result, RpcError};
pub use provider::ZeroWalletProvider;
pub use wallet::{WalletKey, ZeroWalletSigner};
