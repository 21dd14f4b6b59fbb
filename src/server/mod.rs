//! Remote wallet services
//!
//! The zero-wallet server exposes six JSON endpoints: nonce provider, nonce
//! refresher, transaction builder, gas station (relay), authorizer and SCW
//! deployer. They are opaque collaborators; this module defines the wire
//! types and the `WalletServer` trait the signer talks to, with
//! `HttpWalletServer` as the reqwest-backed implementation.

mod http;

use crate::wallet::WalletTxBody;
use crate::RemoteError;
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::Signature;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub use http::HttpWalletServer;

/// Server nonce signed by the wallet key, authenticating a webhook call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedNonce {
    /// EIP-191 hash of the nonce message
    pub transaction_hash: B256,
    pub r: B256,
    pub s: B256,
    pub v: u8,
}

impl SignedNonce {
    pub fn new(message_hash: B256, signature: &Signature) -> Self {
        Self {
            transaction_hash: message_hash,
            r: B256::from(signature.r().to_be_bytes::<32>()),
            s: B256::from(signature.s().to_be_bytes::<32>()),
            v: 27 + u8::from(signature.v()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebHookAttributes {
    pub nonce: String,
    pub signed_nonce: SignedNonce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
}

/// Body for the nonce provider, nonce refresher and authorizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountRequest {
    pub zero_wallet_address: Address,
    pub gas_tank_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceResponse {
    pub nonce: String,
}

/// The application-level call the SCW should perform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTransactionRequest {
    pub zero_wallet_address: Address,
    pub gas_tank_name: String,
    pub chain_id: u64,
    pub tx: TransactionCall,
    pub web_hook_attributes: WebHookAttributes,
}

/// Transaction builder response: the canonical body to sign and the SCW
/// that will execute it
///
/// `scwAddress` must be a full 20-byte hex address. A shortened value such as
/// `"0x123"` does not decode, and the signer reports it as a build failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltTransaction {
    pub safe_tx_body: WalletTxBody,
    pub scw_address: Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub exec_transaction_body: WalletTxBody,
    /// `0x`-prefixed EIP-712 signature over `exec_transaction_body`
    pub signature: String,
    pub zero_wallet_address: Address,
    pub scw_address: Address,
    pub gas_tank_name: String,
    pub chain_id: u64,
    pub web_hook_attributes: WebHookAttributes,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayResponse {
    pub tx_hash: B256,
}

/// Authorizer response; the presence of `authorize` signals success
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct AuthorizeResponse {
    #[serde(default)]
    pub authorize: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployRequest {
    pub zero_wallet_address: Address,
    pub gas_tank_name: String,
    pub chain_id: u64,
    pub web_hook_attributes: WebHookAttributes,
}

/// Client for the zero-wallet server
///
/// Every method maps to one endpoint. Failures carry the service's own
/// error payload untouched.
#[async_trait]
pub trait WalletServer: Send + Sync {
    async fn nonce(&self, request: &AccountRequest) -> Result<NonceResponse, RemoteError>;

    async fn refresh_nonce(&self, request: &AccountRequest) -> Result<NonceResponse, RemoteError>;

    async fn build_transaction(
        &self,
        request: &BuildTransactionRequest,
    ) -> Result<BuiltTransaction, RemoteError>;

    async fn relay(&self, request: &RelayRequest) -> Result<RelayResponse, RemoteError>;

    async fn authorize(&self, request: &AccountRequest) -> Result<AuthorizeResponse, RemoteError>;

    async fn deploy_scw(&self, request: &DeployRequest) -> Result<(), RemoteError>;

    /// Name for logging
    fn name(&self) -> &'static str;
}

pub type SharedServer = Arc<dyn WalletServer>;
