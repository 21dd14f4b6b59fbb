//! Account signer
//!
//! Bound to one provider. Owns a working copy of the wallet key for the
//! session and drives the relayed transaction pipeline:
//!
//! `Idle -> NonceRequested -> TxBuilt -> Signed -> Submitted -> Confirmed`
//!
//! Any step failing aborts the pipeline; nothing is retried. Concurrent
//! `send_transaction` calls on one signer are not serialized, so callers that
//! care about nonce ordering must await one send before starting the next.

use super::key::signature_hex;
use super::typed_data::{wallet_tx_domain, WalletTx};
use super::WalletKey;
use crate::chains::ChainContext;
use crate::provider::ZeroWalletProvider;
use crate::server::{
    AccountRequest, BuildTransactionRequest, BuiltTransaction, DeployRequest, RelayRequest,
    SignedNonce, TransactionCall, WebHookAttributes,
};
use crate::{Error, Result, RpcError};
use alloy::dyn_abi::TypedData;
use alloy::primitives::{eip191_hash_message, Address, B256};
use alloy::rpc::types::{Transaction, TransactionRequest};
use std::fmt;
use std::sync::Arc;

/// Progress of one relayed send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    NonceRequested,
    TxBuilt,
    Signed,
    Submitted,
    Confirmed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::NonceRequested => "nonce_requested",
            PipelineStage::TxBuilt => "tx_built",
            PipelineStage::Signed => "signed",
            PipelineStage::Submitted => "submitted",
            PipelineStage::Confirmed => "confirmed",
        };
        f.write_str(name)
    }
}

/// A built and signed wallet transaction, ready for the relay
#[derive(Debug, Clone, PartialEq)]
pub struct RelayedTransaction {
    /// Server nonce authenticating the build and relay calls
    pub nonce: String,
    pub built: BuiltTransaction,
    /// EIP-712 signature over `built.safe_tx_body`
    pub signature: String,
    pub chain_id: u64,
}

impl RelayedTransaction {
    pub fn scw_address(&self) -> Address {
        self.built.scw_address
    }
}

pub struct ZeroWalletSigner {
    provider: Arc<ZeroWalletProvider>,
    key: Option<WalletKey>,
}

impl ZeroWalletSigner {
    pub fn new(provider: Arc<ZeroWalletProvider>, key: Option<WalletKey>) -> Self {
        Self { provider, key }
    }

    pub fn provider(&self) -> &Arc<ZeroWalletProvider> {
        &self.provider
    }

    pub fn key(&self) -> Result<&WalletKey> {
        self.key.as_ref().ok_or(Error::UninitializedWallet)
    }

    /// Address derived from the loaded key
    pub fn address(&self) -> Result<Address> {
        Ok(self.key()?.address())
    }

    pub async fn network(&self) -> ChainContext {
        self.provider.network().await
    }

    /// Chain id of the bound network
    pub async fn chain_id(&self) -> u64 {
        self.provider.network().await.chain_id
    }

    /// EIP-191 signature over UTF-8 text or raw bytes
    pub fn sign_message(&self, message: impl AsRef<[u8]>) -> Result<String> {
        let signature = self.key()?.sign_message(message.as_ref())?;
        Ok(signature_hex(&signature))
    }

    pub fn sign_typed_data(&self, typed_data: &TypedData) -> Result<String> {
        let signature = self.key()?.sign_typed_data(typed_data)?;
        Ok(signature_hex(&signature))
    }

    /// EIP-712 `WalletTx` signature, domain `{verifyingContract: scw, chainId}`
    pub fn sign_wallet_transaction(&self, built: &BuiltTransaction, chain_id: u64) -> Result<String> {
        let tx = WalletTx::from(&built.safe_tx_body);
        let domain = wallet_tx_domain(built.scw_address, chain_id);
        let signature = self.key()?.sign_typed(&tx, &domain)?;
        Ok(signature_hex(&signature))
    }

    fn account_request(&self) -> Result<AccountRequest> {
        Ok(AccountRequest {
            zero_wallet_address: self.address()?,
            gas_tank_name: self.provider.services().gas_tank_name.clone(),
        })
    }

    /// Next server nonce for this account
    pub async fn fetch_nonce(&self) -> Result<String> {
        let request = self.account_request()?;
        let response = self
            .provider
            .services()
            .server
            .nonce(&request)
            .await
            .map_err(Error::NonceFetch)?;
        Ok(response.nonce)
    }

    /// Ask the server for a fresh nonce once the current one is spent
    pub async fn refresh_nonce(&self) -> Result<String> {
        let request = self.account_request()?;
        let response = self
            .provider
            .services()
            .server
            .refresh_nonce(&request)
            .await
            .map_err(Error::NonceFetch)?;
        Ok(response.nonce)
    }

    /// Sign `nonce` so the server can authenticate the call
    pub fn webhook_attributes(
        &self,
        nonce: &str,
        to: Option<Address>,
        chain_id: Option<u64>,
    ) -> Result<WebHookAttributes> {
        let signature = self.key()?.sign_message(nonce.as_bytes())?;
        Ok(WebHookAttributes {
            nonce: nonce.to_string(),
            signed_nonce: SignedNonce::new(eip191_hash_message(nonce), &signature),
            to,
            chain_id,
        })
    }

    /// Have the server build the wallet transaction for `call`
    pub async fn build_transaction(
        &self,
        call: &TransactionCall,
        nonce: &str,
        chain_id: u64,
    ) -> Result<BuiltTransaction> {
        let request = BuildTransactionRequest {
            zero_wallet_address: self.address()?,
            gas_tank_name: self.provider.services().gas_tank_name.clone(),
            chain_id,
            tx: call.clone(),
            web_hook_attributes: self.webhook_attributes(nonce, Some(call.to), Some(chain_id))?,
        };
        self.provider
            .services()
            .server
            .build_transaction(&request)
            .await
            .map_err(Error::TransactionBuild)
    }

    /// Nonce, build and sign; nothing is submitted
    pub async fn prepare_transaction(&self, call: &TransactionCall) -> Result<RelayedTransaction> {
        let mut stage = PipelineStage::Idle;
        self.prepare(call, &mut stage).await
    }

    async fn prepare(
        &self,
        call: &TransactionCall,
        stage: &mut PipelineStage,
    ) -> Result<RelayedTransaction> {
        validate_call(call)?;
        self.key()?;
        let chain_id = self.chain_id().await;

        let nonce = self.fetch_nonce().await?;
        advance(stage, PipelineStage::NonceRequested);

        let built = self.build_transaction(call, &nonce, chain_id).await?;
        advance(stage, PipelineStage::TxBuilt);

        let signature = self.sign_wallet_transaction(&built, chain_id)?;
        advance(stage, PipelineStage::Signed);

        Ok(RelayedTransaction {
            nonce,
            built,
            signature,
            chain_id,
        })
    }

    /// Hand a signed wallet transaction to the gas station
    pub async fn submit(&self, relayed: &RelayedTransaction) -> Result<B256> {
        let request = RelayRequest {
            exec_transaction_body: relayed.built.safe_tx_body.clone(),
            signature: relayed.signature.clone(),
            zero_wallet_address: self.address()?,
            scw_address: relayed.scw_address(),
            gas_tank_name: self.provider.services().gas_tank_name.clone(),
            chain_id: relayed.chain_id,
            web_hook_attributes: self.webhook_attributes(
                &relayed.nonce,
                Some(relayed.built.safe_tx_body.to),
                Some(relayed.chain_id),
            )?,
        };
        let response = self
            .provider
            .services()
            .server
            .relay(&request)
            .await
            .map_err(Error::RelaySubmission)?;
        Ok(response.tx_hash)
    }

    /// Run the full relayed pipeline and wait for the transaction to be mined
    ///
    /// A failure after the relay accepted the transaction is reported as
    /// `Error::Confirmation`, which carries the hash for manual tracking.
    pub async fn send_transaction(&self, call: TransactionCall) -> Result<Transaction> {
        let mut stage = PipelineStage::Idle;
        let result = self.run_pipeline(&call, &mut stage).await;
        if let Err(e) = &result {
            tracing::debug!(stage = %stage, error = %e, "Relayed transaction failed");
        }
        result
    }

    async fn run_pipeline(
        &self,
        call: &TransactionCall,
        stage: &mut PipelineStage,
    ) -> Result<Transaction> {
        let relayed = self.prepare(call, stage).await?;

        let tx_hash = self.submit(&relayed).await?;
        advance(stage, PipelineStage::Submitted);
        tracing::info!(
            tx_hash = %tx_hash,
            scw = %relayed.scw_address(),
            chain_id = relayed.chain_id,
            "Transaction relayed"
        );

        let polling = self.provider.services().receipt_polling;
        let mined = self
            .provider
            .wait_for_transaction(tx_hash, &polling)
            .await
            .map_err(|source| Error::Confirmation {
                tx_hash,
                source: Box::new(source),
            })?;
        advance(stage, PipelineStage::Confirmed);
        Ok(mined)
    }

    /// Whether the authorizer accepts this account for its SCW
    ///
    /// A response without the `authorize` field is `false`, not an error.
    pub async fn authorize(&self) -> Result<bool> {
        let request = self.account_request()?;
        let response = self
            .provider
            .services()
            .server
            .authorize(&request)
            .await
            .map_err(Error::Remote)?;
        Ok(response.authorize.is_some())
    }

    /// Ask the deployer to deploy this account's SCW
    ///
    /// A rejection is returned as `Error::Remote` with the service's payload.
    pub async fn deploy_scw(&self) -> Result<()> {
        let chain_id = self.chain_id().await;
        let nonce = self.fetch_nonce().await?;
        let request = DeployRequest {
            zero_wallet_address: self.address()?,
            gas_tank_name: self.provider.services().gas_tank_name.clone(),
            chain_id,
            web_hook_attributes: self.webhook_attributes(&nonce, None, None)?,
        };
        self.provider
            .services()
            .server
            .deploy_scw(&request)
            .await
            .map_err(Error::Remote)?;
        tracing::info!(chain_id = chain_id, "SCW deployment requested");
        Ok(())
    }

    /// Validate and complete an ordinary (non-relayed) transaction
    ///
    /// Local checks run before any RPC call. Missing fees, nonce, gas limit
    /// and chain id are filled from the node.
    pub async fn populate_transaction(&self, mut tx: TransactionRequest) -> Result<TransactionRequest> {
        let address = self.address()?;
        let chain_id = self.chain_id().await;
        check_transaction(&tx, address, chain_id)?;
        tx.from = Some(address);

        let has_eip1559 = tx.max_fee_per_gas.is_some() || tx.max_priority_fee_per_gas.is_some();
        match tx.transaction_type {
            None | Some(2) if tx.max_fee_per_gas.is_some() && tx.max_priority_fee_per_gas.is_some() => {
                tx.transaction_type = Some(2);
            }
            Some(0) | Some(1) => {
                if tx.gas_price.is_none() {
                    tx.gas_price = Some(self.provider.gas_price().await?);
                }
            }
            Some(2) => {
                let fees = self.provider.fee_data().await?;
                tx.max_fee_per_gas = tx.max_fee_per_gas.or(fees.max_fee_per_gas);
                tx.max_priority_fee_per_gas =
                    tx.max_priority_fee_per_gas.or(fees.max_priority_fee_per_gas);
            }
            // Other explicit types carry their own fee fields
            Some(_) => {}
            None => {
                let fees = self.provider.fee_data().await?;
                if fees.supports_eip1559() {
                    tx.transaction_type = Some(2);
                    if let Some(gas_price) = tx.gas_price.take() {
                        // Legacy price on an EIP-1559 network caps both fields
                        tx.max_fee_per_gas = Some(gas_price);
                        tx.max_priority_fee_per_gas = Some(gas_price);
                    } else {
                        tx.max_fee_per_gas = tx.max_fee_per_gas.or(fees.max_fee_per_gas);
                        tx.max_priority_fee_per_gas =
                            tx.max_priority_fee_per_gas.or(fees.max_priority_fee_per_gas);
                    }
                } else if let Some(gas_price) = fees.gas_price {
                    if has_eip1559 {
                        return Err(Error::InvalidTransaction(
                            "network does not support EIP-1559".to_string(),
                        ));
                    }
                    tx.gas_price = tx.gas_price.or(Some(gas_price));
                    tx.transaction_type = Some(0);
                } else {
                    return Err(Error::RpcTransport(RpcError::transport(
                        "failed to get consistent fee data",
                    )));
                }
            }
        }

        if tx.nonce.is_none() {
            tx.nonce = Some(self.provider.transaction_count(address, "pending").await?);
        }
        if tx.gas.is_none() {
            tx.gas = Some(self.provider.estimate_gas(&tx).await?);
        }
        if tx.chain_id.is_none() {
            tx.chain_id = Some(chain_id);
        }
        Ok(tx)
    }
}

impl fmt::Debug for ZeroWalletSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZeroWalletSigner")
            .field("address", &self.key.as_ref().map(WalletKey::address))
            .field("provider", &self.provider)
            .finish()
    }
}

fn advance(stage: &mut PipelineStage, next: PipelineStage) {
    tracing::debug!(from = %stage, to = %next, "Pipeline stage");
    *stage = next;
}

fn validate_call(call: &TransactionCall) -> Result<()> {
    if call.gas_limit == Some(0) {
        return Err(Error::InvalidTransaction("gas limit must be positive".to_string()));
    }
    Ok(())
}

/// Checks that need no network access
fn check_transaction(tx: &TransactionRequest, address: Address, chain_id: u64) -> Result<()> {
    if let Some(from) = tx.from {
        if from != address {
            return Err(Error::InvalidTransaction("from address mismatch".to_string()));
        }
    }

    let has_eip1559 = tx.max_fee_per_gas.is_some() || tx.max_priority_fee_per_gas.is_some();
    if tx.gas_price.is_some() && (tx.transaction_type == Some(2) || has_eip1559) {
        return Err(Error::InvalidTransaction(
            "eip-1559 transaction do not support gasPrice".to_string(),
        ));
    }
    if matches!(tx.transaction_type, Some(0) | Some(1)) && has_eip1559 {
        return Err(Error::InvalidTransaction(
            "pre-eip-1559 transaction do not support maxFeePerGas/maxPriorityFeePerGas".to_string(),
        ));
    }

    if let Some(tx_chain_id) = tx.chain_id {
        if tx_chain_id != chain_id {
            return Err(Error::InvalidTransaction(format!(
                "chainId mismatch: transaction {} but network {}",
                tx_chain_id, chain_id
            )));
        }
    }
    Ok(())
}
