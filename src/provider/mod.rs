//! Chain-aware JSON-RPC provider
//!
//! One provider is built per configured chain. It answers identity queries
//! from its bound `ChainContext` (never from the node), memoizes
//! `eth_chainId`/`eth_blockNumber` within a scheduler tick, and hands out
//! signers sharing its store and wallet-server handles.

mod cache;
mod transport;

use crate::chains::{ChainContext, SupportedChain};
use crate::config::ReceiptPolling;
use crate::server::SharedServer;
use crate::store::{self, SharedStore};
use crate::wallet::{WalletKey, ZeroWalletSigner};
use crate::{Error, Result, RpcError};
use alloy::primitives::{Address, B256, U128, U64};
use alloy::rpc::types::{Transaction, TransactionRequest};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

pub use cache::{is_cacheable, CACHEABLE_METHODS};
pub use transport::{HttpTransport, JsonRpcRequest, RpcTransport};

use cache::TickMemo;

/// Priority fee suggested on EIP-1559 networks (1.5 gwei)
pub const DEFAULT_PRIORITY_FEE: u128 = 1_500_000_000;

const EVENT_CAPACITY: usize = 256;

/// Handles every signer built from a provider shares
#[derive(Clone)]
pub struct WalletServices {
    pub store: SharedStore,
    pub server: SharedServer,
    pub gas_tank_name: String,
    pub receipt_polling: ReceiptPolling,
}

/// RPC traffic, published for tracing
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Request {
        id: u64,
        method: String,
        params: Value,
        at: DateTime<Utc>,
    },
    Response {
        id: u64,
        method: String,
        result: Value,
        /// Served from the per-tick memo
        cached: bool,
        at: DateTime<Utc>,
    },
    Error {
        id: u64,
        method: String,
        error: RpcError,
        at: DateTime<Utc>,
    },
}

/// Fee suggestion for locally populated transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeeData {
    pub gas_price: Option<u128>,
    pub last_base_fee_per_gas: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

impl FeeData {
    /// Derive EIP-1559 fields from the latest block's base fee
    pub fn from_base_fee(gas_price: Option<u128>, base_fee: Option<u128>) -> Self {
        match base_fee {
            Some(base) => Self {
                gas_price,
                last_base_fee_per_gas: Some(base),
                max_fee_per_gas: Some(base.saturating_mul(2).saturating_add(DEFAULT_PRIORITY_FEE)),
                max_priority_fee_per_gas: Some(DEFAULT_PRIORITY_FEE),
            },
            None => Self {
                gas_price,
                ..Self::default()
            },
        }
    }

    pub fn supports_eip1559(&self) -> bool {
        self.max_fee_per_gas.is_some() && self.max_priority_fee_per_gas.is_some()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockFees {
    #[serde(default)]
    base_fee_per_gas: Option<U128>,
}

pub struct ZeroWalletProvider {
    transport: Arc<dyn RpcTransport>,
    network: RwLock<ChainContext>,
    services: WalletServices,
    memo: TickMemo,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl ZeroWalletProvider {
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        network: ChainContext,
        services: WalletServices,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            network: RwLock::new(network),
            services,
            memo: TickMemo::new(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Provider posting to `url` over HTTP
    pub fn http(url: &str, network: ChainContext, services: WalletServices) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(url)?), network, services))
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    pub fn services(&self) -> &WalletServices {
        &self.services
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }

    /// The bound chain identity; no node round trip
    pub async fn network(&self) -> ChainContext {
        self.network.read().await.clone()
    }

    /// Rebind this provider to another known chain
    ///
    /// Unknown ids fail with `UnsupportedChain` and leave the binding as is.
    pub async fn switch_network(&self, chain_id: u64) -> Result<ChainContext> {
        let chain = SupportedChain::lookup(chain_id)?;
        let mut network = self.network.write().await;
        *network = ChainContext::from(chain);
        tracing::info!(chain_id = chain_id, name = chain.name(), "Switched network");
        Ok(network.clone())
    }

    /// Raw JSON-RPC call
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id = id, method = method, "JSON-RPC request");
        self.emit(ProviderEvent::Request {
            id,
            method: method.to_string(),
            params: params.clone(),
            at: Utc::now(),
        });

        let request = JsonRpcRequest::new(id, method, params);
        let (outcome, cached) = if is_cacheable(method) {
            let transport = Arc::clone(&self.transport);
            self.memo
                .call(method, move || {
                    async move { transport.request(request).await }.boxed()
                })
                .await
        } else {
            (self.transport.request(request).await, false)
        };

        match outcome {
            Ok(result) => {
                tracing::debug!(id = id, method = method, cached = cached, "JSON-RPC response");
                self.emit(ProviderEvent::Response {
                    id,
                    method: method.to_string(),
                    result: result.clone(),
                    cached,
                    at: Utc::now(),
                });
                Ok(result)
            }
            Err(error) => {
                tracing::debug!(id = id, method = method, error = %error, "JSON-RPC error");
                self.emit(ProviderEvent::Error {
                    id,
                    method: method.to_string(),
                    error: error.clone(),
                    at: Utc::now(),
                });
                Err(Error::RpcTransport(error))
            }
        }
    }

    fn emit(&self, event: ProviderEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Chain id reported by the node
    pub async fn chain_id(&self) -> Result<u64> {
        let value: U64 = serde_json::from_value(self.send("eth_chainId", json!([])).await?)?;
        Ok(value.to::<u64>())
    }

    pub async fn block_number(&self) -> Result<u64> {
        let value: U64 = serde_json::from_value(self.send("eth_blockNumber", json!([])).await?)?;
        Ok(value.to::<u64>())
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let value: U128 = serde_json::from_value(self.send("eth_gasPrice", json!([])).await?)?;
        Ok(value.to::<u128>())
    }

    /// Current fee suggestion
    ///
    /// A failing `eth_gasPrice` leaves `gas_price` empty rather than failing.
    pub async fn fee_data(&self) -> Result<FeeData> {
        let block = self
            .send("eth_getBlockByNumber", json!(["latest", false]))
            .await?;
        let base_fee = if block.is_null() {
            None
        } else {
            serde_json::from_value::<BlockFees>(block)?
                .base_fee_per_gas
                .map(|fee| fee.to::<u128>())
        };

        let gas_price = match self.gas_price().await {
            Ok(price) => Some(price),
            Err(e) => {
                tracing::debug!(error = %e, "eth_gasPrice failed");
                None
            }
        };

        Ok(FeeData::from_base_fee(gas_price, base_fee))
    }

    pub async fn transaction_count(&self, address: Address, block_tag: &str) -> Result<u64> {
        let value: U64 = serde_json::from_value(
            self.send("eth_getTransactionCount", json!([address, block_tag]))
                .await?,
        )?;
        Ok(value.to::<u64>())
    }

    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let value: U64 = serde_json::from_value(self.send("eth_estimateGas", json!([tx])).await?)?;
        Ok(value.to::<u64>())
    }

    /// `None` while the node does not know the hash
    pub async fn get_transaction(&self, hash: B256) -> Result<Option<Transaction>> {
        let value = self.send("eth_getTransactionByHash", json!([hash])).await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Poll until `hash` is included in a block
    pub async fn wait_for_transaction(
        &self,
        hash: B256,
        polling: &ReceiptPolling,
    ) -> Result<Transaction> {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            if let Some(tx) = self.get_transaction(hash).await? {
                if tx.block_number.is_some() {
                    tracing::debug!(tx_hash = %hash, attempts = attempts, "Transaction mined");
                    return Ok(tx);
                }
            }
            if polling.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(Error::NotMined(hash));
            }
            tokio::time::sleep(Duration::from_millis(polling.interval_ms)).await;
        }
    }

    /// Signer for the key currently in the store
    ///
    /// A missing key is not an error here; the signer reports
    /// `UninitializedWallet` when the key is first needed.
    pub async fn get_signer(self: &Arc<Self>) -> Result<ZeroWalletSigner> {
        let key = match self.services.store.get(store::PRIVATE_KEY).await? {
            Some(hex) => Some(WalletKey::from_hex(&hex)?),
            None => None,
        };
        Ok(ZeroWalletSigner::new(Arc::clone(self), key))
    }
}

impl std::fmt::Debug for ZeroWalletProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZeroWalletProvider")
            .field("url", &self.transport.url())
            .field("gas_tank_name", &self.services.gas_tank_name)
            .finish_non_exhaustive()
    }
}
