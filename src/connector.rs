//! Session lifecycle
//!
//! The connector owns one provider per configured chain, the key store and
//! the recovery mechanism. Hosts drive it through `connect`, `disconnect`
//! and `switch_chain`, and observe it through `subscribe`.

use crate::chains::{ChainContext, SupportedChain};
use crate::config::{BackupFailurePolicy, ConnectPolicy, ConnectorOptions};
use crate::provider::{HttpTransport, RpcTransport, WalletServices, ZeroWalletProvider};
use crate::recovery::SharedRecovery;
use crate::server::{HttpWalletServer, SharedServer};
use crate::store::{self, SharedStore};
use crate::wallet::{WalletKey, ZeroWalletSigner};
use crate::{Error, Result};
use alloy::primitives::Address;
use secrecy::ExposeSecret;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

const EVENT_CAPACITY: usize = 64;

/// Chain identity as reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChainInfo {
    pub id: u64,
    pub unsupported: bool,
}

impl ChainInfo {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            unsupported: SupportedChain::from_chain_id(id).is_none(),
        }
    }
}

/// Where the session key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum KeyOrigin {
    /// Read from the key store
    Loaded,
    /// Retrieved through the recovery mechanism
    Recovered,
    /// Freshly generated; `backed_up` is false when the backup failed
    Created { backed_up: bool },
}

#[derive(Debug, Clone)]
pub struct ConnectData {
    pub account: Address,
    pub chain: ChainInfo,
    pub key_origin: KeyOrigin,
    pub provider: Arc<ZeroWalletProvider>,
}

/// Change notification for the host framework
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectorEvent {
    Change {
        account: Option<Address>,
        chain: Option<ChainInfo>,
    },
    Disconnect,
}

struct Session {
    active_chain: u64,
    /// Working copy of the key while connected
    key: Option<WalletKey>,
}

pub struct ZeroWalletConnector {
    options: ConnectorOptions,
    providers: BTreeMap<u64, Arc<ZeroWalletProvider>>,
    store: SharedStore,
    recovery: SharedRecovery,
    session: RwLock<Session>,
    events: broadcast::Sender<ConnectorEvent>,
}

impl ZeroWalletConnector {
    /// Build the store, recovery mechanism, wallet server client and one
    /// HTTP provider per configured chain
    pub fn new(options: ConnectorOptions) -> Result<Self> {
        options.validate()?;
        let store = options.store.build();
        let recovery = options.recovery.build()?;
        let server: SharedServer = Arc::new(HttpWalletServer::new(options.server.clone()));

        let mut transports: BTreeMap<u64, Arc<dyn RpcTransport>> = BTreeMap::new();
        for (chain_id, url) in &options.rpc_urls {
            transports.insert(*chain_id, Arc::new(HttpTransport::new(url)?));
        }

        Self::with_services(options, store, recovery, server, transports)
    }

    /// Assemble a connector from already built collaborators
    pub fn with_services(
        options: ConnectorOptions,
        store: SharedStore,
        recovery: SharedRecovery,
        server: SharedServer,
        transports: BTreeMap<u64, Arc<dyn RpcTransport>>,
    ) -> Result<Self> {
        let services = WalletServices {
            store: store.clone(),
            server,
            gas_tank_name: options.gas_tank_name.clone(),
            receipt_polling: options.receipt_polling,
        };

        let mut providers = BTreeMap::new();
        for (chain_id, transport) in transports {
            let chain = SupportedChain::lookup(chain_id)?;
            let provider = ZeroWalletProvider::new(transport, ChainContext::from(chain), services.clone());
            providers.insert(chain_id, Arc::new(provider));
        }
        if !providers.contains_key(&options.default_chain_id) {
            return Err(Error::Configuration(format!(
                "No provider for default chain {}",
                options.default_chain_id
            )));
        }

        tracing::info!(
            chains = ?providers.keys().collect::<Vec<_>>(),
            default_chain = options.default_chain_id,
            store = options.store.name(),
            recovery = recovery.name(),
            "Zero wallet connector ready"
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            session: RwLock::new(Session {
                active_chain: options.default_chain_id,
                key: None,
            }),
            options,
            providers,
            store,
            recovery,
            events,
        })
    }

    pub fn options(&self) -> &ConnectorOptions {
        &self.options
    }

    pub fn recovery(&self) -> &SharedRecovery {
        &self.recovery
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectorEvent> {
        self.events.subscribe()
    }

    /// Chains with a configured provider
    pub fn chains(&self) -> impl Iterator<Item = &u64> {
        self.providers.keys()
    }

    /// Load, recover or create the wallet key and open a session
    pub async fn connect(&self) -> Result<ConnectData> {
        if self.is_authorized().await? {
            match self.options.connect_policy {
                ConnectPolicy::Reject => return Err(Error::AlreadyConnected),
                ConnectPolicy::Reuse => {
                    if let Some(key) = self.load_key().await? {
                        return self.open_session(key, KeyOrigin::Loaded).await;
                    }
                }
            }
        }

        let (key, origin) = self.acquire_key().await?;
        self.open_session(key, origin).await
    }

    async fn load_key(&self) -> Result<Option<WalletKey>> {
        match self.store.get(store::PRIVATE_KEY).await? {
            Some(hex) => Ok(Some(WalletKey::from_hex(&hex)?)),
            None => Ok(None),
        }
    }

    async fn acquire_key(&self) -> Result<(WalletKey, KeyOrigin)> {
        if let Some(key) = self.load_key().await? {
            return Ok((key, KeyOrigin::Loaded));
        }

        if self.recovery.is_recovery_ready() {
            match self.recovery.initiate_recovery(None).await {
                Ok(key) => {
                    tracing::info!(
                        address = %key.address(),
                        recovery = self.recovery.name(),
                        "Recovered wallet key"
                    );
                    return Ok((key, KeyOrigin::Recovered));
                }
                Err(Error::RecoveryNotFound(reason)) => {
                    tracing::debug!(reason = %reason, "No key to recover, creating one");
                }
                Err(e) => return Err(e),
            }
        }

        let key = WalletKey::generate();
        let backed_up = match self.recovery.setup_recovery(&key).await {
            Ok(()) => true,
            Err(e) => match self.options.backup_failure_policy {
                BackupFailurePolicy::Warn => {
                    tracing::warn!(
                        address = %key.address(),
                        recovery = self.recovery.name(),
                        error = %e,
                        "Wallet key was not backed up"
                    );
                    false
                }
                BackupFailurePolicy::Fail => return Err(e),
            },
        };
        Ok((key, KeyOrigin::Created { backed_up }))
    }

    async fn open_session(&self, key: WalletKey, key_origin: KeyOrigin) -> Result<ConnectData> {
        if key_origin != KeyOrigin::Loaded {
            self.store
                .set(store::PRIVATE_KEY, key.to_secret_hex().expose_secret())
                .await?;
        }
        store::set_connected(self.store.as_ref(), true).await?;

        let account = key.address();
        let mut session = self.session.write().await;
        let provider = self.provider_for(session.active_chain)?;
        session.key = Some(key);
        drop(session);
        let chain = ChainInfo::new(provider.network().await.chain_id);

        tracing::info!(account = %account, chain_id = chain.id, origin = ?key_origin, "Connected");
        Ok(ConnectData {
            account,
            chain,
            key_origin,
            provider,
        })
    }

    /// End the session; a no-op when not connected
    pub async fn disconnect(&self) -> Result<()> {
        if !store::is_connected(self.store.as_ref()).await? {
            return Ok(());
        }
        store::set_connected(self.store.as_ref(), false).await?;
        self.session.write().await.key = None;

        tracing::info!("Disconnected");
        self.emit(ConnectorEvent::Disconnect);
        Ok(())
    }

    /// Connected flag set and a key present
    pub async fn is_authorized(&self) -> Result<bool> {
        Ok(store::is_connected(self.store.as_ref()).await?
            && self.store.get(store::PRIVATE_KEY).await?.is_some())
    }

    fn provider_for(&self, chain_id: u64) -> Result<Arc<ZeroWalletProvider>> {
        self.providers.get(&chain_id).cloned().ok_or_else(|| {
            Error::Configuration(format!("No RPC URL configured for chain {}", chain_id))
        })
    }

    /// Provider of the active chain
    pub async fn provider(&self) -> Result<Arc<ZeroWalletProvider>> {
        self.provider_for(self.session.read().await.active_chain)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        Ok(self.provider().await?.network().await.chain_id)
    }

    /// Signer on the active chain
    ///
    /// Outside a session the key is read from the store, so a signer without
    /// a stored key reports `UninitializedWallet` when used.
    pub async fn signer(&self) -> Result<ZeroWalletSigner> {
        let session = self.session.read().await;
        let provider = self.provider_for(session.active_chain)?;
        match &session.key {
            Some(key) => Ok(ZeroWalletSigner::new(provider, Some(key.clone()))),
            None => {
                drop(session);
                provider.get_signer().await
            }
        }
    }

    pub async fn account(&self) -> Result<Address> {
        self.signer().await?.address()
    }

    /// Make `chain_id` the active chain
    ///
    /// Ids outside the chain table fail with `UnsupportedChain`; known chains
    /// without a configured RPC URL fail with a configuration error.
    pub async fn switch_chain(&self, chain_id: u64) -> Result<ChainContext> {
        SupportedChain::lookup(chain_id)?;
        let provider = self.provider_for(chain_id)?;

        self.session.write().await.active_chain = chain_id;
        let network = provider.network().await;

        tracing::info!(chain_id = chain_id, name = %network.name, "Switched chain");
        self.emit(ConnectorEvent::Change {
            account: None,
            chain: Some(ChainInfo::new(network.chain_id)),
        });
        Ok(network)
    }

    /// Host reported a new account list; empty means disconnected
    pub fn on_accounts_changed(&self, accounts: &[Address]) {
        match accounts.first() {
            None => self.emit(ConnectorEvent::Disconnect),
            Some(account) => self.emit(ConnectorEvent::Change {
                account: Some(*account),
                chain: None,
            }),
        }
    }

    /// Host reported a chain change, as a number or a hex/decimal string
    pub fn on_chain_changed(&self, chain: &Value) -> Result<()> {
        let chain_id = normalize_chain_id(chain)?;
        self.emit(ConnectorEvent::Change {
            account: None,
            chain: Some(ChainInfo::new(chain_id)),
        });
        Ok(())
    }

    pub fn on_disconnect(&self) {
        self.emit(ConnectorEvent::Disconnect);
    }

    fn emit(&self, event: ConnectorEvent) {
        let _ = self.events.send(event);
    }
}

/// Chain id from a JSON number, `"0x89"` or `"137"`
pub fn normalize_chain_id(chain: &Value) -> Result<u64> {
    let invalid = || Error::InvalidChainId(chain.to_string());
    match chain {
        Value::Number(n) => n.as_u64().ok_or_else(invalid),
        Value::String(s) => {
            let s = s.trim();
            match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => u64::from_str_radix(hex, 16).map_err(|_| invalid()),
                None => s.parse().map_err(|_| invalid()),
            }
        }
        _ => Err(invalid()),
    }
}
