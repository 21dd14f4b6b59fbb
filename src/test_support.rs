//! In-memory fakes of the remote collaborators

use crate::chains::{ChainContext, SupportedChain};
use crate::config::ReceiptPolling;
use crate::provider::{JsonRpcRequest, RpcTransport, WalletServices, ZeroWalletProvider};
use crate::recovery::RecoveryMechanism;
use crate::server::{
    AccountRequest, AuthorizeResponse, BuildTransactionRequest, BuiltTransaction, DeployRequest,
    NonceResponse, RelayRequest, RelayResponse, WalletServer,
};
use crate::store::MemoryStore;
use crate::wallet::{WalletKey, WalletTxBody};
use crate::{Error, RemoteError, Result, RpcError};
use alloy::consensus::transaction::Recovered;
use alloy::consensus::{Signed, TxEnvelope, TxLegacy};
use alloy::primitives::{Address, Bytes, Signature, TxKind, B256, U256};
use alloy::rpc::types::Transaction;
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

pub const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

/// JSON-RPC node answering from canned per-method results
///
/// A method's results are consumed in order; the last one repeats.
#[derive(Clone, Default)]
pub struct MockTransport {
    results: Arc<Mutex<HashMap<String, VecDeque<std::result::Result<Value, RpcError>>>>>,
    requests: Arc<Mutex<Vec<JsonRpcRequest>>>,
}

impl MockTransport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_result(method: &str, result: Value) -> Self {
        Self::empty().and_result(method, result)
    }

    pub fn with_error(method: &str, error: RpcError) -> Self {
        Self::with_sequence(method, vec![Err(error)])
    }

    pub fn with_sequence(
        method: &str,
        results: Vec<std::result::Result<Value, RpcError>>,
    ) -> Self {
        let transport = Self::empty();
        transport
            .results
            .lock()
            .unwrap()
            .insert(method.to_string(), results.into());
        transport
    }

    pub fn and_result(self, method: &str, result: Value) -> Self {
        self.results
            .lock()
            .unwrap()
            .insert(method.to_string(), VecDeque::from(vec![Ok(result)]));
        self
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<JsonRpcRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn request(&self, request: JsonRpcRequest) -> std::result::Result<Value, RpcError> {
        let method = request.method.clone();
        self.requests.lock().unwrap().push(request);

        let mut results = self.results.lock().unwrap();
        match results.get_mut(&method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap(),
            None => Err(RpcError::new(-32601, format!("method {} not mocked", method), None)),
        }
    }

    fn url(&self) -> &str {
        "mock://rpc"
    }
}

/// Address the fixture builder reports for the SCW
pub fn scw_address() -> Address {
    Address::left_padding_from(&[0x01, 0x23])
}

pub fn fixture_body() -> WalletTxBody {
    serde_json::from_value(json!({
        "to": "0xA119f2120E82380DC89832B8F3740fDC47b0444f",
        "value": 0,
        "data": "0x60fe47b1000000000000000000000000000000000000000000000000000000000000007b",
        "operation": 0,
        "targetTxGas": 0,
        "baseGas": 0,
        "gasPrice": 0,
        "gasToken": "0x0000000000000000000000000000000000000000",
        "refundReceiver": "0x0000000000000000000000000000000000000000",
        "nonce": 1
    }))
    .unwrap()
}

pub fn relayed_hash() -> B256 {
    B256::repeat_byte(0xab)
}

/// `eth_getTransactionByHash` result for `hash`; pending when `block_number`
/// is `None`
pub fn transaction_json(hash: B256, block_number: Option<u64>) -> Value {
    let legacy = TxLegacy {
        chain_id: Some(137),
        nonce: 0,
        gas_price: 1_000_000_000,
        gas_limit: 21_000,
        to: TxKind::Call(scw_address()),
        value: U256::ZERO,
        input: Bytes::new(),
    };
    let signature = Signature::new(U256::from(1), U256::from(1), false);
    let envelope = TxEnvelope::Legacy(Signed::new_unchecked(legacy, signature, hash));
    let tx = Transaction {
        inner: Recovered::new_unchecked(envelope, Address::repeat_byte(0x11)),
        block_hash: block_number.map(|_| B256::repeat_byte(0x01)),
        block_number,
        transaction_index: block_number.map(|_| 0),
        effective_gas_price: None,
    };
    serde_json::to_value(tx).unwrap()
}

/// Wallet server with fixed answers and a call log
pub struct MockServer {
    pub nonce: std::result::Result<NonceResponse, RemoteError>,
    pub built: std::result::Result<BuiltTransaction, RemoteError>,
    pub relay: std::result::Result<RelayResponse, RemoteError>,
    pub authorize: std::result::Result<AuthorizeResponse, RemoteError>,
    pub deploy: std::result::Result<(), RemoteError>,
    pub calls: Mutex<Vec<&'static str>>,
    pub build_requests: Mutex<Vec<BuildTransactionRequest>>,
    pub relay_requests: Mutex<Vec<RelayRequest>>,
    pub deploy_requests: Mutex<Vec<DeployRequest>>,
}

impl Default for MockServer {
    fn default() -> Self {
        Self {
            nonce: Ok(NonceResponse {
                nonce: "1".to_string(),
            }),
            built: Ok(BuiltTransaction {
                safe_tx_body: fixture_body(),
                scw_address: scw_address(),
            }),
            relay: Ok(RelayResponse {
                tx_hash: relayed_hash(),
            }),
            authorize: Ok(AuthorizeResponse {
                authorize: Some(json!("0x123")),
            }),
            deploy: Ok(()),
            calls: Mutex::new(Vec::new()),
            build_requests: Mutex::new(Vec::new()),
            relay_requests: Mutex::new(Vec::new()),
            deploy_requests: Mutex::new(Vec::new()),
        }
    }
}

impl MockServer {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl WalletServer for MockServer {
    async fn nonce(&self, _request: &AccountRequest) -> std::result::Result<NonceResponse, RemoteError> {
        self.record("nonce");
        self.nonce.clone()
    }

    async fn refresh_nonce(
        &self,
        _request: &AccountRequest,
    ) -> std::result::Result<NonceResponse, RemoteError> {
        self.record("refresh_nonce");
        self.nonce.clone()
    }

    async fn build_transaction(
        &self,
        request: &BuildTransactionRequest,
    ) -> std::result::Result<BuiltTransaction, RemoteError> {
        self.record("build_transaction");
        self.build_requests.lock().unwrap().push(request.clone());
        self.built.clone()
    }

    async fn relay(&self, request: &RelayRequest) -> std::result::Result<RelayResponse, RemoteError> {
        self.record("relay");
        self.relay_requests.lock().unwrap().push(request.clone());
        self.relay.clone()
    }

    async fn authorize(
        &self,
        _request: &AccountRequest,
    ) -> std::result::Result<AuthorizeResponse, RemoteError> {
        self.record("authorize");
        self.authorize.clone()
    }

    async fn deploy_scw(&self, request: &DeployRequest) -> std::result::Result<(), RemoteError> {
        self.record("deploy_scw");
        self.deploy_requests.lock().unwrap().push(request.clone());
        self.deploy.clone()
    }

    fn name(&self) -> &'static str {
        "MockServer"
    }
}

/// Recovery medium holding hex keys in memory
pub struct MockRecovery {
    pub ready: bool,
    pub fail_backup: bool,
    pub deny: bool,
    pub stored: Mutex<Vec<String>>,
}

impl MockRecovery {
    pub fn ready() -> Self {
        Self {
            ready: true,
            fail_backup: false,
            deny: false,
            stored: Mutex::new(Vec::new()),
        }
    }

    pub fn holding(key: &WalletKey) -> Self {
        let recovery = Self::ready();
        recovery
            .stored
            .lock()
            .unwrap()
            .push(key.to_secret_hex().expose_secret().to_string());
        recovery
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }
}

#[async_trait]
impl RecoveryMechanism for MockRecovery {
    fn is_recovery_ready(&self) -> bool {
        self.ready
    }

    async fn recovery_ready(&self) {}

    async fn setup_recovery(&self, key: &WalletKey) -> Result<()> {
        if self.fail_backup {
            return Err(Error::RecoveryBackupFailed("medium unreachable".to_string()));
        }
        self.stored
            .lock()
            .unwrap()
            .push(key.to_secret_hex().expose_secret().to_string());
        Ok(())
    }

    async fn initiate_recovery(&self, key_id: Option<usize>) -> Result<WalletKey> {
        if self.deny {
            return Err(Error::RecoveryDenied("consent refused".to_string()));
        }
        let stored = self.stored.lock().unwrap().clone();
        let hex = match key_id {
            Some(index) => stored.get(index),
            None => stored.last(),
        }
        .ok_or_else(|| Error::RecoveryNotFound("no backed-up key".to_string()))?;
        WalletKey::from_hex(hex)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

pub fn services(server: Arc<MockServer>) -> WalletServices {
    WalletServices {
        store: Arc::new(MemoryStore::new()),
        server,
        gas_tank_name: "gasTankName".to_string(),
        receipt_polling: ReceiptPolling {
            interval_ms: 1,
            max_attempts: Some(3),
        },
    }
}

/// Provider bound to `chain_id` with a fresh memory store and default server
pub fn provider_with(
    transport: MockTransport,
    chain_id: u64,
) -> (Arc<ZeroWalletProvider>, Arc<MockServer>) {
    provider_with_server(transport, chain_id, MockServer::default())
}

pub fn provider_with_server(
    transport: MockTransport,
    chain_id: u64,
    server: MockServer,
) -> (Arc<ZeroWalletProvider>, Arc<MockServer>) {
    let server = Arc::new(server);
    let chain = SupportedChain::lookup(chain_id).unwrap();
    let provider = ZeroWalletProvider::new(
        Arc::new(transport),
        ChainContext::from(chain),
        services(server.clone()),
    );
    (Arc::new(provider), server)
}

/// Request captured by `FakeHttp`
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    /// Path and query as sent
    pub target: String,
    /// Lowercased header names
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.target.split('?').next().unwrap_or_default()
    }

    pub fn query(&self) -> &str {
        self.target.split_once('?').map(|(_, q)| q).unwrap_or_default()
    }
}

type Handler = Arc<dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync>;

/// Loopback HTTP/1.1 server answering one request per connection
pub struct FakeHttp {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl FakeHttp {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let log = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    if let Some(request) = read_request(&mut stream).await {
                        let (status, body) = handler(&request);
                        log.lock().unwrap().push(request);
                        write_response(stream, status, &body).await;
                    }
                });
            }
        });

        Self {
            addr,
            requests,
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for FakeHttp {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();

    let length = headers
        .get("content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        target,
        headers,
        body: String::from_utf8_lossy(&body).to_string(),
    })
}

async fn write_response(mut stream: TcpStream, status: u16, body: &str) {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown");
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}
