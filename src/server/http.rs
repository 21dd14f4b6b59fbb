use super::{
    AccountRequest, AuthorizeResponse, BuildTransactionRequest, BuiltTransaction, DeployRequest,
    NonceResponse, RelayRequest, RelayResponse, WalletServer,
};
use crate::config::ServerEndpoints;
use crate::RemoteError;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;

/// `WalletServer` over HTTP POST with JSON bodies
///
/// A non-2xx response becomes a `RemoteError` carrying the status and the
/// decoded response body as payload.
pub struct HttpWalletServer {
    client: Client,
    endpoints: ServerEndpoints,
}

impl HttpWalletServer {
    pub fn new(endpoints: ServerEndpoints) -> Self {
        Self {
            client: Client::new(),
            endpoints,
        }
    }

    pub fn with_client(client: Client, endpoints: ServerEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &ServerEndpoints {
        &self.endpoints
    }

    async fn post_value<B: Serialize + Sync>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<Value, RemoteError> {
        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::new(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RemoteError::new(e.to_string()).with_status(status.as_u16()))?;

        tracing::debug!(
            url = url,
            status = status.as_u16(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Wallet server response"
        );

        // Bodies are JSON in practice; anything else is kept as a string
        let payload = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            return Err(RemoteError::new(error_message(&payload, status.as_str()))
                .with_status(status.as_u16())
                .with_payload(payload));
        }

        Ok(payload)
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let payload = self.post_value(url, body).await?;
        serde_json::from_value(payload.clone()).map_err(|e| {
            RemoteError::new(format!("Malformed response from {}: {}", url, e)).with_payload(payload)
        })
    }
}

/// Best-effort human readable message from an error body
fn error_message(payload: &Value, status: &str) -> String {
    payload
        .get("message")
        .or_else(|| payload.get("error"))
        .and_then(|m| m.as_str())
        .or_else(|| payload.as_str())
        .map(String::from)
        .unwrap_or_else(|| format!("HTTP {}", status))
}

#[async_trait]
impl WalletServer for HttpWalletServer {
    async fn nonce(&self, request: &AccountRequest) -> Result<NonceResponse, RemoteError> {
        self.post(&self.endpoints.nonce_provider, request).await
    }

    async fn refresh_nonce(&self, request: &AccountRequest) -> Result<NonceResponse, RemoteError> {
        self.post(&self.endpoints.nonce_refresher, request).await
    }

    async fn build_transaction(
        &self,
        request: &BuildTransactionRequest,
    ) -> Result<BuiltTransaction, RemoteError> {
        self.post(&self.endpoints.transaction_builder, request).await
    }

    async fn relay(&self, request: &RelayRequest) -> Result<RelayResponse, RemoteError> {
        self.post(&self.endpoints.gas_station, request).await
    }

    async fn authorize(&self, request: &AccountRequest) -> Result<AuthorizeResponse, RemoteError> {
        let payload = self.post_value(&self.endpoints.authorizer, request).await?;
        // Any 2xx body without the field is a plain "not authorized"
        Ok(serde_json::from_value(payload).unwrap_or_default())
    }

    async fn deploy_scw(&self, request: &DeployRequest) -> Result<(), RemoteError> {
        self.post_value(&self.endpoints.scw_deployer, request)
            .await
            .map(|_| ())
    }

    fn name(&self) -> &'static str {
        "HttpWalletServer"
    }
}
