//! JSON-RPC transport

use crate::RpcError;
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::transports::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use url::Url;

/// One JSON-RPC call as the provider issued it
///
/// `id` numbers the call in provider events; the HTTP client assigns its own
/// wire ids.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    pub id: u64,
    pub method: String,
    pub params: Value,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

/// Carries one JSON-RPC call to a node
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, request: JsonRpcRequest) -> Result<Value, RpcError>;

    /// Endpoint, for logging
    fn url(&self) -> &str;
}

/// Transport over an alloy HTTP provider
pub struct HttpTransport {
    provider: DynProvider,
    url: String,
}

impl HttpTransport {
    pub fn new(url: &str) -> crate::Result<Self> {
        let parsed = Url::parse(url).map_err(|e| {
            crate::Error::Configuration(format!("Invalid JSON-RPC URL {}: {}", url, e))
        })?;
        Ok(Self {
            provider: ProviderBuilder::new().connect_http(parsed).erased(),
            url: url.to_string(),
        })
    }

    pub fn with_provider(provider: DynProvider, url: impl Into<String>) -> Self {
        Self {
            provider,
            url: url.into(),
        }
    }
}

/// Keep a node's `{ code, message, data }` error; anything else is a
/// transport failure
fn rpc_error(err: TransportError) -> RpcError {
    match err.as_error_resp() {
        Some(payload) => RpcError::new(
            payload.code,
            payload.message.to_string(),
            payload
                .data
                .as_ref()
                .and_then(|data| serde_json::from_str(data.get()).ok()),
        ),
        None => RpcError::transport(err.to_string()),
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn request(&self, request: JsonRpcRequest) -> Result<Value, RpcError> {
        self.provider
            .raw_request::<Value, Value>(request.method.into(), request.params)
            .await
            .map_err(rpc_error)
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeHttp;
    use serde_json::json;

    /// Node echoing request ids with a fixed result or error member
    async fn node(member: &'static str, value: Value) -> FakeHttp {
        FakeHttp::start(move |request| {
            let body: Value = serde_json::from_str(&request.body).unwrap_or_default();
            let mut response = json!({ "jsonrpc": "2.0", "id": body["id"] });
            response[member] = value.clone();
            (200, response.to_string())
        })
        .await
    }

    #[tokio::test]
    async fn test_result_is_returned() {
        let node = node("result", json!("0x89")).await;
        let transport = HttpTransport::new(&node.url("")).unwrap();

        let value = transport
            .request(JsonRpcRequest::new(1, "eth_chainId", json!([])))
            .await
            .unwrap();
        assert_eq!(value, json!("0x89"));

        let sent: Value = serde_json::from_str(&node.requests()[0].body).unwrap();
        assert_eq!(sent["method"], "eth_chainId");
        assert_eq!(sent["jsonrpc"], "2.0");
    }

    #[tokio::test]
    async fn test_null_result_is_null() {
        let node = node("result", Value::Null).await;
        let transport = HttpTransport::new(&node.url("")).unwrap();

        let value = transport
            .request(JsonRpcRequest::new(1, "eth_getTransactionByHash", json!(["0x00"])))
            .await
            .unwrap();
        assert!(value.is_null());
    }

    #[tokio::test]
    async fn test_node_error_keeps_code_and_data() {
        let node = node(
            "error",
            json!({ "code": 3, "message": "execution reverted", "data": "0x08c379a0" }),
        )
        .await;
        let transport = HttpTransport::new(&node.url("")).unwrap();

        let err = transport
            .request(JsonRpcRequest::new(1, "eth_estimateGas", json!([{}])))
            .await
            .unwrap_err();
        assert_eq!(err.code, 3);
        assert_eq!(err.message, "execution reverted");
        assert_eq!(err.data, Some(json!("0x08c379a0")));
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let node = FakeHttp::start(|_| (502, "bad gateway".to_string())).await;
        let transport = HttpTransport::new(&node.url("")).unwrap();

        let err = transport
            .request(JsonRpcRequest::new(1, "eth_blockNumber", json!([])))
            .await
            .unwrap_err();
        assert_eq!(err.code, RpcError::TRANSPORT_CODE);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(matches!(
            HttpTransport::new("not a url"),
            Err(crate::Error::Configuration(_))
        ));
    }
}
