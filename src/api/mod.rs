//! Node API clients
//!
//! The network only needs one thing from a running node's API: whether it
//! reports itself healthy. Clients are produced by an injected
//! [`ApiClientFactory`] so health checks can run against test doubles.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// API client errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("node returned error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

/// Client for one node's API
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Whether the node currently reports itself healthy
    async fn health(&self) -> Result<bool, ApiError>;
}

/// Produces API clients from endpoint information.
///
/// Any `Fn(&str, u16, Duration) -> Arc<dyn ApiClient>` closure is a factory.
pub trait ApiClientFactory: Send + Sync {
    fn new_client(&self, host: &str, port: u16, request_timeout: Duration) -> Arc<dyn ApiClient>;
}

impl<F> ApiClientFactory for F
where
    F: Fn(&str, u16, Duration) -> Arc<dyn ApiClient> + Send + Sync,
{
    fn new_client(&self, host: &str, port: u16, request_timeout: Duration) -> Arc<dyn ApiClient> {
        self(host, port, request_timeout)
    }
}

/// JSON-RPC health client over HTTP
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    client: reqwest::Client,
    health_url: String,
    request_timeout: Duration,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<HealthResult>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct HealthResult {
    healthy: bool,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

impl HttpApiClient {
    pub fn new(host: &str, port: u16, request_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            health_url: format!("http://{}:{}/ext/health", host, port),
            request_timeout,
        }
    }

    pub fn health_url(&self) -> &str {
        &self.health_url
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    async fn health(&self) -> Result<bool, ApiError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "health.health",
            "params": {},
        });
        let response: RpcResponse = self
            .client
            .post(&self.health_url)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            return Err(ApiError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        let healthy = response
            .result
            .map(|r| r.healthy)
            .ok_or_else(|| ApiError::Decode("missing result".to_string()))?;
        debug!("{} healthy: {}", self.health_url, healthy);
        Ok(healthy)
    }
}

/// Factory for [`HttpApiClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpApiClientFactory;

impl ApiClientFactory for HttpApiClientFactory {
    fn new_client(&self, host: &str, port: u16, request_timeout: Duration) -> Arc<dyn ApiClient> {
        Arc::new(HttpApiClient::new(host, port, request_timeout))
    }
}
