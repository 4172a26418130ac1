//! Outbound HTTP transport.
//!
//! `Transport` is the only seam between the retry state machine and the
//! network; business logic never touches `reqwest` directly, so tests swap in
//! scripted transports.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use crate::services::proxy_pool::ProxyEndpoint;

/// One GET to perform
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
    /// None = direct connection
    pub proxy: Option<ProxyEndpoint>,
    pub timeout: Duration,
}

/// Undecoded response: status, lower-cased headers, raw body bytes
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("failed to build client: {0}")]
    Build(String),
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError>;
}

/// `reqwest`-backed transport with one cached client per proxy
pub struct HttpTransport {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<ProxyEndpoint, reqwest::Client>>,
}

impl HttpTransport {
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self {
            direct: Self::builder().build().map_err(|e| TransportError::Build(e.to_string()))?,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn builder() -> reqwest::ClientBuilder {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(30))
    }

    fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<reqwest::Client, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut clients = self.proxied.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let upstream = reqwest::Proxy::all(proxy.as_str())
            .map_err(|e| TransportError::Build(format!("invalid proxy {}: {}", proxy, e)))?;
        let client = Self::builder()
            .proxy(upstream)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;

        debug!(proxy = %proxy, "Built proxied client");
        clients.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        let client = self.client_for(request.proxy.as_ref())?;

        let mut builder = client.get(&request.url).timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else {
                TransportError::Connect(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else {
                TransportError::Body(e.to_string())
            }
        })?;

        Ok(RawResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
