//! HTTP transport for the agent.
//!
//! `FetchClient` implements `Network` over reqwest. Every HTTP status comes
//! back as a response; only failures to obtain one (unreachable host, reset,
//! timeout, a body over the size limit) are errors, and all of those are
//! `Error::Transport` so the strategy handlers fall back to the store.
//!
//! Bodies are read to completion before a response is returned.

mod headers;

use bytes::Bytes;
use reqwest::{Client, Method};
use std::time::{Duration, Instant};

use tether_core::agent::{AgentRequest, AgentResponse, Network};
use tether_core::{AgentConfig, Error};

pub use headers::collect_headers;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "tether/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "tether/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
        }
    }
}

impl From<&AgentConfig> for FetchConfig {
    fn from(config: &AgentConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// HTTP client the agent fetches through.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn send(&self, request: &AgentRequest) -> Result<AgentResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let response = self
            .http
            .request(method, request.url.as_str())
            .send()
            .await
            .map_err(|e| Error::Transport(format!("network error: {e}")))?;

        let status = response.status().as_u16();

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::Transport(format!("{len} bytes exceeds {}", self.config.max_bytes)));
        }

        let headers = collect_headers(response.headers());
        let bytes: Bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Transport(format!("failed to read response: {e}")))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::Transport(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            method = %request.method,
            url = %request.url,
            status,
            bytes = bytes.len(),
            fetch_ms = start.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(AgentResponse::network(status, headers, bytes))
    }
}

#[async_trait::async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse, Error> {
        self.send(request).await
    }
}
