//! Scripted network and fixtures shared by the agent tests.

use super::network::Network;
use super::request::{AgentRequest, AgentResponse};
use crate::Error;
use crate::config::AgentConfig;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

/// In-memory network: known URLs answer with their scripted response,
/// unknown URLs answer 404, and going offline fails every fetch.
pub(crate) struct StubNetwork {
    responses: Mutex<HashMap<String, (u16, Bytes)>>,
    online: AtomicBool,
    calls: AtomicUsize,
}

impl StubNetwork {
    pub(crate) fn new() -> Self {
        Self { responses: Mutex::new(HashMap::new()), online: AtomicBool::new(true), calls: AtomicUsize::new(0) }
    }

    pub(crate) fn with(self, url: &str, status: u16, body: &str) -> Self {
        self.set(url, status, body);
        self
    }

    pub(crate) fn set(&self, url: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), (status, Bytes::from(body.to_string())));
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Network for StubNetwork {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!("network unreachable: {}", request.url)));
        }
        let scripted = self.responses.lock().unwrap().get(request.url.as_str()).cloned();
        Ok(match scripted {
            Some((status, body)) => {
                AgentResponse::network(status, vec![("content-type".into(), "text/html".into())], body)
            }
            None => AgentResponse::network(404, Vec::new(), Bytes::from_static(b"not found")),
        })
    }
}

/// Network that parks fetches of one URL until released, otherwise
/// answering like the wrapped stub.
pub(crate) struct GatedNetwork {
    inner: Arc<StubNetwork>,
    gated: String,
    entered: Notify,
    gate: Notify,
}

impl GatedNetwork {
    pub(crate) fn new(inner: Arc<StubNetwork>, gated: &str) -> Self {
        Self { inner, gated: gated.to_string(), entered: Notify::new(), gate: Notify::new() }
    }

    /// Resolves once a fetch of the gated URL is parked.
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait::async_trait]
impl Network for GatedNetwork {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse, Error> {
        if request.url.as_str() == self.gated {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        self.inner.fetch(request).await
    }
}

/// Small site used across tests.
pub(crate) fn test_config(version: &str) -> AgentConfig {
    AgentConfig {
        namespace: "bistro".into(),
        version: version.into(),
        app_origin: "https://bistro.test".into(),
        precache_manifest: vec!["/".into(), "/offline.html".into(), "/styles.css".into()],
        runtime_max_entries: 3,
        image_max_entries: 2,
        image_ttl_secs: 60,
        ..Default::default()
    }
}

/// Network that serves every path of `test_config`'s manifest.
pub(crate) fn site_network() -> StubNetwork {
    StubNetwork::new()
        .with("https://bistro.test/", 200, "<h1>home</h1>")
        .with("https://bistro.test/offline.html", 200, "<h1>offline</h1>")
        .with("https://bistro.test/styles.css", 200, "body{}")
}
