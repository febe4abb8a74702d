//! Agent fixtures for the tool tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tether_core::agent::{AgentRequest, AgentResponse, Network};
use tether_core::{Agent, AgentConfig, CacheDb, Error};

/// Serves a fixed body for every same-site path until switched offline.
pub(crate) struct SiteNetwork {
    online: AtomicBool,
}

impl SiteNetwork {
    pub(crate) fn new() -> Self {
        Self { online: AtomicBool::new(true) }
    }

    pub(crate) fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl Network for SiteNetwork {
    async fn fetch(&self, request: &AgentRequest) -> Result<AgentResponse, Error> {
        if !self.online.load(Ordering::SeqCst) {
            return Err(Error::Transport("offline".into()));
        }
        let body = format!("served {}", request.url.path());
        Ok(AgentResponse::network(200, vec![("content-type".into(), "text/plain".into())], body.into()))
    }
}

pub(crate) fn config() -> AgentConfig {
    AgentConfig {
        namespace: "bistro".into(),
        version: "v1".into(),
        app_origin: "https://bistro.test".into(),
        precache_manifest: vec!["/".into(), "/offline.html".into()],
        ..Default::default()
    }
}

pub(crate) async fn agent(network: Arc<SiteNetwork>) -> Agent {
    let db = CacheDb::open_in_memory().await.unwrap();
    Agent::new(config(), db, network).await.unwrap()
}
