//! The interception agent.
//!
//! `Agent` ties the pieces together: every intercepted request is classified,
//! routed to the strategy handler for its class and answered from the active
//! version's generations. Lifecycle events and control messages go through
//! the same facade so a host only ever talks to one object.

mod classifier;
mod control;
mod eviction;
mod fallback;
mod generation_set;
mod handlers;
mod lifecycle;
mod network;
mod request;
mod signals;

#[cfg(test)]
mod testing;

pub use classifier::{Classifier, Strategy};
pub use control::{ControlChannel, ControlMessage, ControlReply, ControlRequest, ControlResponse};
pub use eviction::EvictionManager;
pub use fallback::OfflineFallback;
pub use generation_set::GenerationSet;
pub use handlers::{CacheFirst, ExpiringCacheFirst, HandlerContext, NetworkFirst, NetworkOnly, StrategyHandler, is_fresh};
pub use lifecycle::{LifecycleManager, LifecycleState};
pub use network::{Network, fetch_all};
pub use request::{AgentRequest, AgentResponse, Destination, ResponseSource};
pub use signals::{AgentSignal, SIGNAL_CAPACITY, Signals};

use crate::Error;
use crate::cache::{CacheDb, Category};
use crate::config::AgentConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use url::Url;

/// Something that happens to the agent.
#[derive(Debug)]
pub enum AgentEvent {
    Install,
    Activate,
    Fetch(AgentRequest),
    Message(ControlRequest),
}

/// Result of dispatching an `AgentEvent`.
#[derive(Debug)]
pub enum AgentOutcome {
    Installed,
    Activated,
    Response(AgentResponse),
    /// `None` for messages that take no reply.
    Reply(Option<ControlReply>),
}

/// Per-generation row of `AgentStatus`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GenerationStatus {
    pub name: String,
    pub category: Category,
    pub entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

/// Snapshot of the agent for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentStatus {
    pub namespace: String,
    /// Version this agent was configured with.
    pub version: String,
    pub state: LifecycleState,
    pub active_version: Option<String>,
    pub generations: Vec<GenerationStatus>,
}

pub struct Agent {
    config: Arc<AgentConfig>,
    db: CacheDb,
    classifier: Classifier,
    handlers: HashMap<Strategy, Arc<dyn StrategyHandler>>,
    passthrough: NetworkOnly,
    lifecycle: Arc<LifecycleManager>,
    control: ControlChannel,
    signals: Signals,
}

impl Agent {
    /// Wire up an agent over `db` and `network`, restoring any previously active version.
    pub async fn new(config: AgentConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let config = Arc::new(config);
        let origin = Url::parse(&config.app_origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let signals = Signals::new();

        let lifecycle =
            Arc::new(LifecycleManager::load(config.clone(), db.clone(), network.clone(), signals.clone()).await?);
        let control = ControlChannel::new(config.clone(), db.clone(), network.clone(), lifecycle.clone())?;

        let ctx = HandlerContext {
            db: db.clone(),
            network: network.clone(),
            eviction: EvictionManager::new(db.clone()),
            fallback: OfflineFallback::new(db.clone(), &origin, &config.offline_page)?,
            signals: signals.clone(),
        };

        let mut handlers: HashMap<Strategy, Arc<dyn StrategyHandler>> = HashMap::new();
        handlers.insert(Strategy::CacheFirst, Arc::new(CacheFirst::new(ctx.clone())));
        handlers.insert(Strategy::NetworkFirst, Arc::new(NetworkFirst::new(ctx.clone())));
        handlers.insert(Strategy::ExpiringCacheFirst, Arc::new(ExpiringCacheFirst::new(ctx)));
        handlers.insert(Strategy::NetworkOnly, Arc::new(NetworkOnly::new(network.clone())));

        Ok(Self {
            classifier: Classifier::from_config(&config)?,
            passthrough: NetworkOnly::new(network),
            config,
            db,
            handlers,
            lifecycle,
            control,
            signals,
        })
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentSignal> {
        self.signals.subscribe()
    }

    /// Run install, then activate (after SKIP_WAITING unless configured to skip).
    ///
    /// An install failure leaves the previously active version serving.
    pub async fn start(&self) -> Result<(), Error> {
        self.lifecycle.run().await
    }

    /// Answer one intercepted request.
    ///
    /// Before the first activation every request passes straight through to
    /// the network and nothing is cached.
    pub async fn fetch(&self, request: &AgentRequest) -> AgentResponse {
        let Some(generations) = self.lifecycle.serving_generations().await else {
            tracing::debug!(url = %request.url, "no active version, passing through");
            return self.passthrough.handle(request, &self.lifecycle.candidate_generations()).await;
        };

        let strategy = self.classifier.classify(request);
        tracing::debug!(
            method = %request.method,
            url = %request.url,
            ?strategy,
            version = generations.version(),
            "intercepted"
        );

        match self.handlers.get(&strategy) {
            Some(handler) => handler.handle(request, &generations).await,
            None => self.passthrough.handle(request, &generations).await,
        }
    }

    /// Handle one control message.
    pub async fn message(&self, request: ControlRequest) -> Option<ControlReply> {
        self.control.handle(request).await
    }

    pub async fn dispatch(&self, event: AgentEvent) -> Result<AgentOutcome, Error> {
        match event {
            AgentEvent::Install => {
                self.lifecycle.install().await?;
                Ok(AgentOutcome::Installed)
            }
            AgentEvent::Activate => {
                self.lifecycle.activate().await?;
                Ok(AgentOutcome::Activated)
            }
            AgentEvent::Fetch(request) => Ok(AgentOutcome::Response(self.fetch(&request).await)),
            AgentEvent::Message(request) => Ok(AgentOutcome::Reply(self.message(request).await)),
        }
    }

    pub async fn status(&self) -> Result<AgentStatus, Error> {
        let mut generations = Vec::new();
        for generation in self.db.list_generations(&self.config.namespace).await? {
            let name = generation.name();
            generations.push(GenerationStatus {
                entries: self.db.count_entries(&name).await?,
                category: generation.category,
                max_entries: generation.policy.max_entries,
                name,
            });
        }

        Ok(AgentStatus {
            namespace: self.config.namespace.clone(),
            version: self.config.version.clone(),
            state: self.lifecycle.state().await,
            active_version: self.lifecycle.active_version().await,
            generations,
        })
    }
}
