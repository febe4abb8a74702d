//! Request/response control channel between the application and the agent.
//!
//! Messages arrive as loose JSON objects with a `type` field. Every message
//! except SKIP_WAITING gets exactly one reply carrying the request id.

use super::eviction::EvictionManager;
use super::lifecycle::LifecycleManager;
use super::network::{Network, fetch_all};
use super::request::AgentRequest;
use crate::Error;
use crate::cache::{CacheDb, Category};
use crate::config::AgentConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// A parsed control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    SkipWaiting,
    GetVersion,
    ClearCache,
    /// Fetch and store these URLs in the runtime generation.
    CacheUrls { urls: Vec<String> },
}

impl ControlMessage {
    /// Parse a raw message object.
    ///
    /// CACHE_URLS reads its list from `payload.urls`, falling back to a top-level `urls`.
    pub fn parse(raw: &Value) -> Result<Self, Error> {
        let kind = raw
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Protocol("message has no type".into()))?;

        match kind {
            "SKIP_WAITING" => Ok(Self::SkipWaiting),
            "GET_VERSION" => Ok(Self::GetVersion),
            "CLEAR_CACHE" => Ok(Self::ClearCache),
            "CACHE_URLS" => {
                let list = raw
                    .get("payload")
                    .and_then(|payload| payload.get("urls"))
                    .or_else(|| raw.get("urls"))
                    .ok_or_else(|| Error::Protocol("CACHE_URLS requires urls".into()))?;
                let urls: Vec<String> = serde_json::from_value(list.clone())?;
                Ok(Self::CacheUrls { urls })
            }
            other => Err(Error::Protocol(format!("unknown message type: {other}"))),
        }
    }
}

/// An incoming message paired with the id its reply is routed by.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ControlRequest {
    pub id: u64,
    pub message: Value,
}

/// Body of a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ControlResponse {
    /// `{ "type": "VERSION", "version": "..." }`
    Version {
        #[serde(rename = "type")]
        kind: String,
        version: String,
    },
    /// `{ "success": bool, "error"?: "..." }`
    Outcome {
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl ControlResponse {
    pub fn version(version: impl Into<String>) -> Self {
        Self::Version { kind: "VERSION".into(), version: version.into() }
    }

    pub fn ok() -> Self {
        Self::Outcome { success: true, error: None }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Outcome { success: false, error: Some(error.to_string()) }
    }
}

/// Reply delivered on the port the request came in on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ControlReply {
    pub id: u64,
    pub response: ControlResponse,
}

/// Executes control messages against the lifecycle and the store.
#[derive(Clone)]
pub struct ControlChannel {
    config: Arc<AgentConfig>,
    origin: Url,
    db: CacheDb,
    network: Arc<dyn Network>,
    lifecycle: Arc<LifecycleManager>,
    eviction: EvictionManager,
}

impl ControlChannel {
    pub fn new(
        config: Arc<AgentConfig>, db: CacheDb, network: Arc<dyn Network>, lifecycle: Arc<LifecycleManager>,
    ) -> Result<Self, Error> {
        let origin = Url::parse(&config.app_origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let eviction = EvictionManager::new(db.clone());
        Ok(Self { config, origin, db, network, lifecycle, eviction })
    }

    /// Handle one request. Returns `None` only for SKIP_WAITING, which has no reply.
    pub async fn handle(&self, request: ControlRequest) -> Option<ControlReply> {
        let message = match ControlMessage::parse(&request.message) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(id = request.id, error = %e, "rejected control message");
                return Some(ControlReply { id: request.id, response: ControlResponse::failed(e) });
            }
        };

        tracing::debug!(id = request.id, ?message, "control message");
        let response = match message {
            ControlMessage::SkipWaiting => {
                self.lifecycle.skip_waiting();
                return None;
            }
            ControlMessage::GetVersion => self.get_version().await,
            ControlMessage::ClearCache => outcome(self.clear_cache().await),
            ControlMessage::CacheUrls { urls } => outcome(self.cache_urls(urls).await),
        };

        Some(ControlReply { id: request.id, response })
    }

    async fn get_version(&self) -> ControlResponse {
        match self.lifecycle.active_version().await {
            Some(version) => ControlResponse::version(version),
            None => ControlResponse::failed("no active version"),
        }
    }

    /// Delete every generation in this agent's namespace.
    async fn clear_cache(&self) -> Result<(), Error> {
        let _guard = self.lifecycle.exclusive().await;
        let deleted = self.db.delete_all_generations(&self.config.namespace).await?;
        tracing::info!(namespace = %self.config.namespace, deleted, "cleared all generations");
        Ok(())
    }

    /// Fetch every URL and store the batch in the active runtime generation.
    ///
    /// Nothing is stored unless every fetch succeeds.
    async fn cache_urls(&self, urls: Vec<String>) -> Result<(), Error> {
        let generations = self
            .lifecycle
            .serving_generations()
            .await
            .ok_or(Error::NoActiveVersion)?;
        let runtime = generations.get(Category::Runtime).clone();

        let requests = urls
            .iter()
            .map(|target| AgentRequest::resolve(&self.origin, target))
            .collect::<Result<Vec<_>, _>>()?;
        let count = requests.len();

        let fetched = fetch_all(self.network.clone(), requests, self.config.install_concurrency).await?;
        let entries = fetched
            .iter()
            .map(|(request, response)| response.to_entry(request.key()))
            .collect();

        self.db.put_entries_current(&runtime, entries).await?;
        let evicted = self.eviction.enforce(&runtime).await?;
        tracing::info!(count, evicted, generation = %runtime.name(), "cached urls on request");
        Ok(())
    }
}

fn outcome(result: Result<(), Error>) -> ControlResponse {
    match result {
        Ok(()) => ControlResponse::ok(),
        Err(e) => {
            tracing::warn!(error = %e, "control message failed");
            ControlResponse::failed(e)
        }
    }
}
