//! Intercepted requests and the responses the agent hands back.

use crate::Error;
use crate::cache::{CacheEntry, CacheKey, canonicalize};
use bytes::Bytes;
use chrono::Utc;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use url::Url;

/// What the application intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Top-level navigation.
    Document,
    Image,
    Script,
    Style,
    Font,
    #[default]
    Other,
}

impl Destination {
    /// Best guess from a path, used for requests the agent issues itself.
    pub fn infer(path: &str) -> Self {
        let lowered = path.to_ascii_lowercase();
        match lowered.rsplit_once('.').map(|(_, ext)| ext) {
            _ if lowered.ends_with('/') => Destination::Document,
            Some("html" | "htm") => Destination::Document,
            Some("css") => Destination::Style,
            Some("js" | "mjs") => Destination::Script,
            Some("woff" | "woff2" | "ttf" | "eot" | "otf") => Destination::Font,
            Some("png" | "jpg" | "jpeg" | "webp" | "svg" | "gif" | "avif" | "ico") => Destination::Image,
            _ => Destination::Other,
        }
    }
}

/// A request intercepted from the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRequest {
    pub method: String,
    pub url: Url,
    pub destination: Destination,
}

impl AgentRequest {
    /// Build a request from an absolute URL.
    pub fn new(method: &str, url: &str, destination: Destination) -> Result<Self, Error> {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err(Error::InvalidInput("method cannot be empty".into()));
        }
        Ok(Self { method, url: canonicalize(url)?, destination })
    }

    /// GET request for an absolute URL or a path relative to `origin`.
    pub fn resolve(origin: &Url, target: &str) -> Result<Self, Error> {
        let url = origin
            .join(target.trim())
            .map_err(|e| Error::InvalidUrl(format!("{target}: {e}")))?;
        let destination = Destination::infer(url.path());
        Self::new("GET", url.as_str(), destination)
    }

    pub fn key(&self) -> CacheKey {
        CacheKey::get(self.url.clone())
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }

    pub fn is_navigational(&self) -> bool {
        self.destination == Destination::Document
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    /// Serialized origin, e.g. `https://fonts.gstatic.com`.
    pub fn origin(&self) -> String {
        self.url.origin().ascii_serialization()
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    OfflineFallback,
    Synthetic,
}

/// A complete, fully-buffered response.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl AgentResponse {
    pub fn network(status: u16, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self { status, headers, body, source: ResponseSource::Network }
    }

    /// Plain-text response generated by the agent itself.
    pub fn synthetic(status: u16, message: &'static str) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "text/plain".into())],
            body: Bytes::from_static(message.as_bytes()),
            source: ResponseSource::Synthetic,
        }
    }

    /// Transport failed and nothing usable was stored.
    pub fn network_error() -> Self {
        Self::synthetic(408, "Network error")
    }

    /// Network-First found neither network nor cache.
    pub fn unavailable() -> Self {
        Self::synthetic(503, "Offline")
    }

    pub fn from_entry(entry: CacheEntry, source: ResponseSource) -> Self {
        Self { status: entry.status, headers: entry.headers, body: entry.body, source }
    }

    /// Snapshot this response as a cache entry stamped now.
    pub fn to_entry(&self, key: CacheKey) -> CacheEntry {
        CacheEntry {
            key,
            status: self.status,
            headers: self.headers.clone(),
            body: self.body.clone(),
            stored_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
