//! Strategy selection.
//!
//! A pure function of the request: method, path, destination and origin.
//! Rules apply in priority order and the first match wins.

use super::request::{AgentRequest, Destination};
use crate::Error;
use crate::config::AgentConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "svg", "gif"];
const STATIC_EXTENSIONS: &[&str] = &["css", "js", "woff", "woff2", "ttf", "eot"];
const DOCUMENT_EXTENSIONS: &[&str] = &["html"];

/// How a request is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Serve from store if present, else fetch and store.
    CacheFirst,
    /// Fetch fresh, fall back to store on failure.
    NetworkFirst,
    /// Cache-First where stored entries older than the TTL count as misses.
    ExpiringCacheFirst,
    /// Never touches the store.
    NetworkOnly,
}

/// Maps requests to strategies.
#[derive(Debug, Clone)]
pub struct Classifier {
    app_origin: String,
    font_origins: Vec<String>,
}

impl Classifier {
    pub fn new(app_origin: &str, font_origins: &[String]) -> Result<Self, Error> {
        let font_origins = font_origins
            .iter()
            .map(|o| serialize_origin(o))
            .collect::<Result<_, _>>()?;
        Ok(Self { app_origin: serialize_origin(app_origin)?, font_origins })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, Error> {
        Self::new(&config.app_origin, &config.font_origins)
    }

    pub fn classify(&self, request: &AgentRequest) -> Strategy {
        if !request.is_get() {
            return Strategy::NetworkOnly;
        }

        let origin = request.origin();
        if origin != self.app_origin {
            return if self.font_origins.contains(&origin) { Strategy::CacheFirst } else { Strategy::NetworkOnly };
        }

        let path = request.path();
        if request.destination == Destination::Image || has_extension(path, IMAGE_EXTENSIONS) {
            return Strategy::ExpiringCacheFirst;
        }
        if has_extension(path, STATIC_EXTENSIONS) {
            return Strategy::CacheFirst;
        }
        if request.destination == Destination::Document || is_navigational_route(path) {
            return Strategy::NetworkFirst;
        }

        Strategy::NetworkFirst
    }
}

fn serialize_origin(origin: &str) -> Result<String, Error> {
    let url = url::Url::parse(origin).map_err(|e| Error::InvalidUrl(format!("{origin}: {e}")))?;
    Ok(url.origin().ascii_serialization())
}

fn has_extension(path: &str, extensions: &[&str]) -> bool {
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.iter().any(|e| ext.eq_ignore_ascii_case(e)))
}

fn is_navigational_route(path: &str) -> bool {
    path.ends_with('/') || has_extension(path, DOCUMENT_EXTENSIONS)
}
