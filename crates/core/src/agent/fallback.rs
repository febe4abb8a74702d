//! Offline fallback for navigations.

use super::generation_set::GenerationSet;
use super::request::{AgentResponse, ResponseSource};
use crate::Error;
use crate::cache::{CacheDb, CacheKey, Category};
use url::Url;

/// Serves the precached offline page when a navigation gets neither network nor cache.
#[derive(Debug, Clone)]
pub struct OfflineFallback {
    db: CacheDb,
    key: CacheKey,
}

impl OfflineFallback {
    pub fn new(db: CacheDb, origin: &Url, offline_page: &str) -> Result<Self, Error> {
        let url = origin
            .join(offline_page)
            .map_err(|e| Error::InvalidUrl(format!("{offline_page}: {e}")))?;
        Ok(Self { db, key: CacheKey::new("GET", url.as_str())? })
    }

    /// The stored offline page, or a minimal 503 if it is missing from the static generation.
    pub async fn respond(&self, generations: &GenerationSet) -> AgentResponse {
        let name = generations.get(Category::Static).name();
        match self.db.get_entry(&name, &self.key).await {
            Ok(Some(entry)) => AgentResponse::from_entry(entry, ResponseSource::OfflineFallback),
            Ok(None) => {
                tracing::warn!(generation = %name, page = %self.key.url(), "offline page missing from static generation");
                AgentResponse::synthetic(503, "Offline page unavailable")
            }
            Err(e) => {
                tracing::warn!(error = %e, "offline page lookup failed");
                AgentResponse::synthetic(503, "Offline page unavailable")
            }
        }
    }
}
