//! Normalized cache keys.
//!
//! A key is the (method, absolute URL) pair of a request. The URL is
//! normalized so that `https://EXAMPLE.com/a#top` and `https://example.com/a`
//! address the same entry.

use super::hash::compute_cache_key;
use crate::Error;
use url::Url;

/// Normalize a URL string for consistent cache addressing.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Require an absolute http(s) URL
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".into()));
    }

    let mut parsed = Url::parse(trimmed).map_err(|e| Error::InvalidUrl(format!("{trimmed}: {e}")))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    if let Some(host) = parsed.host_str() {
        let lowered = host.to_lowercase();
        parsed
            .set_host(Some(&lowered))
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Normalized (method, URL) pair identifying one entry within a generation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: String,
    url: Url,
}

impl CacheKey {
    /// Build a key, normalizing both the method and the URL.
    pub fn new(method: &str, url: &str) -> Result<Self, Error> {
        let method = method.trim().to_ascii_uppercase();
        if method.is_empty() {
            return Err(Error::InvalidInput("method cannot be empty".into()));
        }
        Ok(Self { method, url: canonicalize(url)? })
    }

    /// Key for a GET of an already-normalized URL.
    pub fn get(url: Url) -> Self {
        Self { method: "GET".into(), url }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Only `GET` requests are ever stored.
    pub fn is_cacheable(&self) -> bool {
        self.method == "GET"
    }

    /// Storage hash for this key.
    pub fn hash(&self) -> String {
        compute_cache_key(&self.method, self.url.as_str())
    }
}
