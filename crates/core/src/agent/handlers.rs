//! Strategy handlers.
//!
//! Every handler turns a request into a response and never fails: transport
//! failures fall back to the store, then to the offline page (navigations
//! only), then to a synthetic response. Store failures degrade to a miss on
//! read and a no-op on write.
//!
//! A response is written to the store only after its body has been fully
//! received, in a single transaction. Dropping a handler future mid-fetch
//! therefore never leaves a partial entry behind.

use super::eviction::EvictionManager;
use super::fallback::OfflineFallback;
use super::generation_set::GenerationSet;
use super::network::Network;
use super::request::{AgentRequest, AgentResponse, ResponseSource};
use super::signals::{AgentSignal, Signals};
use crate::cache::{CacheDb, CacheEntry, CacheKey, Category, Generation};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Serves one request according to a single strategy.
#[async_trait::async_trait]
pub trait StrategyHandler: Send + Sync {
    async fn handle(&self, request: &AgentRequest, generations: &GenerationSet) -> AgentResponse;
}

/// Capabilities shared by every handler.
#[derive(Clone)]
pub struct HandlerContext {
    pub db: CacheDb,
    pub network: Arc<dyn Network>,
    pub eviction: EvictionManager,
    pub fallback: OfflineFallback,
    pub signals: Signals,
}

impl HandlerContext {
    /// Store read; a failing store reads as a miss.
    async fn lookup(&self, generation: &Generation, key: &CacheKey) -> Option<CacheEntry> {
        match self.db.get_entry(&generation.name(), key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, generation = %generation.name(), "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Store write followed by eviction; a failing store makes this a no-op.
    /// Only GET responses are ever written.
    async fn store(&self, generation: &Generation, key: CacheKey, response: &AgentResponse) {
        if !key.is_cacheable() {
            tracing::debug!(method = %key.method(), url = %key.url(), "not cacheable, skipping write");
            return;
        }
        let entry = response.to_entry(key);
        if let Err(e) = self.db.put_entry(generation, &entry).await {
            tracing::warn!(error = %e, generation = %generation.name(), "cache write failed, skipping");
            return;
        }
        if let Err(e) = self.eviction.enforce(generation).await {
            tracing::warn!(error = %e, generation = %generation.name(), "eviction failed");
        }
    }

    /// Last resort after network and store both came up empty.
    async fn degrade(
        &self, request: &AgentRequest, generations: &GenerationSet, otherwise: fn() -> AgentResponse,
    ) -> AgentResponse {
        if !request.is_navigational() {
            return otherwise();
        }
        self.signals.emit(AgentSignal::Offline { url: request.url.to_string() });
        self.fallback.respond(generations).await
    }
}

/// Serve from the static generation if present, else fetch and store.
pub struct CacheFirst {
    ctx: HandlerContext,
}

impl CacheFirst {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl StrategyHandler for CacheFirst {
    async fn handle(&self, request: &AgentRequest, generations: &GenerationSet) -> AgentResponse {
        let generation = generations.get(Category::Static);
        let key = request.key();

        if let Some(entry) = self.ctx.lookup(generation, &key).await {
            tracing::debug!(url = %request.url, "cache hit");
            return AgentResponse::from_entry(entry, ResponseSource::Cache);
        }

        match self.ctx.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.ctx.store(generation, key, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "fetch failed on cache miss");
                self.ctx
                    .degrade(request, generations, AgentResponse::network_error)
                    .await
            }
        }
    }
}

/// Fetch fresh into the runtime generation, fall back to stored copies on failure.
pub struct NetworkFirst {
    ctx: HandlerContext,
}

impl NetworkFirst {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait::async_trait]
impl StrategyHandler for NetworkFirst {
    async fn handle(&self, request: &AgentRequest, generations: &GenerationSet) -> AgentResponse {
        let runtime = generations.get(Category::Runtime);
        let key = request.key();

        let error = match self.ctx.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.ctx.store(runtime, key, &response).await;
                }
                return response;
            }
            Err(e) => e,
        };

        tracing::debug!(url = %request.url, error = %error, "network failed, trying cache");

        // Precached pages live in the static generation.
        for generation in [runtime, generations.get(Category::Static)] {
            if let Some(entry) = self.ctx.lookup(generation, &key).await {
                self.ctx
                    .signals
                    .emit(AgentSignal::ServingFromCache { url: request.url.to_string() });
                return AgentResponse::from_entry(entry, ResponseSource::Cache);
            }
        }

        self.ctx
            .degrade(request, generations, AgentResponse::unavailable)
            .await
    }
}

/// Cache-First for images, where entries older than the generation's TTL count as misses.
pub struct ExpiringCacheFirst {
    ctx: HandlerContext,
}

impl ExpiringCacheFirst {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

/// An entry is fresh while strictly younger than `ttl`. No TTL means never stale.
pub fn is_fresh(entry: &CacheEntry, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
    ttl.is_none_or(|ttl| entry.age(now) < ttl)
}

#[async_trait::async_trait]
impl StrategyHandler for ExpiringCacheFirst {
    async fn handle(&self, request: &AgentRequest, generations: &GenerationSet) -> AgentResponse {
        let generation = generations.get(Category::Image);
        let key = request.key();

        let previous = self.ctx.lookup(generation, &key).await;
        if let Some(entry) = &previous
            && is_fresh(entry, generation.policy.ttl, Utc::now())
        {
            tracing::debug!(url = %request.url, "image cache hit");
            return AgentResponse::from_entry(entry.clone(), ResponseSource::Cache);
        }

        match self.ctx.network.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.ctx.store(generation, key, &response).await;
                }
                response
            }
            Err(e) => match previous {
                Some(stale) => {
                    tracing::debug!(url = %request.url, error = %e, "serving expired image");
                    AgentResponse::from_entry(stale, ResponseSource::Cache)
                }
                None => {
                    tracing::warn!(url = %request.url, error = %e, "image fetch failed");
                    self.ctx
                        .degrade(request, generations, AgentResponse::network_error)
                        .await
                }
            },
        }
    }
}

/// Straight to the network, nothing stored.
pub struct NetworkOnly {
    network: Arc<dyn Network>,
}

impl NetworkOnly {
    pub fn new(network: Arc<dyn Network>) -> Self {
        Self { network }
    }
}

#[async_trait::async_trait]
impl StrategyHandler for NetworkOnly {
    async fn handle(&self, request: &AgentRequest, _generations: &GenerationSet) -> AgentResponse {
        self.network.fetch(request).await.unwrap_or_else(|e| {
            tracing::debug!(url = %request.url, error = %e, "network-only fetch failed");
            AgentResponse::network_error()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::agent::request::Destination;
    use crate::agent::testing::{StubNetwork, test_config};
    use bytes::Bytes;
    use url::Url;

    struct Fixture {
        ctx: HandlerContext,
        network: Arc<StubNetwork>,
        generations: GenerationSet,
    }

    async fn fixture(network: StubNetwork) -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        let config = test_config("v1");
        let network = Arc::new(network);
        let origin = Url::parse(&config.app_origin).unwrap();
        let ctx = HandlerContext {
            db: db.clone(),
            network: network.clone(),
            eviction: EvictionManager::new(db.clone()),
            fallback: OfflineFallback::new(db, &origin, &config.offline_page).unwrap(),
            signals: Signals::new(),
        };
        Fixture { ctx, network, generations: GenerationSet::for_version(&config, "v1") }
    }

    impl Fixture {
        async fn seed(&self, category: Category, url: &str, body: &'static str, stored_at: DateTime<Utc>) {
            let entry = CacheEntry {
                key: CacheKey::new("GET", url).unwrap(),
                status: 200,
                headers: Vec::new(),
                body: Bytes::from_static(body.as_bytes()),
                stored_at,
            };
            self.ctx.db.put_entry(self.generations.get(category), &entry).await.unwrap();
        }

        async fn stored(&self, category: Category, url: &str) -> Option<CacheEntry> {
            let key = CacheKey::new("GET", url).unwrap();
            self.ctx
                .db
                .get_entry(&self.generations.get(category).name(), &key)
                .await
                .unwrap()
        }
    }

    fn get(url: &str, destination: Destination) -> AgentRequest {
        AgentRequest::new("GET", url, destination).unwrap()
    }

    #[tokio::test]
    async fn test_cache_first_hit_skips_network() {
        let f = fixture(StubNetwork::new()).await;
        f.seed(Category::Static, "https://bistro.test/styles.css", "cached", Utc::now()).await;

        let handler = CacheFirst::new(f.ctx.clone());
        let response = handler
            .handle(&get("https://bistro.test/styles.css", Destination::Style), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"cached"));
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(f.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_first_miss_fetches_and_stores() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/script.js", 200, "js")).await;
        let handler = CacheFirst::new(f.ctx.clone());
        let request = get("https://bistro.test/script.js", Destination::Script);

        let first = handler.handle(&request, &f.generations).await;
        let second = handler.handle(&request, &f.generations).await;

        assert_eq!(first.source, ResponseSource::Network);
        assert_eq!(second.source, ResponseSource::Cache);
        assert_eq!(second.body, Bytes::from_static(b"js"));
        assert_eq!(f.network.calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_first_does_not_store_errors() {
        let f = fixture(StubNetwork::new()).await;
        let handler = CacheFirst::new(f.ctx.clone());

        let response = handler
            .handle(&get("https://bistro.test/missing.css", Destination::Style), &f.generations)
            .await;

        assert_eq!(response.status, 404);
        assert!(f.stored(Category::Static, "https://bistro.test/missing.css").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_first_offline_subresource_is_transport_error() {
        let f = fixture(StubNetwork::new()).await;
        f.network.set_online(false);

        let response = CacheFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/script.js", Destination::Script), &f.generations)
            .await;

        assert_eq!(response.status, 408);
        assert_eq!(response.source, ResponseSource::Synthetic);
    }

    #[tokio::test]
    async fn test_cache_first_offline_navigation_gets_offline_page() {
        let f = fixture(StubNetwork::new()).await;
        f.seed(Category::Static, "https://bistro.test/offline.html", "offline", Utc::now()).await;
        f.network.set_online(false);

        let response = CacheFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/fonts.css", Destination::Document), &f.generations)
            .await;

        assert_eq!(response.source, ResponseSource::OfflineFallback);
        assert_eq!(response.body, Bytes::from_static(b"offline"));
    }

    #[tokio::test]
    async fn test_network_first_overwrites_runtime_copy() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/news.html", 200, "fresh")).await;
        f.seed(Category::Runtime, "https://bistro.test/news.html", "old", Utc::now()).await;

        let response = NetworkFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/news.html", Destination::Document), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"fresh"));
        let stored = f.stored(Category::Runtime, "https://bistro.test/news.html").await.unwrap();
        assert_eq!(stored.body, Bytes::from_static(b"fresh"));
    }

    #[tokio::test]
    async fn test_network_first_offline_serves_cached_copy() {
        let f = fixture(StubNetwork::new()).await;
        f.seed(Category::Runtime, "https://bistro.test/news.html", "cached news", Utc::now()).await;
        f.network.set_online(false);
        let mut signals = f.ctx.signals.subscribe();

        let response = NetworkFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/news.html", Destination::Document), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"cached news"));
        assert_eq!(response.source, ResponseSource::Cache);
        assert_eq!(
            signals.try_recv().unwrap(),
            AgentSignal::ServingFromCache { url: "https://bistro.test/news.html".into() }
        );
    }

    #[tokio::test]
    async fn test_network_first_offline_falls_back_to_precached_page() {
        let f = fixture(StubNetwork::new()).await;
        f.seed(Category::Static, "https://bistro.test/", "home", Utc::now()).await;
        f.network.set_online(false);

        let response = NetworkFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/", Destination::Document), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"home"));
    }

    #[tokio::test]
    async fn test_network_first_offline_uncached_document_gets_offline_page() {
        let f = fixture(StubNetwork::new()).await;
        f.seed(Category::Static, "https://bistro.test/offline.html", "offline page", Utc::now()).await;
        f.network.set_online(false);

        let response = NetworkFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/never-seen.html", Destination::Document), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"offline page"));
        assert_eq!(response.source, ResponseSource::OfflineFallback);
    }

    #[tokio::test]
    async fn test_network_first_offline_uncached_subresource_is_unavailable() {
        let f = fixture(StubNetwork::new()).await;
        f.network.set_online(false);

        let response = NetworkFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/manifest.json", Destination::Other), &f.generations)
            .await;

        assert_eq!(response.status, 503);
    }

    #[tokio::test]
    async fn test_network_first_evicts_runtime_beyond_cap() {
        let network = StubNetwork::new();
        for n in 0..4 {
            network.set(&format!("https://bistro.test/p{n}.html"), 200, "page");
        }
        let f = fixture(network).await;
        let handler = NetworkFirst::new(f.ctx.clone());

        for n in 0..4 {
            handler
                .handle(&get(&format!("https://bistro.test/p{n}.html"), Destination::Document), &f.generations)
                .await;
        }

        let runtime = f.generations.get(Category::Runtime).name();
        assert_eq!(f.ctx.db.count_entries(&runtime).await.unwrap(), 3);
        assert!(f.stored(Category::Runtime, "https://bistro.test/p0.html").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_image_is_refetched() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/img/a.png", 200, "new")).await;
        let stale = Utc::now() - chrono::Duration::seconds(60 + 1);
        f.seed(Category::Image, "https://bistro.test/img/a.png", "old", stale).await;

        let response = ExpiringCacheFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/img/a.png", Destination::Image), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"new"));
        assert_eq!(f.network.calls(), 1);
        let stored = f.stored(Category::Image, "https://bistro.test/img/a.png").await.unwrap();
        assert!(stored.stored_at > stale);
    }

    #[tokio::test]
    async fn test_image_within_ttl_is_hit() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/img/a.png", 200, "new")).await;
        let recent = Utc::now() - chrono::Duration::seconds(60 - 1);
        f.seed(Category::Image, "https://bistro.test/img/a.png", "old", recent).await;

        let response = ExpiringCacheFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/img/a.png", Destination::Image), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"old"));
        assert_eq!(f.network.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_image_served_when_offline() {
        let f = fixture(StubNetwork::new()).await;
        let stale = Utc::now() - chrono::Duration::days(3);
        f.seed(Category::Image, "https://bistro.test/img/a.png", "stale", stale).await;
        f.network.set_online(false);

        let response = ExpiringCacheFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/img/a.png", Destination::Image), &f.generations)
            .await;

        assert_eq!(response.body, Bytes::from_static(b"stale"));
        assert_eq!(response.source, ResponseSource::Cache);
    }

    #[tokio::test]
    async fn test_uncached_image_offline_is_transport_error() {
        let f = fixture(StubNetwork::new()).await;
        f.network.set_online(false);

        let response = ExpiringCacheFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/img/a.png", Destination::Image), &f.generations)
            .await;

        assert_eq!(response.status, 408);
    }

    #[tokio::test]
    async fn test_image_generation_is_capped() {
        let network = StubNetwork::new();
        for n in 0..3 {
            network.set(&format!("https://bistro.test/img/{n}.png"), 200, "png");
        }
        let f = fixture(network).await;
        let handler = ExpiringCacheFirst::new(f.ctx.clone());

        for n in 0..3 {
            handler
                .handle(&get(&format!("https://bistro.test/img/{n}.png"), Destination::Image), &f.generations)
                .await;
        }

        let image = f.generations.get(Category::Image).name();
        assert_eq!(f.ctx.db.count_entries(&image).await.unwrap(), 2);
        assert!(f.stored(Category::Image, "https://bistro.test/img/0.png").await.is_none());
    }

    #[test]
    fn test_freshness_boundary() {
        let now = Utc::now();
        let ttl = Duration::from_secs(60);
        let mut entry = CacheEntry {
            key: CacheKey::new("GET", "https://bistro.test/a.png").unwrap(),
            status: 200,
            headers: Vec::new(),
            body: Bytes::new(),
            stored_at: now - chrono::Duration::seconds(59),
        };
        assert!(is_fresh(&entry, Some(ttl), now));

        entry.stored_at = now - chrono::Duration::seconds(60);
        assert!(!is_fresh(&entry, Some(ttl), now));
        assert!(is_fresh(&entry, None, now));
    }

    struct HangingNetwork;

    #[async_trait::async_trait]
    impl Network for HangingNetwork {
        async fn fetch(&self, _request: &AgentRequest) -> Result<AgentResponse, Error> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_abandoned_request_commits_nothing() {
        let f = fixture(StubNetwork::new()).await;
        let ctx = HandlerContext { network: Arc::new(HangingNetwork), ..f.ctx.clone() };
        let handler = CacheFirst::new(ctx);
        let request = get("https://bistro.test/script.js", Destination::Script);

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), handler.handle(&request, &f.generations)).await;

        assert!(abandoned.is_err());
        assert!(f.stored(Category::Static, "https://bistro.test/script.js").await.is_none());
    }

    #[tokio::test]
    async fn test_network_only_never_stores() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/api/order", 200, "ok")).await;
        let request = AgentRequest::new("POST", "https://bistro.test/api/order", Destination::Other).unwrap();

        let response = NetworkOnly::new(f.ctx.network.clone()).handle(&request, &f.generations).await;

        assert_eq!(response.status, 200);
        assert_eq!(f.ctx.db.count_namespace_entries("bistro").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_non_get_response_is_never_stored() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/menu.html", 200, "menu")).await;
        let request = AgentRequest::new("POST", "https://bistro.test/menu.html", Destination::Document).unwrap();

        let response = NetworkFirst::new(f.ctx.clone()).handle(&request, &f.generations).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(f.ctx.db.count_namespace_entries("bistro").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_to_retired_generation_is_skipped() {
        let f = fixture(StubNetwork::new().with("https://bistro.test/menu.html", 200, "menu")).await;
        f.ctx.db.activate_version("bistro", "v2").await.unwrap();

        let response = NetworkFirst::new(f.ctx.clone())
            .handle(&get("https://bistro.test/menu.html", Destination::Document), &f.generations)
            .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body, Bytes::from_static(b"menu"));
        assert!(f.ctx.db.list_generations("bistro").await.unwrap().is_empty());
    }
}
