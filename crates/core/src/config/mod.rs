//! Agent configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (TETHER_*)
//! 2. TOML config file (if TETHER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::{Category, Generation, GenerationPolicy};

mod validation;

pub use validation::ConfigError;

/// Agent configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (TETHER_*)
/// 2. TOML config file (if TETHER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Prefix shared by every generation this agent owns.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Version of the application build this agent caches for.
    ///
    /// Changing it triggers a fresh install and retires the previous generations.
    #[serde(default = "default_version")]
    pub version: String,

    /// Path to the SQLite cache store.
    ///
    /// Set via TETHER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin of the application, e.g. `https://bistro.example`.
    ///
    /// Requests to any other origin are cross-origin.
    #[serde(default = "default_app_origin")]
    pub app_origin: String,

    /// Absolute paths fetched and stored during install, in order.
    #[serde(default = "default_precache_manifest")]
    pub precache_manifest: Vec<String>,

    /// Page served to navigations when both network and cache fail.
    ///
    /// Must be listed in `precache_manifest`.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Cross-origin font providers that are cached Cache-First.
    #[serde(default = "default_font_origins")]
    pub font_origins: Vec<String>,

    /// Entry cap of the runtime generation.
    #[serde(default = "default_runtime_max_entries")]
    pub runtime_max_entries: usize,

    /// Entry cap of the image generation.
    #[serde(default = "default_image_max_entries")]
    pub image_max_entries: usize,

    /// Age in seconds after which a stored image is refetched.
    #[serde(default = "default_image_ttl_secs")]
    pub image_ttl_secs: u64,

    /// Activate straight after a successful install instead of waiting for SKIP_WAITING.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// User-Agent string for network fetches.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Transport timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum bytes accepted per response body.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Concurrent manifest fetches during install.
    #[serde(default = "default_install_concurrency")]
    pub install_concurrency: usize,
}

fn default_namespace() -> String {
    "tether".into()
}

fn default_version() -> String {
    "v1.0.0".into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./tether-cache.sqlite")
}

fn default_app_origin() -> String {
    "http://localhost:8080".into()
}

fn default_precache_manifest() -> Vec<String> {
    [
        "/",
        "/index.html",
        "/news.html",
        "/privacy.html",
        "/offline.html",
        "/styles.css",
        "/cookieconsent.css",
        "/script.js",
        "/cookieconsent.js",
        "/analytics.js",
        "/pwa.js",
        "/manifest.json",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_font_origins() -> Vec<String> {
    vec!["https://fonts.googleapis.com".into(), "https://fonts.gstatic.com".into()]
}

fn default_runtime_max_entries() -> usize {
    50
}

fn default_image_max_entries() -> usize {
    60
}

fn default_image_ttl_secs() -> u64 {
    30 * 24 * 60 * 60 // 30 days
}

fn default_true() -> bool {
    true
}

fn default_user_agent() -> String {
    "tether/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_max_bytes() -> usize {
    10_485_760 // 10MB
}

fn default_install_concurrency() -> usize {
    4
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            version: default_version(),
            db_path: default_db_path(),
            app_origin: default_app_origin(),
            precache_manifest: default_precache_manifest(),
            offline_page: default_offline_page(),
            font_origins: default_font_origins(),
            runtime_max_entries: default_runtime_max_entries(),
            image_max_entries: default_image_max_entries(),
            image_ttl_secs: default_image_ttl_secs(),
            skip_waiting: true,
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            max_bytes: default_max_bytes(),
            install_concurrency: default_install_concurrency(),
        }
    }
}

impl AgentConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Image TTL as Duration.
    pub fn image_ttl(&self) -> Duration {
        Duration::from_secs(self.image_ttl_secs)
    }

    /// Size/age policy attached to generations of `category`.
    pub fn policy_for(&self, category: Category) -> GenerationPolicy {
        match category {
            Category::Static => GenerationPolicy::unbounded(),
            Category::Runtime => GenerationPolicy::capped(self.runtime_max_entries),
            Category::Image => GenerationPolicy::expiring(self.image_max_entries, self.image_ttl()),
        }
    }

    /// The generation of `category` for `version` under this config's namespace.
    pub fn generation(&self, version: &str, category: Category) -> Generation {
        Generation::new(&self.namespace, version, category, self.policy_for(category))
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `TETHER_`
    /// 2. TOML file from `TETHER_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("TETHER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("TETHER_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
