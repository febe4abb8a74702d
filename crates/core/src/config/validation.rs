//! Configuration validation rules.
//!
//! This module provides validation logic for `AgentConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AgentConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AgentConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `namespace` or `version` is empty or contains whitespace
    /// - `app_origin` or a font origin is not an absolute http(s) URL
    /// - a manifest path or `offline_page` is not absolute, or `offline_page` is not precached
    /// - a generation cap, the image TTL, or `install_concurrency` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `max_bytes` is 0 or exceeds 100MB
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("namespace", &self.namespace), ("version", &self.version)] {
            if value.is_empty() {
                return Err(invalid(field, "must not be empty"));
            }
            if value.chars().any(char::is_whitespace) {
                return Err(invalid(field, "must not contain whitespace"));
            }
        }

        check_origin("app_origin", &self.app_origin)?;
        for origin in &self.font_origins {
            check_origin("font_origins", origin)?;
        }

        if let Some(path) = self.precache_manifest.iter().find(|p| !p.starts_with('/')) {
            return Err(invalid("precache_manifest", format!("path must be absolute: {path}")));
        }
        if !self.offline_page.starts_with('/') {
            return Err(invalid("offline_page", "path must be absolute"));
        }
        if !self.precache_manifest.contains(&self.offline_page) {
            return Err(invalid("offline_page", "must be listed in precache_manifest"));
        }

        if self.runtime_max_entries == 0 {
            return Err(invalid("runtime_max_entries", "must be greater than 0"));
        }
        if self.image_max_entries == 0 {
            return Err(invalid("image_max_entries", "must be greater than 0"));
        }
        if self.image_ttl_secs == 0 {
            return Err(invalid("image_ttl_secs", "must be greater than 0"));
        }
        if self.install_concurrency == 0 {
            return Err(invalid("install_concurrency", "must be at least 1"));
        }

        if self.timeout_ms < 100 {
            return Err(invalid("timeout_ms", "must be at least 100ms"));
        }
        if self.timeout_ms > 300_000 {
            return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
        }

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 100 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 100MB"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        Ok(())
    }
}

fn check_origin(field: &str, origin: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(origin).map_err(|e| invalid(field, format!("{origin}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err(invalid(field, format!("not an http(s) origin: {origin}")));
    }
    Ok(())
}
