//! Install → activate state machine.
//!
//! Install precaches the manifest into the candidate version's static
//! generation, all or nothing. Activate persists the candidate as the active
//! version and deletes every generation of another version in one store
//! transaction, and only then announces it, so version queries never observe a
//! half-activated candidate.

use super::generation_set::GenerationSet;
use super::network::{Network, fetch_all};
use super::request::AgentRequest;
use super::signals::{AgentSignal, Signals};
use crate::Error;
use crate::cache::{CacheDb, Category};
use crate::config::AgentConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, Notify, RwLock};
use url::Url;

/// Where the candidate version is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Nothing attempted yet.
    Idle,
    Installing,
    /// Precache complete, waiting for permission to activate.
    Installed,
    Activating,
    Active,
    /// Install failed; whatever was active before keeps serving.
    Failed,
}

pub struct LifecycleManager {
    config: Arc<AgentConfig>,
    origin: Url,
    db: CacheDb,
    network: Arc<dyn Network>,
    signals: Signals,
    state: RwLock<LifecycleState>,
    active: RwLock<Option<String>>,
    install_lock: Mutex<()>,
    waiting: Notify,
}

impl LifecycleManager {
    /// Build the manager, restoring the active version persisted by a previous run.
    pub async fn load(
        config: Arc<AgentConfig>, db: CacheDb, network: Arc<dyn Network>, signals: Signals,
    ) -> Result<Self, Error> {
        let origin = Url::parse(&config.app_origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        let active = db.active_version(&config.namespace).await?;
        let state = if active.is_some() { LifecycleState::Active } else { LifecycleState::Idle };

        if let Some(version) = &active {
            tracing::info!(version, "restored active version");
        }

        Ok(Self {
            config,
            origin,
            db,
            network,
            signals,
            state: RwLock::new(state),
            active: RwLock::new(active),
            install_lock: Mutex::new(()),
            waiting: Notify::new(),
        })
    }

    pub async fn state(&self) -> LifecycleState {
        *self.state.read().await
    }

    /// Version whose generations currently serve requests.
    pub async fn active_version(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    /// Generations of the active version, or `None` before the first activation.
    pub async fn serving_generations(&self) -> Option<GenerationSet> {
        let active = self.active.read().await;
        active
            .as_deref()
            .map(|version| GenerationSet::for_version(&self.config, version))
    }

    /// Generations of the version this agent was configured with.
    pub fn candidate_generations(&self) -> GenerationSet {
        GenerationSet::for_version(&self.config, &self.config.version)
    }

    /// Hold off installs while the guard lives. Cache wipes take this so they
    /// never race a precache write.
    pub async fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.install_lock.lock().await
    }

    async fn transition(&self, to: LifecycleState) {
        let mut state = self.state.write().await;
        tracing::debug!(from = ?*state, ?to, "lifecycle transition");
        *state = to;
    }

    /// Precache the manifest into the candidate version's generations.
    ///
    /// Every manifest path is fetched before anything is written; a single
    /// failed fetch or non-success status abandons the candidate and leaves
    /// the store untouched.
    pub async fn install(&self) -> Result<(), Error> {
        let _guard = self.install_lock.lock().await;
        let version = self.config.version.clone();
        let generations = self.candidate_generations();

        tracing::info!(%version, paths = self.config.precache_manifest.len(), "installing");
        self.transition(LifecycleState::Installing).await;

        match self.precache(&generations).await {
            Ok(count) => {
                tracing::info!(%version, count, "install complete");
                self.transition(LifecycleState::Installed).await;
                self.signals.emit(AgentSignal::Installed { version });
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::error!(%version, %reason, "install failed, keeping previous version");
                self.transition(LifecycleState::Failed).await;
                self.signals
                    .emit(AgentSignal::InstallFailed { version: version.clone(), reason: reason.clone() });
                Err(Error::InstallFailed { version, reason })
            }
        }
    }

    async fn precache(&self, generations: &GenerationSet) -> Result<usize, Error> {
        let requests = self
            .config
            .precache_manifest
            .iter()
            .map(|path| AgentRequest::resolve(&self.origin, path))
            .collect::<Result<Vec<_>, _>>()?;

        let fetched = fetch_all(self.network.clone(), requests, self.config.install_concurrency).await?;

        let target = generations.get(Category::Static).name();
        let entries: Vec<_> = fetched
            .iter()
            .map(|(request, response)| (target.clone(), response.to_entry(request.key())))
            .collect();
        let count = entries.len();

        self.db
            .put_entries_atomic(generations.all().to_vec(), entries)
            .await?;
        Ok(count)
    }

    /// Let an installed version activate without waiting for clients to close.
    ///
    /// Remembered if no install is waiting yet.
    pub fn skip_waiting(&self) {
        tracing::debug!("skip waiting requested");
        self.waiting.notify_one();
    }

    async fn wait_for_activation(&self) {
        if self.config.skip_waiting {
            return;
        }
        tracing::info!(version = %self.config.version, "installed, waiting for SKIP_WAITING");
        self.waiting.notified().await;
    }

    /// Retire every generation of another version and make the candidate active.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` unless install completed first.
    pub async fn activate(&self) -> Result<(), Error> {
        {
            let mut state = self.state.write().await;
            if *state != LifecycleState::Installed {
                return Err(Error::InvalidInput(format!("cannot activate from state {:?}", *state)));
            }
            *state = LifecycleState::Activating;
        }

        let version = self.config.version.clone();
        let deleted = self
            .db
            .activate_version(&self.config.namespace, &version)
            .await?;
        *self.active.write().await = Some(version.clone());
        self.transition(LifecycleState::Active).await;

        tracing::info!(%version, deleted, "activated, deleted old generations, claiming clients");
        self.signals.emit(AgentSignal::Activated { version });
        Ok(())
    }

    /// Full startup sequence: install, wait if configured to, activate.
    pub async fn run(&self) -> Result<(), Error> {
        self.install().await?;
        self.wait_for_activation().await;
        self.activate().await
    }
}
