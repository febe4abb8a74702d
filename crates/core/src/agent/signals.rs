//! Lifecycle signals emitted to application-side collaborators.

use serde::Serialize;
use tokio::sync::broadcast;

/// Capacity of the signal channel; slow subscribers lag and skip old signals.
pub const SIGNAL_CAPACITY: usize = 64;

/// Something collaborators may want to surface ("new version ready", "offline").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum AgentSignal {
    /// A new version is installed and waiting to activate.
    Installed { version: String },
    /// The candidate version failed to install; the previous version keeps serving.
    InstallFailed { version: String, reason: String },
    /// A new version is active and controls every open application context.
    Activated { version: String },
    /// The network failed and a stored copy was served instead.
    ServingFromCache { url: String },
    /// The network failed and only the offline page was available.
    Offline { url: String },
}

/// Sending half shared by every component that emits signals.
#[derive(Debug, Clone)]
pub struct Signals {
    tx: broadcast::Sender<AgentSignal>,
}

impl Signals {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentSignal> {
        self.tx.subscribe()
    }

    /// Emit to current subscribers. Having none is not an error.
    pub fn emit(&self, signal: AgentSignal) {
        self.tx.send(signal).ok();
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::new()
    }
}
