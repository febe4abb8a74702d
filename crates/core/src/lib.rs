//! Core of the tether offline agent.
//!
//! This crate provides:
//! - Generation-scoped response store with SQLite backend
//! - Request classification and the caching strategy handlers
//! - Install/activate lifecycle and the control channel
//! - Unified error types
//! - Configuration structures

pub mod agent;
pub mod cache;
pub mod config;
pub mod error;

pub use agent::{
    Agent, AgentEvent, AgentOutcome, AgentRequest, AgentResponse, AgentSignal, AgentStatus, ControlReply,
    ControlRequest, ControlResponse, Destination, Network, ResponseSource, Strategy,
};
pub use cache::CacheDb;
pub use config::{AgentConfig, ConfigError};
pub use error::Error;
