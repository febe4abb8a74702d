//! MCP tool implementations.
//!
//! This module contains all tools exposed by the tether agent server.

pub mod control;
pub mod intercept;
pub mod status;

pub use control::{ControlParams, control_impl};
pub use intercept::{InterceptOutput, InterceptParams, intercept_impl};
pub use status::status_impl;

#[cfg(test)]
pub(crate) mod testing;
