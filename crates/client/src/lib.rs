//! Network transport for the tether agent.
//!
//! This crate provides the reqwest-backed `Network` implementation the
//! server plugs into the agent.

pub mod fetch;

pub use fetch::{FetchClient, FetchConfig};
