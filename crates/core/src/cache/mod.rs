//! SQLite-backed Cache Store.
//!
//! A persistent, namespaced key→entry store addressed by generation name,
//! using SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Generations named `<namespace>-<version>-<category>` with a size/age policy
//! - Insertion-ordered entries, replaced wholesale on overwrite
//! - Atomic multi-entry writes for precaching
//! - Automatic schema migrations and WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod generations;
pub mod hash;
pub mod key;
pub mod migrations;
pub mod state;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::CacheEntry;
pub use generations::{Category, Generation, GenerationPolicy, generation_name};
pub use key::{CacheKey, canonicalize};
