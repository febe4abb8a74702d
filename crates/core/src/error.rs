//! Unified error types for the tether agent.
//!
//! Each variant's display string starts with a stable code so log lines and
//! control replies can be matched without parsing the detail.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error type for the cache store, the strategy handlers and the lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Network unreachable, connection reset, transport timeout.
    #[error("TRANSPORT_FAILURE: {0}")]
    Transport(String),

    /// Persistent store unavailable or a write was rejected.
    #[error("STORE_FAILURE: {0}")]
    Database(tokio_rusqlite::Error),

    /// Write aimed at a generation of a version that is no longer active.
    #[error("STORE_FAILURE: generation retired: {0}")]
    GenerationRetired(String),

    /// Migration failed to apply.
    #[error("STORE_FAILURE: migration failed: {0}")]
    MigrationFailed(String),

    /// A precache fetch failed; the candidate version is abandoned.
    #[error("INSTALL_FAILED: {version}: {reason}")]
    InstallFailed { version: String, reason: String },

    /// Malformed or unknown control message.
    #[error("PROTOCOL_ERROR: {0}")]
    Protocol(String),

    /// URL could not be normalized into a cache key.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No version has completed activation yet.
    #[error("NO_ACTIVE_VERSION")]
    NoActiveVersion,
}

impl Error {
    /// True for failures that handlers recover from by falling back to the store.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::Transport(msg) => (-32000, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::GenerationRetired(_) => (-32002, err.to_string()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::InstallFailed { .. } => (-32004, err.to_string()),
            Error::Protocol(msg) => (-32005, msg.clone()),
            Error::NoActiveVersion => (-32006, "No active version".to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
