//! Error types for watchgate-engine
//!
//! Defines engine-specific error types using thiserror. Persistence
//! failures distinguish transport-level problems (which may surface a
//! one-time notice to the learner) from ordinary HTTP failures (which
//! are logged and self-heal on the next write).

use thiserror::Error;

/// Main error type for the watch-progress engine
#[derive(Error, Debug)]
pub enum Error {
    /// Parameter or option validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Video source backend errors (load failure, lost handle)
    #[error("Source error: {0}")]
    Source(String),

    /// Video reference matched no known backend
    #[error("Unsupported video reference: {0}")]
    SourceUnsupported(String),

    /// Embedded backend handshake did not complete before the deadline
    #[error("Source handshake timed out after {waited_ms}ms")]
    HandshakeTimeout { waited_ms: u64 },

    /// Transport-level HTTP failure (connection, DNS, timeout)
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server rejected the request (4xx)
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Server-side failure (5xx)
    #[error("Server error ({status})")]
    Server { status: u16 },

    /// Progress record not found for this video
    #[error("No progress record: {0}")]
    NotFound(String),

    /// Shared validation/config errors
    #[error(transparent)]
    Common(#[from] watchgate_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this is a transport-level failure (as opposed to an HTTP
    /// status failure). Drives the `PersistFailed` event's severity.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Convenience Result type using the engine Error
pub type Result<T> = std::result::Result<T, Error>;
