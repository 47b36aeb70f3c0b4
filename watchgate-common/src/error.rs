//! Common error types for Watchgate

use thiserror::Error;

/// Common result type for Watchgate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the engine and its call sites
#[derive(Error, Debug)]
pub enum Error {
    /// Parameter file loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
