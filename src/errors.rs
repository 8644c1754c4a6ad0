//! Configuration-Distribution Error Hierarchy
//!
//! Defines error types for the long-polling config protocol, categorized by
//! protocol layer and operational concerns.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (network, local disk)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Settings validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Server-reported outcome of a point fetch
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    // Network layer
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // Local disk layer
    #[error("Storage operation failed")]
    Storage(#[from] StorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Endpoint unavailable (HTTP 503 equivalent)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Request did not complete within the read timeout
    #[error("Request to {endpoint} timed out after {duration:?}")]
    Timeout { endpoint: String, duration: Duration },

    /// Unreachable server with source context
    #[error("Network unreachable: {source}")]
    Unreachable {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Every configured server failed for one request
    #[error("All {attempted} configured servers failed")]
    AllServersFailed { attempted: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Concurrent modification on the server (HTTP 409); retryable by the caller
    #[error("Config being modified concurrently: {key}")]
    Conflict { key: String },

    /// Caller has no access to this key (HTTP 403)
    #[error("Access to {key} forbidden: {message}")]
    Forbidden { key: String, message: String },

    /// Any other non-2xx point-fetch outcome, with the server's body attached
    #[error("Server returned {code} for {key}: {body}")]
    Status { key: String, code: u16, body: String },
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Disk I/O failures during failover/snapshot operations
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// I/O failure with the offending path attached
    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },
}

// ============== Conversion Implementations ============== //
impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::System(SystemError::Transport(e))
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}
