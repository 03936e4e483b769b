//! Error types shared across the coordinator.
//!
//! Network failures have their own type in [`crate::network::NetworkError`];
//! everything else surfaces through [`WorkerError`].

use std::path::PathBuf;

use thiserror::Error;

use crate::network::NetworkError;
use crate::worker::LifecycleState;

/// Result type alias for coordinator operations
pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode or decode cache data: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid store name: {0}")]
    InvalidStoreName(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Precache failed for {url}: {reason}")]
    Precache { url: String, reason: String },

    #[error("No cached response or fallback for {url}: {source}")]
    NoFallback {
        url: String,
        #[source]
        source: NetworkError,
    },

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("Cannot {action} while worker is {state}")]
    InvalidState {
        state: LifecycleState,
        action: &'static str,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Worker event loop has shut down")]
    Closed,
}
