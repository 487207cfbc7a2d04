//! Error types.
//!
//! Degraded-but-expected conditions (buffer timeouts, missing reference
//! images, failed track loads) are reported through structured results, not
//! through these types.

use thiserror::Error;

pub use crate::fetch::FetchError;

/// Errors raised by a media element
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MediaError {
    #[error("media element error: {0}")]
    Element(String),
    #[error("play() rejected: {0}")]
    PlayRejected(String),
    #[error("media element has no source")]
    NoSource,
    #[error("event subscription closed")]
    SubscriptionClosed,
    #[error("hydration of {0} cancelled")]
    Cancelled(String),
}

/// Errors raised by the master clock and its audio backends
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),
    #[error("audio context is closed")]
    ContextClosed,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Errors raised by the preprocessing worker
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker stopped")]
    Stopped,
    #[error("worker thread failed to start: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("no worker response within {0:?}")]
    Timeout(std::time::Duration),
}

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Crate level error
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Media error: {0}")]
    Media(#[from] MediaError),
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T, E = SyncError> = std::result::Result<T, E>;
