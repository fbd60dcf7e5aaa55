//! Error types for the polling engine.

use thiserror::Error;

use dabridge_common::TagPath;

/// Result type alias using [`EngineError`].
pub type Result<T> = std::result::Result<T, EngineError>;

/// Per-tag read failure. Non-fatal: the tag is skipped for the tick.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    /// The read did not complete within the per-read timeout.
    #[error("Read timed out")]
    Timeout,

    /// The source is unreachable or the connection dropped.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The tag does not exist on the source.
    #[error("Tag not found: {0}")]
    TagNotFound(TagPath),

    /// The source answered with something the bridge cannot interpret.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Write-back failure, surfaced to the requesting client.
#[derive(Debug, Clone, Error)]
pub enum WriteError {
    /// The source refused the value.
    #[error("Write rejected: {0}")]
    Rejected(String),

    /// The source does not support writing at all.
    #[error("Source does not support writes")]
    Unsupported,

    /// Transport-level failure while writing.
    #[error("Write failed: {0}")]
    Source(String),
}

/// Sink delivery failure. Degrades health, never stops polling.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to hand a reading to the transport.
    #[error("Failed to deliver to {key}: {message}")]
    Delivery { key: String, message: String },

    /// Payload could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The sink has been closed.
    #[error("Sink closed")]
    Closed,
}

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Catalog construction failed. Fatal at startup.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Invalid engine configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker pool queue is closed.
    #[error("Worker pool is shut down")]
    PoolClosed,

    /// Sink failure escalated out of the engine.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl EngineError {
    /// Create a discovery error.
    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
