//! Error types for drainq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    /// The named queue does not exist on the backend. Fatal when raised
    /// during startup resolution of literal names; benign when a
    /// dynamically-discovered queue vanished between refreshes.
    #[error("queue does not exist: {0}")]
    QueueDoesNotExist(String),

    /// Backend transport fault (connectivity, throttling, malformed
    /// response). Isolated per queue by the service loop.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// A failure the execution layer has already recognized and logged.
    /// The message is still deleted; retry happens only via re-enqueue.
    #[error("task execution failed: {0}")]
    ExecutionFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
