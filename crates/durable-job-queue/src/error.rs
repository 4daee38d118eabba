//! Error types for the job queue.

use thiserror::Error;

/// Job queue error type.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Redis connection or command error
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored payload does not match the job envelope format
    #[error("Job codec error: {0}")]
    Codec(String),

    /// Invalid connection parameters
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for job queue operations.
pub type QueueResult<T> = Result<T, QueueError>;
