//! Error types for the courier.

use std::fmt;
use thiserror::Error;

/// Invalid or incomplete client configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("write key is required")]
    MissingWriteKey,

    #[error("data plane url is required")]
    MissingDataPlaneUrl,

    #[error("invalid duration: {0:?}")]
    InvalidDuration(String),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    /// The client must be constructed inside a Tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// How a request failed before a response arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection could not be established or was reset.
    Connect,
    Timeout,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Other => "other",
        })
    }
}

/// Terminal outcome handed to a submission's completion.
///
/// Cloned once per item when a batch settles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Rejected at submission because the buffer was full.
    #[error("event dropped: {buffered} events buffered (max {capacity})")]
    Dropped { buffered: usize, capacity: usize },

    #[error("transport error ({kind}): {message}")]
    Transport {
        kind: TransportErrorKind,
        message: String,
    },

    /// The endpoint answered with a non-2xx status.
    #[error("request rejected with status {status}: {status_text}")]
    Rejected { status: u16, status_text: String },

    /// The durable queue gave up after its attempt limit.
    #[error("delivery abandoned after {attempts} attempts")]
    Abandoned { attempts: u32 },

    /// The batch could not be written to the durable queue.
    #[error("failed to persist batch: {0}")]
    Persistence(String),
}

impl DeliveryError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        crate::retry::is_retryable(self)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Durable queue activation failure.
#[derive(Error, Debug)]
pub enum QueueSetupError {
    /// The store could not be reached or configured.
    #[error("durable queue initialization failed: {0}")]
    Initialization(String),

    /// More than one job was found active at startup. With a single
    /// consumer per queue this cannot happen, so the store is not trusted.
    #[error("found {active} active jobs while starting up the durable queue")]
    InvariantViolation { active: usize },

    #[error("durable queue recovery failed: {0}")]
    Recovery(#[from] durable_job_queue::QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_messages() {
        let err = DeliveryError::Rejected {
            status: 400,
            status_text: "Bad Request".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "request rejected with status 400: Bad Request"
        );
        assert_eq!(err.status(), Some(400));

        let err = DeliveryError::Transport {
            kind: TransportErrorKind::Timeout,
            message: "deadline elapsed".to_string(),
        };
        assert_eq!(err.to_string(), "transport error (timeout): deadline elapsed");
        assert_eq!(err.status(), None);
    }
}
