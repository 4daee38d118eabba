//! Validation error types.

use thiserror::Error;

/// Reasons an event is rejected before it is buffered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The event is not a JSON object.
    #[error("Message must be an object")]
    NotAnObject,

    /// A field required for this event type is absent or empty.
    #[error("{message_type} message requires `{field}`")]
    MissingField {
        /// The declared event type.
        message_type: &'static str,
        /// The missing field.
        field: &'static str,
    },

    /// Neither `userId` nor `anonymousId` is present.
    #[error("You must pass either an `anonymousId` or a `userId`")]
    MissingIdentity,

    /// A field is present with the wrong JSON type.
    #[error("`{field}` must be {expected}")]
    InvalidField {
        /// The offending field.
        field: &'static str,
        /// Human readable description of the expected type.
        expected: &'static str,
    },
}

/// Result type for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;
