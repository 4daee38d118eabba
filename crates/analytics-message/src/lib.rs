//! Analytics event model, validation and normalization.
//!
//! Every submitted event passes through two steps before it reaches the
//! delivery engine:
//!
//! 1. [`validate`] applies the loose schema contract (required identifiers,
//!    object-typed sections, timestamp format). Oversized events are logged
//!    but accepted.
//! 2. [`Normalizer::normalize`] stamps defaults: `type`, `context.library`,
//!    `_metadata`, `originalTimestamp` and a unique `messageId`, and coerces
//!    legacy non-string identifiers to strings.
//!
//! Normalization is idempotent on an already-normalized event: a second pass
//! keeps `messageId`, `context.library` and the coerced identifiers.

mod error;
mod message;
mod normalize;
mod validate;

pub use error::{ValidationError, ValidationResult};
pub use message::{Event, LibraryInfo, MessageType};
pub use normalize::{content_digest, Normalizer};
pub use validate::{validate, MAX_MESSAGE_BYTES};
