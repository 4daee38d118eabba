//! Loose schema validation.
//!
//! The rules are intentionally permissive: only the fields the ingestion
//! endpoint cannot do without are enforced. An event larger than
//! [`MAX_MESSAGE_BYTES`] is accepted with a warning so older callers keep
//! working.

use crate::error::{ValidationError, ValidationResult};
use crate::message::MessageType;
use chrono::DateTime;
use serde_json::Value;
use tracing::warn;

/// Size ceiling above which an event is logged as oversized.
pub const MAX_MESSAGE_BYTES: usize = 32 << 10;

/// Sections that must be JSON objects when present.
const OBJECT_FIELDS: [&str; 4] = ["context", "traits", "properties", "integrations"];

/// Timestamp fields that must be RFC 3339 strings when present.
const TIMESTAMP_FIELDS: [&str; 2] = ["timestamp", "originalTimestamp"];

/// Validate `message` as an event of type `message_type`.
pub fn validate(message: &Value, message_type: MessageType) -> ValidationResult<()> {
    let object = message.as_object().ok_or(ValidationError::NotAnObject)?;

    match message_type {
        MessageType::Track => {
            let has_event = object
                .get("event")
                .and_then(Value::as_str)
                .is_some_and(|name| !name.is_empty());
            if !has_event {
                return Err(ValidationError::MissingField {
                    message_type: message_type.as_str(),
                    field: "event",
                });
            }
        }
        MessageType::Group => require(object, message_type, "groupId")?,
        MessageType::Alias => {
            require(object, message_type, "userId")?;
            require(object, message_type, "previousId")?;
        }
        MessageType::Identify | MessageType::Page | MessageType::Screen => {}
    }

    if message_type != MessageType::Alias
        && !is_present(object.get("userId"))
        && !is_present(object.get("anonymousId"))
    {
        return Err(ValidationError::MissingIdentity);
    }

    for field in OBJECT_FIELDS {
        if let Some(value) = object.get(field) {
            if !value.is_null() && !value.is_object() {
                return Err(ValidationError::InvalidField {
                    field,
                    expected: "an object",
                });
            }
        }
    }

    for field in TIMESTAMP_FIELDS {
        if let Some(value) = object.get(field) {
            let valid = value
                .as_str()
                .is_some_and(|raw| DateTime::parse_from_rfc3339(raw).is_ok());
            if !valid {
                return Err(ValidationError::InvalidField {
                    field,
                    expected: "an RFC 3339 timestamp",
                });
            }
        }
    }

    let size = serde_json::to_string(message).map(|s| s.len()).unwrap_or(0);
    if size > MAX_MESSAGE_BYTES {
        warn!(
            message_type = %message_type,
            size,
            limit = MAX_MESSAGE_BYTES,
            "Your message must be < 32kb. This is surfaced as a warning so existing callers keep working"
        );
    }

    Ok(())
}

fn require(
    object: &serde_json::Map<String, Value>,
    message_type: MessageType,
    field: &'static str,
) -> ValidationResult<()> {
    if is_present(object.get(field)) {
        Ok(())
    } else {
        Err(ValidationError::MissingField {
            message_type: message_type.as_str(),
            field,
        })
    }
}

/// Truthiness check for identifier fields: null, false, "" and 0 count as absent.
fn is_present(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracing_test::traced_test;

    #[test]
    fn test_rejects_non_object() {
        assert_eq!(
            validate(&json!("track me"), MessageType::Track),
            Err(ValidationError::NotAnObject)
        );
        assert_eq!(
            validate(&json!([1, 2]), MessageType::Identify),
            Err(ValidationError::NotAnObject)
        );
    }

    #[test]
    fn test_track_requires_event_name() {
        let err = validate(&json!({"userId": "u1"}), MessageType::Track).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                message_type: "track",
                field: "event"
            }
        );

        let err = validate(&json!({"userId": "u1", "event": ""}), MessageType::Track);
        assert!(err.is_err());

        assert!(validate(&json!({"userId": "u1", "event": "Signed Up"}), MessageType::Track).is_ok());
    }

    #[test]
    fn test_identity_required_except_alias() {
        for ty in [
            MessageType::Identify,
            MessageType::Page,
            MessageType::Screen,
        ] {
            assert_eq!(
                validate(&json!({"traits": {}}), ty),
                Err(ValidationError::MissingIdentity)
            );
        }

        // Numeric identifiers are still accepted.
        assert!(validate(&json!({"userId": 42}), MessageType::Identify).is_ok());
        assert!(validate(&json!({"anonymousId": "anon"}), MessageType::Page).is_ok());
        assert_eq!(
            validate(&json!({"userId": 0}), MessageType::Identify),
            Err(ValidationError::MissingIdentity)
        );
    }

    #[test]
    fn test_group_and_alias_requirements() {
        assert!(validate(&json!({"userId": "u1"}), MessageType::Group).is_err());
        assert!(validate(&json!({"userId": "u1", "groupId": "g1"}), MessageType::Group).is_ok());

        let err = validate(&json!({"userId": "u1"}), MessageType::Alias).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingField {
                message_type: "alias",
                field: "previousId"
            }
        );
        assert!(validate(&json!({"userId": "u1", "previousId": "u0"}), MessageType::Alias).is_ok());
    }

    #[test]
    fn test_object_sections() {
        let err = validate(
            &json!({"userId": "u1", "context": "mobile"}),
            MessageType::Identify,
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidField {
                field: "context",
                expected: "an object"
            }
        );

        assert!(validate(
            &json!({"userId": "u1", "event": "e", "properties": [1]}),
            MessageType::Track
        )
        .is_err());
    }

    #[test]
    fn test_timestamp_format() {
        assert!(validate(
            &json!({"userId": "u1", "timestamp": "2024-03-01T10:00:00.000Z"}),
            MessageType::Identify
        )
        .is_ok());
        assert!(validate(
            &json!({"userId": "u1", "timestamp": "yesterday"}),
            MessageType::Identify
        )
        .is_err());
        assert!(validate(
            &json!({"userId": "u1", "originalTimestamp": 1700000000}),
            MessageType::Identify
        )
        .is_err());
    }

    #[test]
    #[traced_test]
    fn test_oversized_message_is_only_a_warning() {
        let blob = "x".repeat(MAX_MESSAGE_BYTES + 1);
        let message = json!({"userId": "u1", "event": "big", "properties": {"blob": blob}});

        assert!(validate(&message, MessageType::Track).is_ok());
        assert!(logs_contain("Your message must be < 32kb"));
    }
}
