//! Message normalization.

use crate::message::{Event, LibraryInfo, MessageType};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Hex characters of the content digest kept in identifiers.
const DIGEST_PREFIX_LEN: usize = 32;

/// Stamps library defaults onto events before they are buffered.
#[derive(Debug, Clone)]
pub struct Normalizer {
    library: LibraryInfo,
    metadata: Map<String, Value>,
}

impl Normalizer {
    pub fn new(library: LibraryInfo) -> Self {
        let mut metadata = Map::new();
        metadata.insert("runtime".into(), Value::String("rust".into()));
        metadata.insert("os".into(), Value::String(std::env::consts::OS.into()));
        Self { library, metadata }
    }

    pub fn library(&self) -> &LibraryInfo {
        &self.library
    }

    /// Normalize `event` as a message of type `message_type`.
    ///
    /// Caller-supplied `context` and `_metadata` keys win over the library
    /// defaults. Existing `originalTimestamp` and `messageId` values are kept.
    pub fn normalize(&self, message_type: MessageType, mut event: Event) -> Event {
        if message_type == MessageType::Identify {
            mirror_traits(&mut event);
        }

        event.insert("type".into(), Value::String(message_type.as_str().into()));

        let mut library = Map::new();
        library.insert("name".into(), Value::String(self.library.name.clone()));
        library.insert("version".into(), Value::String(self.library.version.clone()));
        let mut context_defaults = Map::new();
        context_defaults.insert("library".into(), Value::Object(library));
        merge_under(&mut event, "context", context_defaults);
        merge_under(&mut event, "_metadata", self.metadata.clone());

        if is_missing(event.get("originalTimestamp")) {
            event.insert(
                "originalTimestamp".into(),
                Value::String(now_timestamp()),
            );
        }

        if is_missing(event.get("messageId")) {
            let message_id = format!(
                "{}-{}-{}",
                self.library.name,
                content_digest(&event),
                Uuid::new_v4()
            );
            event.insert("messageId".into(), Value::String(message_id));
        }

        // Numeric identifiers were accepted historically; the wire format wants strings.
        for key in ["anonymousId", "userId"] {
            coerce_to_string(&mut event, key);
        }

        event
    }
}

/// SHA-256 of the serialized value, truncated to 32 hex characters.
pub fn content_digest<T: serde::Serialize + ?Sized>(value: &T) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let mut hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex.truncate(DIGEST_PREFIX_LEN);
    hex
}

/// Current time as an ISO-8601 string with millisecond precision.
fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn mirror_traits(event: &mut Event) {
    let Some(traits) = event.get("traits").filter(|t| !t.is_null()).cloned() else {
        return;
    };

    let context = event
        .entry("context")
        .or_insert_with(|| Value::Object(Map::new()));
    if !context.is_object() {
        *context = Value::Object(Map::new());
    }
    if let Value::Object(context) = context {
        context.entry("traits").or_insert(traits);
    }
}

/// Replace `event[key]` with `defaults` overlaid by the caller's own keys.
fn merge_under(event: &mut Event, key: &str, defaults: Map<String, Value>) {
    let mut merged = defaults;
    if let Some(Value::Object(caller)) = event.remove(key) {
        merged.extend(caller);
    }
    event.insert(key.into(), Value::Object(merged));
}

fn coerce_to_string(event: &mut Event, key: &str) {
    if let Some(value) = event.get_mut(key) {
        if !value.is_string() && !value.is_null() {
            *value = Value::String(value.to_string());
        }
    }
}
