//! Persisted job envelope.

use crate::error::{QueueError, QueueResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Current envelope format. Payloads with any other version are rejected.
pub const JOB_FORMAT_VERSION: u32 = 1;

/// A unit of retry state as written to the store.
///
/// `data` is the caller's structured payload. Nothing executable is ever
/// stored: the envelope is plain JSON and decoding rejects unknown fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobRecord<T> {
    pub version: u32,
    /// Stable identifier, carried over when a job is requeued.
    pub id: String,
    /// Human readable tag used in lifecycle logs.
    pub description: String,
    /// Delivery attempts already made. Never decreases except on startup recovery.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    pub data: T,
}

impl<T> JobRecord<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a fresh record with `attempts = 0`.
    pub fn new(id: impl Into<String>, description: impl Into<String>, data: T) -> Self {
        Self {
            version: JOB_FORMAT_VERSION,
            id: id.into(),
            description: description.into(),
            attempts: 0,
            enqueued_at: Utc::now(),
            data,
        }
    }

    /// The same job with its attempt counter replaced.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self.enqueued_at = Utc::now();
        self
    }

    pub fn encode(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> QueueResult<Self> {
        let record: Self = serde_json::from_str(raw)?;
        if record.version != JOB_FORMAT_VERSION {
            return Err(QueueError::Codec(format!(
                "unsupported job format version {} (expected {})",
                record.version, JOB_FORMAT_VERSION
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        url: String,
    }

    fn record() -> JobRecord<Payload> {
        JobRecord::new(
            "job-1",
            "job-1 description",
            Payload {
                url: "https://example.com".into(),
            },
        )
    }

    #[test]
    fn test_new_record_starts_at_zero_attempts() {
        let r = record();
        assert_eq!(r.attempts, 0);
        assert_eq!(r.version, JOB_FORMAT_VERSION);
    }

    #[test]
    fn test_with_attempts_keeps_identity() {
        let r = record().with_attempts(4);
        assert_eq!(r.attempts, 4);
        assert_eq!(r.id, "job-1");
        assert_eq!(r.data.url, "https://example.com");
    }

    #[test]
    fn test_encoded_shape() {
        let raw = record().encode().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["attempts"], 0);
        assert_eq!(value["data"], json!({"url": "https://example.com"}));
        assert!(value.get("enqueuedAt").is_some());

        let decoded = JobRecord::<Payload>::decode(&raw).unwrap();
        assert_eq!(decoded.id, "job-1");
        assert_eq!(decoded.description, "job-1 description");
    }

    #[test]
    fn test_decode_rejects_unknown_fields() {
        let mut value = serde_json::to_value(record()).unwrap();
        value["callbacks"] = json!("function () { process.exit(1) }");
        let err = JobRecord::<Payload>::decode(&value.to_string()).unwrap_err();
        assert!(matches!(err, QueueError::Json(_)));
    }

    #[test]
    fn test_decode_rejects_other_versions() {
        let mut value = serde_json::to_value(record()).unwrap();
        value["version"] = json!(2);
        let err = JobRecord::<Payload>::decode(&value.to_string()).unwrap_err();
        assert!(matches!(err, QueueError::Codec(_)));
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(JobRecord::<Payload>::decode("({ eval: true })").is_err());
    }
}
