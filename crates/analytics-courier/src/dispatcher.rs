//! Batch dispatch: request construction and delivery attempts.

use crate::buffer::Batch;
use crate::config::DirectRetryPolicy;
use crate::error::DeliveryError;
use crate::retry;
use crate::transport::Transport;
use analytics_message::{Event, LibraryInfo};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// ISO-8601 UTC with millisecond precision.
pub(crate) fn timestamp_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Wire body of a batch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BatchPayload {
    pub batch: Vec<Event>,
    pub sent_at: String,
}

/// Everything needed to send a batch, minus the credential.
///
/// This is also the payload persisted by the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct DispatchRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: BatchPayload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl DispatchRequest {
    /// Stamp a fresh `sentAt` for the next physical send.
    pub fn refresh_sent_at(&mut self) {
        self.body.sent_at = timestamp_now();
    }

    #[cfg(test)]
    pub(crate) fn for_test(url: &str) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.to_string(),
            headers: BTreeMap::new(),
            body: BatchPayload {
                batch: Vec::new(),
                sent_at: timestamp_now(),
            },
            timeout_ms: None,
        }
    }
}

/// Builds requests and performs delivery attempts through a [`Transport`].
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    write_key: String,
    url: String,
    timeout: Option<Duration>,
    library: LibraryInfo,
    retry: DirectRetryPolicy,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        write_key: impl Into<String>,
        url: impl Into<String>,
        timeout: Option<Duration>,
        library: LibraryInfo,
        retry: DirectRetryPolicy,
    ) -> Self {
        Self {
            transport,
            write_key: write_key.into(),
            url: url.into(),
            timeout,
            library,
            retry,
        }
    }

    pub fn build_request(&self, batch: &Batch) -> DispatchRequest {
        let mut headers = BTreeMap::new();
        if !cfg!(target_family = "wasm") {
            headers.insert("user-agent".to_string(), self.library.user_agent());
        }

        DispatchRequest {
            method: "POST".to_string(),
            url: self.url.clone(),
            headers,
            body: BatchPayload {
                batch: batch.events.clone(),
                sent_at: batch.sent_at.clone(),
            },
            timeout_ms: self
                .timeout
                .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    /// One physical send. Refreshes `sentAt` first.
    pub async fn attempt(&self, request: &mut DispatchRequest) -> Result<(), DeliveryError> {
        request.refresh_sent_at();

        match self.transport.send(request, &self.write_key).await {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => Err(DeliveryError::Rejected {
                status: response.status,
                status_text: response.status_text,
            }),
            Err(failure) => Err(DeliveryError::Transport {
                kind: failure.kind,
                message: failure.message,
            }),
        }
    }

    /// Direct-mode delivery: the first attempt plus up to `max_retries`
    /// retries for retryable failures.
    pub async fn deliver(&self, mut request: DispatchRequest) -> Result<(), DeliveryError> {
        let events = request.body.batch.len();
        let mut retry = 0;

        loop {
            match self.attempt(&mut request).await {
                Ok(()) => {
                    debug!(events, retries = retry, "Batch delivered");
                    return Ok(());
                }
                Err(e) if e.is_retryable() && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = retry::direct_delay(&self.retry, retry);
                    warn!(
                        error = %e,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        "Batch delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    warn!(error = %e, events, retries = retry, "Batch delivery failed");
                    return Err(e);
                }
            }
        }
    }
}
