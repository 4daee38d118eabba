//! HTTP transport seam.

use crate::dispatcher::DispatchRequest;
use crate::error::{ConfigError, ConfigResult, TransportErrorKind};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Status line of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
}

impl HttpResponse {
    pub fn new(status: u16, status_text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A request that produced no response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportFailure {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportFailure {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Performs one physical send of a dispatch request.
///
/// The write key travels separately so persisted requests never carry it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &DispatchRequest,
        write_key: &str,
    ) -> Result<HttpResponse, TransportFailure>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    http_client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ConfigResult<Self> {
        let http_client = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &DispatchRequest,
        write_key: &str,
    ) -> Result<HttpResponse, TransportFailure> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportFailure::new(TransportErrorKind::Other, e.to_string()))?;

        let mut builder = self
            .http_client
            .request(method, &request.url)
            .basic_auth(write_key, None::<&str>)
            .json(&request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(ms) = request.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        debug!(status = status.as_u16(), url = %request.url, "Batch request answered");

        Ok(HttpResponse::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
        ))
    }
}

fn classify(error: reqwest::Error) -> TransportFailure {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() || error.is_request() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    TransportFailure::new(kind, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_success_range() {
        assert!(HttpResponse::new(200, "OK").is_success());
        assert!(HttpResponse::new(204, "No Content").is_success());
        assert!(!HttpResponse::new(301, "Moved Permanently").is_success());
        assert!(!HttpResponse::new(500, "Internal Server Error").is_success());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connect_failure() {
        let transport = ReqwestTransport::new().unwrap();
        let request = DispatchRequest::for_test("http://127.0.0.1:9/v1/batch");
        let failure = transport.send(&request, "key").await.unwrap_err();
        assert_eq!(failure.kind, TransportErrorKind::Connect);
    }
}
