//! Outbound call primitive
//!
//! The request queue is generic over how a single HTTP call is issued. The
//! [`Transport`] trait is the small capability boundary: given an opaque
//! request description and a timeout, produce a response with status, body,
//! and the rate-limit hints the queue feeds back into its limiter.

use async_trait::async_trait;
use std::time::Duration;

use crate::queue::request::ApiRequest;

pub mod http;

pub use http::HttpTransport;

/// Rate-limit information extracted from response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitHints {
    /// Remaining quota reported by the server.
    pub remaining: Option<f64>,
    /// Time until the server's quota window resets.
    pub reset: Option<Duration>,
    /// Server-specified delay before retrying (throttling responses).
    pub retry_after: Option<Duration>,
    /// Response content length, when reported.
    pub content_length: Option<u64>,
}

/// A successful response from the upstream service.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Rate-limit hints parsed from headers.
    pub rate_limit: RateLimitHints,
    /// Response body.
    pub body: String,
}

/// A classified transport failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("transport error{}: {message}", status.map(|s| format!(" (status {s})")).unwrap_or_default())]
pub struct TransportError {
    /// Status code, when the failure carried one. Absent for pure network
    /// errors (DNS, connect, reset).
    pub status: Option<u16>,
    /// Server-specified retry delay, when present on a throttling response.
    pub retry_after: Option<Duration>,
    /// Human-readable description.
    pub message: String,
}

impl TransportError {
    /// A failure with no status code (network-level).
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            status: None,
            retry_after: None,
            message: message.into(),
        }
    }

    /// A failure carrying an HTTP status.
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            retry_after: None,
            message: message.into(),
        }
    }

    /// Whether this is a throttling response ("too many requests").
    pub fn is_throttled(&self) -> bool {
        self.status == Some(429)
    }

    /// Whether the failure is worth retrying: no status at all (network
    /// error), any 5xx, request timeout (408), or throttling (429).
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(status) => (500..600).contains(&status) || status == 408 || status == 429,
        }
    }
}

/// Capability to issue one outbound call under a timeout.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Execute the request, resolving within `timeout`.
    ///
    /// Implementations should classify failures with a status code whenever
    /// one is available so the queue can decide retryability.
    async fn execute(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, TransportError>;
}
