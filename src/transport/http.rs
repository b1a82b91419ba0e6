//! reqwest-backed transport
//!
//! Issues one HTTP request per call and parses the rate-limit headers the
//! queue reconciles its token bucket against.

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, warn};

use crate::queue::request::ApiRequest;
use crate::transport::{ApiResponse, RateLimitHints, Transport, TransportError};

/// Header carrying the remaining request quota.
const HEADER_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Header carrying seconds until the quota window resets.
const HEADER_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Header carrying a server-specified retry delay in seconds.
const HEADER_RETRY_AFTER: &str = "retry-after";

/// HTTP transport over a shared reqwest client.
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a transport with a dedicated client.
    pub fn new() -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Create a transport over an existing client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Parse a numeric header value, logging when it is present but invalid.
    fn parse_numeric_header(headers: &HeaderMap, name: &str) -> Option<f64> {
        let raw = headers.get(name)?.to_str().ok()?;
        match raw.parse::<f64>() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(header = name, value = raw, error = %e, "Failed to parse rate-limit header");
                None
            }
        }
    }

    /// Extract rate-limit hints from response headers.
    fn parse_rate_limit_hints(headers: &HeaderMap, content_length: Option<u64>) -> RateLimitHints {
        let remaining = Self::parse_numeric_header(headers, HEADER_RATELIMIT_REMAINING);
        let reset = Self::parse_numeric_header(headers, HEADER_RATELIMIT_RESET)
            .filter(|s| *s >= 0.0)
            .map(Duration::from_secs_f64);
        let retry_after = Self::parse_numeric_header(headers, HEADER_RETRY_AFTER)
            .filter(|s| *s >= 0.0)
            .map(Duration::from_secs_f64);

        RateLimitHints {
            remaining,
            reset,
            retry_after,
            content_length,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::network(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &request.url).timeout(timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        debug!(url = %request.url, method = %request.method, "Issuing HTTP request");

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;

        let status = response.status();
        let content_length = response.content_length();
        let hints = Self::parse_rate_limit_hints(response.headers(), content_length);

        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError {
                status: Some(status.as_u16()),
                retry_after: hints.retry_after,
                message: if body.is_empty() {
                    format!("HTTP {status}")
                } else {
                    format!("HTTP {status}: {body}")
                },
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("failed to read response body: {e}")))?;

        Ok(ApiResponse {
            status: status.as_u16(),
            rate_limit: hints,
            body,
        })
    }
}
