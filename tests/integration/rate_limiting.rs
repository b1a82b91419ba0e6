//! Integration tests for rate limiting functionality

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulk_importer::queue::{
    ApiRequest, CircuitBreakerConfig, CircuitState, EnqueueOptions, RateLimiter, RequestQueue,
    RequestQueueConfig,
};
use bulk_importer::transport::{ApiResponse, RateLimitHints, Transport, TransportError};

#[test]
fn test_limiter_starts_full_and_drains() {
    let mut limiter = RateLimiter::new(3, Duration::from_secs(60));
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(limiter.try_acquire());
    assert!(!limiter.try_acquire());
    assert!(limiter.wait_time() > Duration::ZERO);
}

#[test]
fn test_limiter_continuous_refill() {
    let mut limiter = RateLimiter::new(1000, Duration::from_millis(100));
    while limiter.try_acquire() {}
    std::thread::sleep(Duration::from_millis(30));
    // ~30% of the window elapsed, so roughly 300 tokens are back.
    assert!(limiter.available() > 100.0);
    assert!(limiter.try_acquire());
}

#[test]
fn test_limiter_header_reconciliation_clamps_down_only() {
    let mut limiter = RateLimiter::new(60, Duration::from_secs(60));
    limiter.update_from_headers(Some(5.0), None);
    assert!(limiter.available() <= 5.0);

    // A higher server count never inflates the local bucket.
    limiter.update_from_headers(Some(500.0), None);
    assert!(limiter.available() <= 60.0);
}

/// Transport that serves a 200 whose headers claim the bucket is empty.
struct ExhaustedHeaderTransport {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ExhaustedHeaderTransport {
    async fn execute(
        &self,
        _request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ApiResponse {
            status: 200,
            rate_limit: RateLimitHints {
                remaining: Some(0.0),
                reset: Some(Duration::from_millis(100)),
                ..Default::default()
            },
            body: String::new(),
        })
    }
}

#[tokio::test]
async fn test_queue_honors_server_exhaustion_headers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let queue = RequestQueue::new(
        ExhaustedHeaderTransport {
            calls: Arc::clone(&calls),
        },
        RequestQueueConfig {
            max_tokens: 60,
            window: Duration::from_millis(500),
            ..RequestQueueConfig::default()
        },
    );

    let start = std::time::Instant::now();
    queue
        .enqueue(ApiRequest::get("https://x/1"), EnqueueOptions::default())
        .await
        .unwrap();
    // Headers drained the bucket, so the second request waits for a refill.
    queue
        .enqueue(ApiRequest::get("https://x/2"), EnqueueOptions::default())
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(5));
}

/// Transport that throttles the first call and succeeds afterwards.
struct ThrottleOnceTransport {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for ThrottleOnceTransport {
    async fn execute(
        &self,
        _request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            let mut error = TransportError::http(429, "too many requests");
            error.retry_after = Some(Duration::from_millis(30));
            Err(error)
        } else {
            Ok(ApiResponse {
                status: 200,
                rate_limit: RateLimitHints::default(),
                body: String::new(),
            })
        }
    }
}

#[tokio::test]
async fn test_throttled_request_retries_after_server_delay() {
    let calls = Arc::new(AtomicUsize::new(0));
    // With a threshold of 1, any failure counted against the breaker would
    // open the circuit. A 429 must not count.
    let queue = RequestQueue::new(
        ThrottleOnceTransport {
            calls: Arc::clone(&calls),
        },
        RequestQueueConfig {
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 1,
                ..CircuitBreakerConfig::default()
            },
            ..RequestQueueConfig::default()
        },
    );

    let start = std::time::Instant::now();
    let response = queue
        .enqueue(ApiRequest::get("https://x/1"), EnqueueOptions::default())
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(queue.status().await.circuit_state, CircuitState::Closed);
}
