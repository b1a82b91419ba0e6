//! Integration tests for the execution timeout race and queue-wait expiry

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulk_importer::queue::{
    ApiRequest, CircuitBreakerConfig, CircuitState, EnqueueOptions, RequestError, RequestQueue,
    RequestQueueConfig,
};
use bulk_importer::transport::{ApiResponse, RateLimitHints, Transport, TransportError};

/// Transport that takes longer than any timeout the tests grant.
struct SlowTransport {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for SlowTransport {
    async fn execute(
        &self,
        _request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok(ApiResponse {
            status: 200,
            rate_limit: RateLimitHints::default(),
            body: String::new(),
        })
    }
}

#[tokio::test]
async fn test_execution_timeout_fails_caller_and_trips_breaker() {
    let calls = Arc::new(AtomicUsize::new(0));
    let queue = RequestQueue::new(
        SlowTransport {
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

    let result = queue
        .enqueue(
            ApiRequest::get("https://x/slow"),
            EnqueueOptions {
                timeout: Duration::from_millis(40),
                max_retries: 0,
                ..EnqueueOptions::default()
            },
        )
        .await;

    assert!(matches!(result, Err(RequestError::Timeout(d)) if d == Duration::from_millis(40)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    // Unlike throttling, a lost timeout race counts against the breaker.
    assert_eq!(queue.status().await.circuit_state, CircuitState::Open);
}

#[tokio::test]
async fn test_request_expiring_in_queue_never_reaches_transport() {
    let calls = Arc::new(AtomicUsize::new(0));
    let queue = RequestQueue::new(
        SlowTransport {
            calls: Arc::clone(&calls),
        },
        RequestQueueConfig::default(),
    );

    queue.pause().await;
    let q = queue.clone();
    let handle = tokio::spawn(async move {
        q.enqueue(
            ApiRequest::get("https://x/stale"),
            EnqueueOptions {
                timeout: Duration::from_millis(30),
                ..EnqueueOptions::default()
            },
        )
        .await
    });

    // Let the request out-wait its own deadline before dispatch resumes.
    tokio::time::sleep(Duration::from_millis(80)).await;
    queue.resume().await;

    let result = handle.await.unwrap();
    match result {
        Err(RequestError::QueueTimeout { waited_ms }) => assert!(waited_ms >= 30),
        other => panic!("expected queue-wait expiry, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(queue.status().await.circuit_state, CircuitState::Closed);
}
