//! Integration tests for priority ordering in queue dispatch

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bulk_importer::queue::{
    ApiRequest, EnqueueOptions, Priority, RequestQueue, RequestQueueConfig,
};
use bulk_importer::transport::{ApiResponse, RateLimitHints, Transport, TransportError};
use tokio::sync::Mutex;

/// Transport that records the order in which URLs are executed.
struct OrderRecordingTransport {
    order: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Transport for OrderRecordingTransport {
    async fn execute(
        &self,
        request: &ApiRequest,
        _timeout: Duration,
    ) -> Result<ApiResponse, TransportError> {
        self.order.lock().await.push(request.url.clone());
        Ok(ApiResponse {
            status: 200,
            rate_limit: RateLimitHints::default(),
            body: String::new(),
        })
    }
}

async fn wait_for_queue_len<T: Transport>(queue: &RequestQueue<T>, len: usize) {
    for _ in 0..200 {
        if queue.status().await.queue_len >= len {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("queue never reached length {len}");
}

#[tokio::test]
async fn test_high_priority_dispatches_before_normal_and_low() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let queue = RequestQueue::new(
        OrderRecordingTransport {
            order: Arc::clone(&order),
        },
        RequestQueueConfig {
            max_concurrent: 1,
            ..RequestQueueConfig::default()
        },
    );

    // Fill the queue while dispatch is halted so ordering is observable.
    queue.pause().await;

    let mut handles = Vec::new();
    for (url, priority) in [
        ("https://x/low", Priority::Low),
        ("https://x/normal", Priority::Normal),
        ("https://x/high-1", Priority::High),
        ("https://x/high-2", Priority::High),
    ] {
        let q = queue.clone();
        handles.push(tokio::spawn(async move {
            q.enqueue(ApiRequest::get(url), EnqueueOptions::priority(priority))
                .await
        }));
        wait_for_queue_len(&queue, handles.len()).await;
    }

    queue.resume().await;
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let order = order.lock().await;
    assert_eq!(
        *order,
        vec![
            "https://x/high-1".to_string(),
            "https://x/high-2".to_string(),
            "https://x/normal".to_string(),
            "https://x/low".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_fifo_within_same_priority_tier() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let queue = RequestQueue::new(
        OrderRecordingTransport {
            order: Arc::clone(&order),
        },
        RequestQueueConfig {
            max_concurrent: 1,
            ..RequestQueueConfig::default()
        },
    );

    queue.pause().await;

    let mut handles = Vec::new();
    for i in 0..4 {
        let q = queue.clone();
        handles.push(tokio::spawn(async move {
            q.enqueue(
                ApiRequest::get(format!("https://x/n{i}")),
                EnqueueOptions::default(),
            )
            .await
        }));
        wait_for_queue_len(&queue, handles.len()).await;
    }

    queue.resume().await;
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let order = order.lock().await;
    let expected: Vec<String> = (0..4).map(|i| format!("https://x/n{i}")).collect();
    assert_eq!(*order, expected);
}
