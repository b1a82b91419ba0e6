//! Request queue orchestration
//!
//! Coordinates priority ordering, bounded concurrency, rate limiting, circuit
//! breaking, offline buffering, and retry with backoff around a generic
//! transport. All shared state lives behind one async mutex; the drain loop
//! runs as at most one task at a time, guarded by a `draining` flag, so
//! limiter and breaker mutation is always serialized.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{oneshot, Mutex};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::queue::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::queue::config::{
    calculate_backoff, DEFAULT_MAX_CONCURRENT, DEFAULT_OFFLINE_CAPACITY,
};
use crate::queue::offline::OfflineQueue;
use crate::queue::rate_limit::RateLimiter;
use crate::queue::request::{ApiRequest, EnqueueOptions, Priority, QueueStatus};
use crate::queue::RequestError;
use crate::transport::{ApiResponse, Transport};

/// Fallback delay for a throttling response that carried no retry-after hint.
const DEFAULT_THROTTLE_DELAY: Duration = Duration::from_secs(1);

/// Floor for breaker/limiter waits so the drain loop never spins.
const MIN_LOOP_WAIT: Duration = Duration::from_millis(10);

/// Request queue configuration.
#[derive(Debug, Clone)]
pub struct RequestQueueConfig {
    /// Maximum in-flight, unresolved requests.
    pub max_concurrent: usize,
    /// Rate-limit bucket capacity (requests per window).
    pub max_tokens: u32,
    /// Rate-limit refill window.
    pub window: Duration,
    /// Circuit breaker thresholds and timeouts.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Offline buffer capacity.
    pub offline_capacity: usize,
}

impl Default for RequestQueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_tokens: 60,
            window: Duration::from_secs(60),
            circuit_breaker: CircuitBreakerConfig::default(),
            offline_capacity: DEFAULT_OFFLINE_CAPACITY,
        }
    }
}

/// How a settled request reports back.
///
/// Requests replayed from the offline buffer have no caller awaiting them;
/// their outcome is only logged.
enum Responder {
    Caller(oneshot::Sender<Result<ApiResponse, RequestError>>),
    Detached,
}

impl Responder {
    fn settle(self, result: Result<ApiResponse, RequestError>) {
        match self {
            Responder::Caller(tx) => {
                // A dropped receiver means the caller gave up; nothing to do.
                let _ = tx.send(result);
            }
            Responder::Detached => match result {
                Ok(response) => {
                    debug!(status = response.status, "Replayed offline request completed")
                }
                Err(e) => warn!(error = %e, "Replayed offline request failed"),
            },
        }
    }
}

/// A request owned by the queue from enqueue to resolution.
struct PendingRequest {
    request: ApiRequest,
    priority: Priority,
    retry_count: u32,
    max_retries: u32,
    enqueued_at: Instant,
    timeout: Duration,
    responder: Responder,
}

/// Mutable queue state, serialized behind one mutex.
struct QueueState {
    pending: VecDeque<PendingRequest>,
    active: usize,
    draining: bool,
    paused: bool,
    online: bool,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    offline: OfflineQueue,
}

impl QueueState {
    /// Insertion policy: high before the first non-high entry, normal before
    /// the first low, low at the tail. Strict priority order without a full
    /// re-sort; FIFO within each tier.
    fn insert_by_priority(&mut self, pending: PendingRequest) {
        let position = match pending.priority {
            Priority::High => self.pending.iter().position(|p| p.priority != Priority::High),
            Priority::Normal => self.pending.iter().position(|p| p.priority == Priority::Low),
            Priority::Low => None,
        };
        match position {
            Some(idx) => self.pending.insert(idx, pending),
            None => self.pending.push_back(pending),
        }
    }
}

struct Inner<T: Transport> {
    state: Mutex<QueueState>,
    transport: T,
    max_concurrent: usize,
}

/// Priority-aware request queue with rate limiting, circuit breaking,
/// offline buffering, and retry.
///
/// Cheap to clone; all clones share the same queue.
pub struct RequestQueue<T: Transport> {
    inner: Arc<Inner<T>>,
}

impl<T: Transport> Clone for RequestQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> RequestQueue<T> {
    /// Create a queue over a transport.
    pub fn new(transport: T, config: RequestQueueConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    active: 0,
                    draining: false,
                    paused: false,
                    online: true,
                    limiter: RateLimiter::new(config.max_tokens, config.window),
                    breaker: CircuitBreaker::new(config.circuit_breaker),
                    offline: OfflineQueue::new(config.offline_capacity),
                }),
                transport,
                max_concurrent: config.max_concurrent.max(1),
            }),
        }
    }

    /// Enqueue a request and await its terminal outcome.
    ///
    /// Resolves exactly once: with the response on success, or with a
    /// [`RequestError`] on exhausted retries, queue-wait expiry, offline
    /// rejection, or cancellation.
    pub async fn enqueue(
        &self,
        request: ApiRequest,
        options: EnqueueOptions,
    ) -> Result<ApiResponse, RequestError> {
        let (tx, rx) = oneshot::channel();
        let pending = PendingRequest {
            request,
            priority: options.priority,
            retry_count: 0,
            max_retries: options.max_retries,
            enqueued_at: Instant::now(),
            timeout: options.timeout,
            responder: Responder::Caller(tx),
        };

        {
            let mut state = self.inner.state.lock().await;
            state.insert_by_priority(pending);
        }
        Self::trigger_drain(&self.inner).await;

        // A dropped sender can only happen if the queue itself is dropped.
        rx.await.unwrap_or(Err(RequestError::Cancelled))
    }

    /// Halt dispatch without discarding queued work.
    pub async fn pause(&self) {
        let mut state = self.inner.state.lock().await;
        state.paused = true;
        debug!("Request queue paused");
    }

    /// Restart dispatch after [`RequestQueue::pause`].
    pub async fn resume(&self) {
        {
            let mut state = self.inner.state.lock().await;
            state.paused = false;
        }
        debug!("Request queue resumed");
        Self::trigger_drain(&self.inner).await;
    }

    /// Update connectivity. A false→true transition replays the offline
    /// buffer through one drain pass.
    pub async fn set_online(&self, online: bool) {
        let replayed = {
            let mut state = self.inner.state.lock().await;
            let was_online = state.online;
            state.online = online;
            if online && !was_online {
                let buffered = state.offline.drain();
                let count = buffered.len();
                for entry in buffered {
                    state.insert_by_priority(PendingRequest {
                        request: entry.request,
                        priority: entry.priority,
                        retry_count: 0,
                        max_retries: crate::queue::config::DEFAULT_MAX_RETRIES,
                        enqueued_at: Instant::now(),
                        timeout: crate::queue::config::DEFAULT_REQUEST_TIMEOUT,
                        responder: Responder::Detached,
                    });
                }
                count
            } else {
                0
            }
        };
        if replayed > 0 {
            debug!(count = replayed, "Re-enqueued offline-buffered requests");
        }
        if online {
            Self::trigger_drain(&self.inner).await;
        }
    }

    /// Reject every queued and buffered request immediately. Used on
    /// shutdown; in-flight requests run to completion or timeout.
    pub async fn clear(&self) {
        let mut state = self.inner.state.lock().await;
        let dropped_pending = state.pending.len();
        while let Some(p) = state.pending.pop_front() {
            p.responder.settle(Err(RequestError::Cancelled));
        }
        let dropped_buffered = state.offline.drain().len();
        if dropped_pending > 0 || dropped_buffered > 0 {
            debug!(
                pending = dropped_pending,
                buffered = dropped_buffered,
                "Cleared request queue"
            );
        }
    }

    /// Manual operator override: force the circuit breaker closed.
    pub async fn reset_circuit_breaker(&self) {
        let mut state = self.inner.state.lock().await;
        state.breaker.reset();
    }

    /// Read-only snapshot for observability.
    pub async fn status(&self) -> QueueStatus {
        let mut state = self.inner.state.lock().await;
        QueueStatus {
            queue_len: state.pending.len(),
            active_requests: state.active,
            circuit_state: state.breaker.state(),
            available_tokens: state.limiter.available(),
            paused: state.paused,
            online: state.online,
            offline_buffered: state.offline.len(),
        }
    }

    /// Start a drain pass unless one is already running.
    ///
    /// Boxed rather than an `async fn` to break the `execute_one` ->
    /// `trigger_drain` -> `drain_loop` opaque-type cycle for the `Send` check.
    fn trigger_drain(inner: &Arc<Inner<T>>) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            {
                let mut state = inner.state.lock().await;
                if state.draining {
                    return;
                }
                state.draining = true;
            }
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                Self::drain_loop(inner).await;
            });
        })
    }

    /// The single active drain pass.
    async fn drain_loop(inner: Arc<Inner<T>>) {
        loop {
            let mut state = inner.state.lock().await;

            if state.paused || state.pending.is_empty() || state.active >= inner.max_concurrent {
                state.draining = false;
                return;
            }

            // Offline: park every queued payload and reject its caller.
            if !state.online {
                while let Some(p) = state.pending.pop_front() {
                    let accepted = state.offline.add(p.request.clone(), p.priority);
                    let error = if accepted {
                        crate::metrics::record_offline_buffered();
                        RequestError::Offline
                    } else {
                        RequestError::BufferFull
                    };
                    p.responder.settle(Err(error));
                }
                debug!(
                    buffered = state.offline.len(),
                    "Offline: moved queued requests to the offline buffer"
                );
                state.draining = false;
                return;
            }

            // Circuit open: wait it out, never fail the callers.
            if !state.breaker.allow_request() {
                let delay = state.breaker.retry_delay().max(MIN_LOOP_WAIT);
                drop(state);
                debug!(delay_ms = delay.as_millis() as u64, "Circuit open; drain loop waiting");
                sleep(delay).await;
                continue;
            }

            // No token: wait for the refill.
            let token_wait = state.limiter.wait_time();
            if token_wait > Duration::ZERO {
                drop(state);
                sleep(token_wait.max(MIN_LOOP_WAIT)).await;
                continue;
            }

            let mut pending = match state.pending.pop_front() {
                Some(p) => p,
                None => {
                    state.draining = false;
                    return;
                }
            };

            // Expired in queue: fail without consuming a token or a
            // concurrency slot.
            let waited = pending.enqueued_at.elapsed();
            if waited > pending.timeout {
                pending.responder.settle(Err(RequestError::QueueTimeout {
                    waited_ms: waited.as_millis() as u64,
                }));
                continue;
            }

            let _ = state.limiter.try_acquire();
            state.active += 1;
            drop(state);

            let inner_exec = Arc::clone(&inner);
            tokio::spawn(async move {
                Self::execute_one(inner_exec, pending).await;
            });
        }
    }

    /// Execute one request under the timeout race and settle or requeue it.
    async fn execute_one(inner: Arc<Inner<T>>, pending: PendingRequest) {
        let outcome = tokio::time::timeout(
            pending.timeout,
            inner.transport.execute(&pending.request, pending.timeout),
        )
        .await;

        let mut state = inner.state.lock().await;
        state.active -= 1;

        match outcome {
            Ok(Ok(response)) => {
                state
                    .limiter
                    .update_from_headers(response.rate_limit.remaining, response.rate_limit.reset);
                state.breaker.record_success();
                crate::metrics::update_circuit_state(state.breaker.state());
                crate::metrics::update_available_tokens(state.limiter.available());
                drop(state);
                crate::metrics::record_request_complete(response.status);
                pending.responder.settle(Ok(response));
            }
            Ok(Err(error)) if error.is_throttled() => {
                // Throttling is expected, not a fault: no breaker failure,
                // requeue at the absolute front after the server's delay.
                drop(state);
                crate::metrics::record_request_complete(429);
                let delay = error.retry_after.unwrap_or(DEFAULT_THROTTLE_DELAY);
                if pending.retry_count < pending.max_retries {
                    warn!(
                        url = %pending.request.url,
                        delay_ms = delay.as_millis() as u64,
                        retry = pending.retry_count + 1,
                        "Throttled by upstream; requeueing at front"
                    );
                    Self::schedule_requeue(inner.clone(), pending, delay, true).await;
                } else {
                    pending.responder.settle(Err(RequestError::Http {
                        status: 429,
                        message: error.message,
                    }));
                }
            }
            Ok(Err(error)) => {
                state.breaker.record_failure();
                crate::metrics::update_circuit_state(state.breaker.state());
                drop(state);
                if let Some(status) = error.status {
                    crate::metrics::record_request_complete(status);
                }
                if error.is_retryable() && pending.retry_count < pending.max_retries {
                    let delay = calculate_backoff(pending.retry_count + 1);
                    warn!(
                        url = %pending.request.url,
                        error = %error,
                        backoff_ms = delay.as_millis() as u64,
                        retry = pending.retry_count + 1,
                        max_retries = pending.max_retries,
                        "Request failed; retrying after backoff"
                    );
                    Self::schedule_requeue(inner.clone(), pending, delay, false).await;
                } else {
                    let terminal = match error.status {
                        Some(status) => RequestError::Http {
                            status,
                            message: error.message,
                        },
                        None => RequestError::Network(error.message),
                    };
                    pending.responder.settle(Err(terminal));
                }
            }
            Err(_elapsed) => {
                // Timeout race lost: counted as a breaker failure, retryable
                // within the remaining attempt budget.
                state.breaker.record_failure();
                crate::metrics::update_circuit_state(state.breaker.state());
                drop(state);
                if pending.retry_count < pending.max_retries {
                    let delay = calculate_backoff(pending.retry_count + 1);
                    warn!(
                        url = %pending.request.url,
                        timeout_ms = pending.timeout.as_millis() as u64,
                        retry = pending.retry_count + 1,
                        "Request timed out; retrying after backoff"
                    );
                    Self::schedule_requeue(inner.clone(), pending, delay, false).await;
                } else {
                    let timeout = pending.timeout;
                    pending.responder.settle(Err(RequestError::Timeout(timeout)));
                }
            }
        }

        Self::trigger_drain(&inner).await;
    }

    /// Reinsert a request after a delay, consuming one retry attempt.
    ///
    /// Throttled requeues go to the absolute front regardless of tier; backoff
    /// requeues re-enter through the normal priority insertion policy. The
    /// queue-wait clock restarts so the backoff itself cannot expire the
    /// request.
    async fn schedule_requeue(
        inner: Arc<Inner<T>>,
        mut pending: PendingRequest,
        delay: Duration,
        at_front: bool,
    ) {
        pending.retry_count += 1;
        crate::metrics::record_retry_backoff(delay, pending.retry_count);
        tokio::spawn(async move {
            sleep(delay).await;
            {
                let mut state = inner.state.lock().await;
                pending.enqueued_at = Instant::now();
                if at_front {
                    state.pending.push_front(pending);
                } else {
                    state.insert_by_priority(pending);
                }
            }
            Self::trigger_drain(&inner).await;
        });
    }
}
