//! Resilient request execution engine
//!
//! The single entry point is [`RequestQueue::enqueue`]: hand it an opaque
//! request and it resolves exactly once, with a response or a terminal error.
//! Internally the queue coordinates four primitives around a generic
//! [`crate::transport::Transport`]:
//!
//! 1. **Priority ordering**: [`request::Priority`] tiers with FIFO order
//!    inside each tier
//! 2. **Admission control**: token-bucket [`rate_limit::RateLimiter`]
//!    reconciled against server quota headers
//! 3. **Fault isolation**: [`circuit_breaker::CircuitBreaker`] that pauses
//!    dispatch (never fails callers) while the upstream recovers
//! 4. **Connectivity loss**: [`offline::OfflineQueue`] buffering work while
//!    disconnected, replayed on reconnect
//!
//! plus bounded concurrency and jittered exponential-backoff retry
//! ([`config::calculate_backoff`]).
//!
//! # Error handling
//!
//! Every enqueued request resolves through its own `Result`; the queue never
//! panics or propagates past that boundary. Throttling (429) is expected and
//! retried transparently without tripping the breaker.

pub mod circuit_breaker;
pub mod config;
pub mod executor;
pub mod offline;
pub mod rate_limit;
pub mod request;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use executor::{RequestQueue, RequestQueueConfig};
pub use offline::OfflineQueue;
pub use rate_limit::RateLimiter;
pub use request::{ApiRequest, EnqueueOptions, Priority, QueueStatus};

use std::time::Duration;

/// Terminal outcome of an enqueued request.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RequestError {
    /// The client is offline; the request was moved to the offline buffer.
    #[error("request rejected: client is offline")]
    Offline,

    /// The client is offline and the offline buffer could not accept the
    /// request.
    #[error("request rejected: offline buffer is full")]
    BufferFull,

    /// The request waited in the queue longer than its timeout.
    #[error("request expired in queue after {waited_ms}ms")]
    QueueTimeout {
        /// Milliseconds the request spent queued.
        waited_ms: u64,
    },

    /// The execution timeout race was lost and the retry budget is exhausted.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A non-retryable HTTP failure, or retries exhausted.
    #[error("HTTP error (status {status}): {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Upstream error description.
        message: String,
    },

    /// A network-level failure with retries exhausted.
    #[error("network error: {0}")]
    Network(String),

    /// The queue was cleared or shut down before the request ran.
    #[error("request cancelled")]
    Cancelled,
}
