//! Request and option types for the request queue

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::queue::circuit_breaker::CircuitState;
use crate::queue::config::{DEFAULT_MAX_RETRIES, DEFAULT_REQUEST_TIMEOUT};

/// Scheduling priority for a queued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Dispatched ahead of everything else.
    High,
    /// Default tier.
    Normal,
    /// Dispatched last; evictable from the offline buffer.
    Low,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// Opaque request description handed to the transport.
///
/// The queue never interprets the payload; it only schedules it. Serializable
/// so offline-buffered requests could outlive the process if a host chose to
/// persist them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiRequest {
    /// Target URL.
    pub url: String,
    /// HTTP verb (e.g., "GET").
    pub method: String,
    /// Request headers as name/value pairs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl ApiRequest {
    /// Create a GET request for a URL.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Per-request scheduling options for [`crate::queue::RequestQueue::enqueue`].
#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    /// Scheduling priority.
    pub priority: Priority,
    /// Maximum retry attempts before terminal failure.
    pub max_retries: u32,
    /// Budget for both queue wait and the execution timeout race.
    pub timeout: Duration,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Normal,
            max_retries: DEFAULT_MAX_RETRIES,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl EnqueueOptions {
    /// Options at a given priority with default retry and timeout budgets.
    pub fn priority(priority: Priority) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }
}

/// Read-only snapshot of queue state, safe to poll for observability.
#[derive(Debug, Clone)]
pub struct QueueStatus {
    /// Requests waiting for dispatch.
    pub queue_len: usize,
    /// In-flight, unresolved requests.
    pub active_requests: usize,
    /// Circuit breaker state.
    pub circuit_state: CircuitState,
    /// Rate-limit tokens currently available.
    pub available_tokens: f64,
    /// Whether the drain loop is paused.
    pub paused: bool,
    /// Whether the queue believes it is online.
    pub online: bool,
    /// Requests buffered while offline.
    pub offline_buffered: usize,
}
