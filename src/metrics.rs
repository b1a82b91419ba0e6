//! Production observability metrics for the bulk importer
//!
//! Collects request outcomes, 429 throttling, retry behavior, circuit
//! breaker state, and import throughput.
//!
//! ## Architecture
//!
//! - Uses `metrics` crate for low-overhead metric collection
//! - Prometheus exporter for scraping endpoint (:9090/metrics)
//! - Graceful degradation if metrics sink unavailable

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use once_cell::sync::Lazy;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::queue::CircuitState;

/// Global metrics registry initialization flag
static METRICS_INITIALIZED: Lazy<Arc<RwLock<bool>>> = Lazy::new(|| Arc::new(RwLock::new(false)));

/// Initialize metrics system with Prometheus exporter
///
/// Call once at application startup, typically in main(). Idempotent:
/// repeated calls after a successful install are no-ops.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    let mut initialized = METRICS_INITIALIZED.write().await;
    if *initialized {
        debug!("Metrics already initialized, skipping");
        return Ok(());
    }

    info!("Initializing metrics system on {}", addr);

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        "api_requests_total",
        Unit::Count,
        "Total number of API requests completed, by status class"
    );

    describe_counter!(
        "api_429_errors_total",
        Unit::Count,
        "Total number of 429 throttling responses received"
    );

    describe_counter!(
        "api_retries_total",
        Unit::Count,
        "Total number of retry attempts scheduled"
    );

    describe_histogram!(
        "retry_backoff_duration_seconds",
        Unit::Seconds,
        "Duration of retry backoff delays in seconds"
    );

    describe_gauge!(
        "circuit_breaker_state",
        Unit::Count,
        "Circuit breaker state (0=closed, 1=half-open, 2=open)"
    );

    describe_gauge!(
        "rate_limit_tokens_available",
        Unit::Count,
        "Currently available rate limiter tokens"
    );

    describe_counter!(
        "offline_requests_buffered_total",
        Unit::Count,
        "Total number of requests buffered while offline"
    );

    describe_counter!(
        "import_pages_fetched_total",
        Unit::Count,
        "Total number of listing pages fetched"
    );

    describe_counter!(
        "import_items_fetched_total",
        Unit::Count,
        "Total number of items returned across fetched pages"
    );

    describe_counter!(
        "import_items_total",
        Unit::Count,
        "Total number of items processed, by outcome"
    );

    *initialized = true;
    info!("Metrics system initialized successfully on {}", addr);
    Ok(())
}

/// Whether the metrics system has been initialized.
pub async fn is_initialized() -> bool {
    *METRICS_INITIALIZED.read().await
}

/// Record a completed API request by status class.
pub fn record_request_complete(status: u16) {
    let class = match status {
        200..=299 => "2xx",
        429 => "429",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    };
    counter!("api_requests_total", "status" => class).increment(1);
    if status == 429 {
        counter!("api_429_errors_total").increment(1);
    }
}

/// Record a scheduled retry and its backoff delay.
pub fn record_retry_backoff(delay: Duration, attempt: u32) {
    counter!("api_retries_total").increment(1);
    histogram!("retry_backoff_duration_seconds").record(delay.as_secs_f64());
    debug!(
        backoff_ms = delay.as_millis() as u64,
        attempt, "Recorded retry backoff"
    );
}

/// Update the circuit breaker state gauge.
pub fn update_circuit_state(state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("circuit_breaker_state").set(value);
}

/// Update the available rate limiter token gauge.
pub fn update_available_tokens(tokens: f64) {
    gauge!("rate_limit_tokens_available").set(tokens);
}

/// Record a request buffered into the offline queue.
pub fn record_offline_buffered() {
    counter!("offline_requests_buffered_total").increment(1);
}

/// Record a fetched listing page and its item count.
pub fn record_page_fetched(items: u64) {
    counter!("import_pages_fetched_total").increment(1);
    counter!("import_items_fetched_total").increment(items);
}

/// Record one processed item by outcome ("imported", "skipped", "failed").
pub fn record_item_outcome(outcome: &'static str) {
    counter!("import_items_total", "outcome" => outcome).increment(1);
}
