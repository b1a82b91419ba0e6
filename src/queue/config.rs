//! Queue configuration constants and backoff calculation

use rand::Rng;
use std::time::Duration;

/// Maximum retry attempts for a failed request.
/// 3 retries with exponential backoff recovers from transient faults while
/// keeping worst-case per-request latency bounded.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default budget shared by queue wait and the execution timeout race.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of in-flight requests.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Initial backoff delay.
/// 1 second is long enough for a rate window to make progress but short
/// enough not to stall recovery from a blip.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff cap. Retry 6 would be 32s uncapped; 30s bounds total wait.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Fraction of the backoff delay used as jitter range.
pub const BACKOFF_JITTER: f64 = 0.25;

/// Default offline buffer capacity.
pub const DEFAULT_OFFLINE_CAPACITY: usize = 100;

/// Calculate the jittered exponential backoff delay for a retry attempt.
///
/// `retry_count` is 1-indexed: the first retry waits roughly the initial
/// delay. Jitter of up to 25% is added so concurrent retries do not
/// synchronize against the upstream.
pub fn calculate_backoff(retry_count: u32) -> Duration {
    let exponent = retry_count.saturating_sub(1).min(16);
    let base_ms = INITIAL_BACKOFF_MS.saturating_mul(2u64.pow(exponent));
    let base_ms = base_ms.min(MAX_BACKOFF_MS);
    let jitter_ms = (base_ms as f64 * BACKOFF_JITTER * rand::thread_rng().gen::<f64>()) as u64;
    Duration::from_millis(base_ms + jitter_ms)
}
