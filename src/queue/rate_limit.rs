//! Token-bucket rate limiting
//!
//! Implements continuous-refill admission control with reconciliation against
//! server-reported quota headers.

use std::time::{Duration, Instant};

/// Token-bucket rate limiter.
///
/// Tokens refill continuously at `max_tokens / window` and are consumed one
/// per admitted request. The limiter never blocks; callers poll
/// [`RateLimiter::wait_time`] and delay externally when no token is available.
///
/// Not internally synchronized: intended to be owned behind the request
/// queue's state lock, where all mutation is serialized.
#[derive(Debug)]
pub struct RateLimiter {
    max_tokens: f64,
    window: Duration,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Create a limiter allowing `max_tokens` requests per `window`.
    ///
    /// # Arguments
    /// * `max_tokens` - Bucket capacity (requests per window)
    /// * `window` - Time window for a full refill
    pub fn new(max_tokens: u32, window: Duration) -> Self {
        Self {
            max_tokens: f64::from(max_tokens),
            tokens: f64::from(max_tokens),
            window,
            last_refill: Instant::now(),
        }
    }

    /// Refill tokens based on wall-clock time elapsed since the last refill.
    ///
    /// Called implicitly before every operation. Tokens never exceed capacity.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let window_ms = self.window.as_millis() as f64;
        if window_ms > 0.0 {
            let replenished = elapsed.as_millis() as f64 / window_ms * self.max_tokens;
            self.tokens = (self.tokens + replenished).min(self.max_tokens);
        }
        self.last_refill = now;
    }

    /// Attempt to consume one token.
    ///
    /// Returns true and consumes the token if at least one full token is
    /// available after refill.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Time until at least one full token will be available.
    ///
    /// Returns zero when a token is already available.
    pub fn wait_time(&mut self) -> Duration {
        self.refill();
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        let deficit = 1.0 - self.tokens;
        let window_ms = self.window.as_millis() as f64;
        if self.max_tokens <= 0.0 {
            return self.window;
        }
        let ms = deficit * window_ms / self.max_tokens;
        Duration::from_millis(ms.ceil() as u64)
    }

    /// Reconcile local token count with the remote service's reported quota.
    ///
    /// The local estimate is only ever clamped downward: if the server says
    /// fewer requests remain than we think, we believe it; if it says more,
    /// we keep our conservative local count. A reset hint restarts refill
    /// accrual from now.
    pub fn update_from_headers(&mut self, remaining: Option<f64>, reset: Option<Duration>) {
        self.refill();
        if let Some(remaining) = remaining {
            let remaining = remaining.max(0.0);
            if remaining < self.tokens {
                tracing::debug!(
                    local = self.tokens,
                    remote = remaining,
                    "Clamping token count to server-reported quota"
                );
                self.tokens = remaining;
            }
        }
        if reset.is_some() {
            self.last_refill = Instant::now();
        }
    }

    /// Currently available tokens (after refill), for status snapshots.
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }
}
