//! Circuit breaker state machine
//!
//! Stops issuing calls to a failing upstream for a cooldown period, then
//! cautiously probes recovery through a half-open state.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are blocked until the reset timeout elapses.
    Open,
    /// Probing: requests are allowed while recovery is evaluated.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        write!(f, "{s}")
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Windowed failure count that opens the circuit.
    pub failure_threshold: usize,
    /// Consecutive half-open successes required to close the circuit.
    pub success_threshold: usize,
    /// Rolling window; failures older than this never count.
    pub failure_window: Duration,
    /// Cooldown before an open circuit admits a probe.
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            failure_window: Duration::from_secs(60),
            reset_timeout: Duration::from_secs(30),
        }
    }
}

/// Failure-rate circuit breaker.
///
/// Transitions: closed→open once the windowed failure count reaches the
/// threshold; open→half-open after the reset timeout; half-open→closed after
/// enough consecutive successes; half-open→open immediately on any failure.
/// The single-strike reopen keeps a flapping upstream from repeatedly burning
/// the full probe budget.
///
/// Not internally synchronized: owned behind the request queue's state lock.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: VecDeque<Instant>,
    half_open_successes: usize,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a breaker with the given configuration.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: VecDeque::new(),
            half_open_successes: 0,
            last_failure: None,
        }
    }

    /// Drop failures that have aged out of the rolling window.
    fn prune_failures(&mut self) {
        // Clock younger than the window: nothing can have aged out yet.
        let Some(cutoff) = Instant::now().checked_sub(self.config.failure_window) else {
            return;
        };
        while let Some(front) = self.failures.front() {
            if *front < cutoff {
                self.failures.pop_front();
            } else {
                break;
            }
        }
    }

    /// Whether a request may be issued right now.
    ///
    /// In `Open`, returns true only once the reset timeout has elapsed since
    /// the last failure, transitioning to `HalfOpen` as a side effect.
    pub fn allow_request(&mut self) -> bool {
        self.prune_failures();
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(self.config.reset_timeout);
                if elapsed >= self.config.reset_timeout {
                    tracing::info!("Circuit breaker entering half-open state to probe recovery");
                    self.state = CircuitState::HalfOpen;
                    self.half_open_successes = 0;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful request.
    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::Closed => {
                self.failures.clear();
            }
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= self.config.success_threshold {
                    tracing::info!(
                        successes = self.half_open_successes,
                        "Circuit breaker closed after successful probes"
                    );
                    self.state = CircuitState::Closed;
                    self.failures.clear();
                    self.half_open_successes = 0;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed request.
    ///
    /// A half-open circuit reopens on the first failure; a closed circuit
    /// opens once the windowed failure count crosses the threshold.
    pub fn record_failure(&mut self) {
        let now = Instant::now();
        self.failures.push_back(now);
        self.last_failure = Some(now);

        match self.state {
            CircuitState::HalfOpen => {
                tracing::warn!("Circuit breaker reopened: failure during half-open probe");
                self.state = CircuitState::Open;
                self.half_open_successes = 0;
            }
            CircuitState::Closed => {
                self.prune_failures();
                if self.failures.len() >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = self.failures.len(),
                        threshold = self.config.failure_threshold,
                        "Circuit breaker opened"
                    );
                    self.state = CircuitState::Open;
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Manual operator override: force-close and clear all counters.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.half_open_successes = 0;
        self.last_failure = None;
    }

    /// Remaining cooldown before an open circuit will admit a probe.
    ///
    /// Zero when the circuit is not open or the timeout has already elapsed.
    pub fn retry_delay(&self) -> Duration {
        if self.state != CircuitState::Open {
            return Duration::ZERO;
        }
        match self.last_failure {
            Some(t) => self.config.reset_timeout.saturating_sub(t.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Current state, for status snapshots.
    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Failures currently inside the rolling window.
    pub fn windowed_failures(&mut self) -> usize {
        self.prune_failures();
        self.failures.len()
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
