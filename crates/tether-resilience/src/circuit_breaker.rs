//! Consecutive-failure circuit breaker.
//!
//! Evaluated lazily: there is no timer. An open circuit becomes half-open on
//! the first `should_allow_request` after the open timeout has elapsed.

use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Default consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time an open circuit rejects requests.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, open_timeout: Duration) -> Self {
        Self {
            failure_threshold,
            open_timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Threshold reached; requests are refused until the timeout elapses.
    Open,
    /// Timeout elapsed; requests are let through to probe for recovery.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Point-in-time view of the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

/// Thread-safe three-state circuit breaker.
///
/// Constructed once and shared by reference (`Arc`) between every caller
/// that issues remote calls. Not persisted: a new process starts closed.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Whether a request may proceed now.
    pub fn should_allow_request(&self) -> bool {
        self.should_allow_request_at(Instant::now())
    }

    /// Whether a request may proceed at `now`.
    ///
    /// Concurrent callers in the half-open state are all let through.
    pub fn should_allow_request_at(&self, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);
                if elapsed > self.config.open_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(
                        failure_count = inner.failure_count,
                        "Circuit breaker half-open, probing"
                    );
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Reset to closed.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(previous = %inner.state, "Circuit breaker closed");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
    }

    /// Count a failure now.
    pub fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    /// Count a failure at `now`, opening the circuit at the threshold.
    pub fn record_failure_at(&self, now: Instant) {
        let mut inner = self.inner.lock();
        inner.failure_count = inner.failure_count.saturating_add(1);
        inner.last_failure = Some(now);

        if inner.failure_count >= self.config.failure_threshold
            && inner.state != CircuitState::Open
        {
            inner.state = CircuitState::Open;
            tracing::warn!(
                failure_count = inner.failure_count,
                open_for_secs = self.config.open_timeout.as_secs(),
                "Circuit breaker opened"
            );
        } else {
            tracing::debug!(
                failure_count = inner.failure_count,
                threshold = self.config.failure_threshold,
                "Circuit breaker recorded failure"
            );
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.inner.lock().failure_count
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            last_failure: inner.last_failure,
        }
    }

    /// How long an open circuit will keep refusing requests, measured from
    /// `now`. `None` unless open.
    ///
    /// A timeout too large to represent as an `Instant` reports
    /// `Duration::MAX`.
    pub fn remaining_open_at(&self, now: Instant) -> Option<Duration> {
        let inner = self.inner.lock();
        if inner.state != CircuitState::Open {
            return None;
        }
        let last = inner.last_failure?;
        let remaining = match last.checked_add(self.config.open_timeout) {
            Some(reopen_at) => reopen_at.saturating_duration_since(now),
            None => Duration::MAX,
        };
        Some(remaining.max(Duration::from_millis(1)))
    }

    /// [`remaining_open_at`](Self::remaining_open_at) measured from now.
    pub fn remaining_open(&self) -> Option<Duration> {
        self.remaining_open_at(Instant::now())
    }
}
