//! # Circuit Breaker
//!
//! Failure-count gate in front of the Authority. After a run of consecutive
//! failures the breaker opens and rejects calls without attempting I/O, so
//! callers fall back to contingency storage instead of blocking on timeouts.
//! Once the cool-down window elapses the breaker re-closes optimistically
//! and the next call is the recovery trial.
//!
//! State is in-memory and process-lifetime only: an Authority outage that
//! survives a process restart will simply re-open the breaker.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitState {
    /// Normal operation - calls are allowed through.
    Closed = 0,
    /// Failing fast - calls are rejected without I/O.
    Open = 1,
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            _ => CircuitState::Open,
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u64,
    /// How long the circuit stays open before optimistically re-closing.
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(5 * 60),
        }
    }
}

/// Point-in-time view of breaker state for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u64,
    /// How long the circuit has been open, when it is.
    pub open_for: Option<Duration>,
}

/// Failure-count circuit breaker shared between request-time transmissions
/// and the background replay job. All methods are safe to call concurrently.
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Component name for logging.
    name: String,
    /// Current state (atomic so `allow_request` stays lock-free on the
    /// closed path).
    state: AtomicU8,
    /// Consecutive failures since the last success.
    consecutive_failures: AtomicU64,
    /// When the circuit was last opened.
    opened_at: Mutex<Option<Instant>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            component = %name,
            failure_threshold = config.failure_threshold,
            cooldown_secs = config.cooldown.as_secs(),
            "🛡️ Circuit breaker initialized"
        );
        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            consecutive_failures: AtomicU64::new(0),
            opened_at: Mutex::new(None),
            config,
        }
    }

    /// Current circuit state.
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Consecutive failures recorded since the last success.
    pub fn failure_count(&self) -> u64 {
        self.consecutive_failures.load(Ordering::Acquire)
    }

    /// Whether a call may proceed. While open, returns false until the
    /// cool-down elapses; then the circuit re-closes and the call goes
    /// through as the recovery trial. The failure counter is not reset on
    /// re-close, so a failed trial re-opens the circuit immediately.
    pub fn allow_request(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let mut opened_at = self.opened_at.lock();
                match *opened_at {
                    Some(opened) if opened.elapsed() >= self.config.cooldown => {
                        *opened_at = None;
                        self.state.store(CircuitState::Closed as u8, Ordering::Release);
                        info!(
                            component = %self.name,
                            open_secs = opened.elapsed().as_secs(),
                            "🟡 Circuit breaker cool-down elapsed, allowing trial request"
                        );
                        true
                    }
                    Some(_) => false,
                    None => {
                        // Open without a timestamp should not happen; fail open.
                        warn!(component = %self.name, "Circuit open but no timestamp recorded");
                        true
                    }
                }
            }
        }
    }

    /// Record a successful call; resets the failure run.
    pub fn record_success(&self) {
        let previous = self.consecutive_failures.swap(0, Ordering::AcqRel);
        if previous > 0 {
            debug!(
                component = %self.name,
                cleared_failures = previous,
                "🟢 Circuit breaker failure run cleared"
            );
        }
        if self.state() == CircuitState::Open {
            // Success while open means a trial slipped through; recover.
            self.transition_to_closed();
        }
    }

    /// Record a failed call; opens the circuit once the threshold is hit.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(
            component = %self.name,
            consecutive_failures = failures,
            "🔴 Circuit breaker failure recorded"
        );
        if failures >= self.config.failure_threshold && self.state() == CircuitState::Closed {
            self.transition_to_open(failures);
        }
    }

    /// Diagnostics snapshot.
    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        CircuitBreakerSnapshot {
            state: self.state(),
            consecutive_failures: self.failure_count(),
            open_for: self.opened_at.lock().map(|opened| opened.elapsed()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn transition_to_open(&self, failures: u64) {
        *self.opened_at.lock() = Some(Instant::now());
        self.state.store(CircuitState::Open as u8, Ordering::Release);
        warn!(
            component = %self.name,
            consecutive_failures = failures,
            failure_threshold = self.config.failure_threshold,
            cooldown_secs = self.config.cooldown.as_secs(),
            "🔴 Circuit breaker opened (failing fast)"
        );
    }

    fn transition_to_closed(&self) {
        *self.opened_at.lock() = None;
        self.state.store(CircuitState::Closed as u8, Ordering::Release);
        info!(component = %self.name, "🟢 Circuit breaker closed (recovered)");
    }
}
