//! Circuit breaker
//!
//! Stops sending requests to a consistently failing backend. Three states:
//! - Closed: normal operation, requests pass through
//! - Open: consecutive failures reached the threshold, requests are rejected
//! - HalfOpen: trial state after the recovery timeout; one failure reopens,
//!   enough consecutive successes close the circuit again

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests pass through
    Closed,
    /// Failures reached threshold - requests are rejected
    Open,
    /// Testing recovery - requests pass through on trial
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Configuration for circuit breaker
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,
    /// Consecutive successes in half-open state to close the circuit
    pub success_threshold: u32,
    /// Time since the last failure before an open circuit becomes half-open
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set success threshold for half-open state
    #[must_use]
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Set recovery timeout
    #[must_use]
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

/// Circuit breaker for one (provider, model) key
pub struct CircuitBreaker {
    key: String,
    config: CircuitBreakerConfig,
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_failure_ms: AtomicU64,
}

impl CircuitBreaker {
    /// Create a new circuit breaker
    #[must_use]
    pub fn new(key: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            key: key.into(),
            config,
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_failure_ms: AtomicU64::new(0),
        }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults(key: impl Into<String>) -> Self {
        Self::new(key, CircuitBreakerConfig::default())
    }

    /// The key this breaker guards
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Current state, after applying any pending open -> half-open transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.check_recovery();
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Current consecutive failure count
    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Check if the circuit allows a request
    #[must_use]
    pub fn can_execute(&self) -> bool {
        match self.state() {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        }
    }

    /// Record a successful operation
    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => {
                self.failure_count.store(0, Ordering::SeqCst);
            }
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    key = %self.key,
                    successes,
                    threshold = self.config.success_threshold,
                    "Circuit breaker success in half-open state"
                );
                if successes >= self.config.success_threshold {
                    self.close();
                }
            }
            CircuitState::Open => {}
        }
    }

    /// Record a failed operation
    pub fn record_failure(&self) {
        self.last_failure_ms
            .store(current_timestamp(), Ordering::SeqCst);

        match self.state() {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    key = %self.key,
                    failures,
                    threshold = self.config.failure_threshold,
                    "Circuit breaker failure recorded"
                );
                if failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => {
                warn!(key = %self.key, "Circuit breaker failure in half-open state, reopening");
                self.open();
            }
            CircuitState::Open => {}
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        self.close();
    }

    // Open circuits transition to half-open lazily, on the next status check
    // after the recovery timeout has elapsed since the last failure.
    fn check_recovery(&self) {
        let is_open = {
            let state = self.state.read().unwrap_or_else(|e| e.into_inner());
            *state == CircuitState::Open
        };
        if !is_open {
            return;
        }

        let last_failure = self.last_failure_ms.load(Ordering::SeqCst);
        let elapsed = Duration::from_millis(current_timestamp().saturating_sub(last_failure));
        if elapsed >= self.config.recovery_timeout {
            self.half_open();
        }
    }

    fn open(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != CircuitState::Open {
            info!(
                key = %self.key,
                failures = self.failure_count.load(Ordering::SeqCst),
                "Circuit breaker opened"
            );
            *state = CircuitState::Open;
        }
    }

    fn half_open(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state == CircuitState::Open {
            info!(key = %self.key, "Circuit breaker entering half-open state");
            *state = CircuitState::HalfOpen;
            self.success_count.store(0, Ordering::SeqCst);
            self.failure_count.store(0, Ordering::SeqCst);
        }
    }

    fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if *state != CircuitState::Closed {
            info!(key = %self.key, "Circuit breaker closed");
            *state = CircuitState::Closed;
            self.failure_count.store(0, Ordering::SeqCst);
            self.success_count.store(0, Ordering::SeqCst);
        }
    }
}

/// Current timestamp in milliseconds
fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_initial_state() {
        let cb = CircuitBreaker::with_defaults("openai:gpt-4o");
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_opens_after_consecutive_failures() {
        let cb = CircuitBreaker::with_defaults("key");

        for _ in 0..4 {
            cb.record_failure();
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::with_defaults("key");

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.failure_count(), 2);

        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_after_recovery_timeout() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(2)
            .with_recovery_timeout(Duration::from_millis(20));
        let cb = CircuitBreaker::new("key", config);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        assert!(cb.can_execute());
    }

    #[test]
    fn test_half_open_closes_after_success_threshold() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_success_threshold(3)
            .with_recovery_timeout(Duration::from_millis(10));
        let cb = CircuitBreaker::new("key", config);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let config = CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::from_millis(10));
        let cb = CircuitBreaker::new("key", config);

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.can_execute());
    }

    #[test]
    fn test_reset() {
        let config = CircuitBreakerConfig::new().with_failure_threshold(2);
        let cb = CircuitBreaker::new("key", config);

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.can_execute());
    }
}
