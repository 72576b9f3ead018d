//! Request limits - rate limiting, circuit breaking and delayed retries
//!
//! # Module Structure
//!
//! - `rate_limiter`: sliding-window request counters per key
//! - `circuit_breaker`: three-state breaker per key
//! - `gate`: combined admission check consulted before every attempt
//! - `retry_queue`: delayed re-execution of transient failures

mod circuit_breaker;
mod gate;
mod rate_limiter;
mod retry_queue;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use gate::{GateDecision, RequestGate};
pub use rate_limiter::{RateLimitConfig, RateLimitResult, RateLimiter};
pub use retry_queue::{RetryConfig, RetryDispatch, RetryItem, RetryPayload, RetryQueue};
