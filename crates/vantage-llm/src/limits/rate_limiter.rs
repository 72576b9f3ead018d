//! Sliding-window rate limiting
//!
//! Tracks request timestamps per key and prunes them on each check, so the
//! number of accepted requests inside any window never exceeds the maximum.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window for rate limiting
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    /// Create a new rate limit config
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    /// Create config for requests per minute
    #[must_use]
    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

/// Result of a rate limit check
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in the current window
    pub remaining: u32,
    /// Time until capacity frees up
    pub reset_after: Duration,
    /// Requests counted in the current window
    pub current: u32,
}

/// In-memory rate limiter using a sliding window
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    /// Map of key -> request timestamps
    requests: Arc<RwLock<HashMap<String, Vec<Instant>>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The configured window size
    #[must_use]
    pub fn window(&self) -> Duration {
        self.config.window
    }

    /// Check if a request is allowed for the given key without recording it
    pub async fn check(&self, key: &str) -> RateLimitResult {
        let now = Instant::now();
        let window_start = now - self.config.window;

        let requests = self.requests.read().await;
        let records = requests.get(key);

        let current = records
            .map(|r| r.iter().filter(|t| **t > window_start).count() as u32)
            .unwrap_or(0);

        let reset_after = Self::reset_after(records, window_start, self.config.window, now);

        if current < self.config.max_requests {
            RateLimitResult {
                allowed: true,
                remaining: self.config.max_requests - current - 1,
                reset_after,
                current: current + 1,
            }
        } else {
            RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_after,
                current,
            }
        }
    }

    /// Record a request for the given key
    pub async fn record(&self, key: &str) {
        let now = Instant::now();
        let window_start = now - self.config.window;

        let mut requests = self.requests.write().await;
        let records = requests.entry(key.to_string()).or_default();
        records.retain(|t| *t > window_start);
        records.push(now);
    }

    /// Check and record in one operation
    pub async fn acquire(&self, key: &str) -> RateLimitResult {
        let result = self.check(key).await;
        if result.allowed {
            self.record(key).await;
        }
        result
    }

    /// Current usage for a key as (used, max)
    pub async fn usage(&self, key: &str) -> (u32, u32) {
        let now = Instant::now();
        let window_start = now - self.config.window;

        let requests = self.requests.read().await;
        let current = requests
            .get(key)
            .map(|r| r.iter().filter(|t| **t > window_start).count() as u32)
            .unwrap_or(0);

        (current, self.config.max_requests)
    }

    /// Reset the window for a key
    pub async fn reset(&self, key: &str) {
        self.requests.write().await.remove(key);
    }

    /// Drop keys whose windows have fully expired, returning how many
    pub async fn cleanup(&self) -> usize {
        let now = Instant::now();
        let window_start = now - self.config.window;

        let mut requests = self.requests.write().await;
        let initial = requests.len();
        requests.retain(|_, records| {
            records.retain(|t| *t > window_start);
            !records.is_empty()
        });
        initial - requests.len()
    }

    fn reset_after(
        records: Option<&Vec<Instant>>,
        window_start: Instant,
        window: Duration,
        now: Instant,
    ) -> Duration {
        match records {
            Some(records) => records
                .iter()
                .filter(|t| **t > window_start)
                .min()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }
}

impl Clone for RateLimiter {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            requests: Arc::clone(&self.requests),
        }
    }
}
