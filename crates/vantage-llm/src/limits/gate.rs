//! Request admission gate
//!
//! Combines the per-key circuit breakers with per-provider sliding windows
//! over both request counts and token throughput. The router consults
//! [`RequestGate::can_make_request`] before every attempt;
//! `record_request`, `record_tokens`, `record_success` and
//! `record_failure` are the only mutators. Keys are `provider:model`.

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::rate_limiter::{RateLimitConfig, RateLimiter};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// The request may proceed
    Allowed,
    /// The breaker for this key is open
    BreakerOpen,
    /// The provider's request or token window is exhausted
    WindowExhausted {
        /// Time until capacity frees up
        reset_after: Duration,
    },
}

impl GateDecision {
    /// Whether the request may proceed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

// Sliding token-throughput window for providers that publish a
// tokens-per-minute quota.
struct TokenWindow {
    max_tokens: u64,
    window: Duration,
    entries: Mutex<Vec<(Instant, u64)>>,
}

impl TokenWindow {
    fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            window: Duration::from_secs(60),
            entries: Mutex::new(Vec::new()),
        }
    }

    fn would_fit(&self, estimated: u64) -> (bool, Duration) {
        let now = Instant::now();
        let window_start = now - self.window;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(t, _)| *t > window_start);

        let used: u64 = entries.iter().map(|(_, tokens)| tokens).sum();
        if used + estimated <= self.max_tokens {
            (true, Duration::ZERO)
        } else {
            let reset_after = entries
                .iter()
                .map(|(t, _)| self.window.saturating_sub(now.duration_since(*t)))
                .min()
                .unwrap_or(Duration::ZERO);
            (false, reset_after)
        }
    }

    fn record(&self, tokens: u64) {
        let now = Instant::now();
        let window_start = now - self.window;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(t, _)| *t > window_start);
        entries.push((now, tokens));
    }
}

/// Per-key breakers plus per-provider rate-limit windows
pub struct RequestGate {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    limiters: DashMap<String, RateLimiter>,
    token_windows: DashMap<String, Arc<TokenWindow>>,
    breaker_config: CircuitBreakerConfig,
    /// Per-provider request-window configs; providers not listed use the default
    limit_configs: HashMap<String, RateLimitConfig>,
    /// Per-provider tokens-per-minute quotas
    token_quotas: HashMap<String, u64>,
    default_limit: RateLimitConfig,
    rate_limiting_enabled: bool,
}

impl RequestGate {
    /// Create a gate with per-provider window configs
    #[must_use]
    pub fn new(
        breaker_config: CircuitBreakerConfig,
        limit_configs: HashMap<String, RateLimitConfig>,
        token_quotas: HashMap<String, u64>,
        rate_limiting_enabled: bool,
    ) -> Self {
        Self {
            breakers: DashMap::new(),
            limiters: DashMap::new(),
            token_windows: DashMap::new(),
            breaker_config,
            limit_configs,
            token_quotas,
            default_limit: RateLimitConfig::default(),
            rate_limiting_enabled,
        }
    }

    /// Create a gate with default settings, rate limiting on
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(
            CircuitBreakerConfig::default(),
            HashMap::new(),
            HashMap::new(),
            true,
        )
    }

    /// Check whether a request for `provider:model` may proceed right now.
    ///
    /// Consults the breaker first, then the provider's request and token
    /// windows; neither window is mutated, and the breaker only applies its
    /// own lazy recovery transition.
    pub async fn can_make_request(&self, key: &str, estimated_tokens: u64) -> GateDecision {
        if !self.breaker_for(key).can_execute() {
            return GateDecision::BreakerOpen;
        }

        if self.rate_limiting_enabled {
            let provider = provider_of(key);
            let result = self.limiter_for(provider).check(provider).await;
            if !result.allowed {
                return GateDecision::WindowExhausted {
                    reset_after: result.reset_after,
                };
            }

            if let Some(window) = self.token_window_for(provider) {
                let (fits, reset_after) = window.would_fit(estimated_tokens);
                if !fits {
                    return GateDecision::WindowExhausted { reset_after };
                }
            }
        }

        GateDecision::Allowed
    }

    /// Count a request against the provider's request window
    pub async fn record_request(&self, key: &str) {
        if self.rate_limiting_enabled {
            let provider = provider_of(key);
            self.limiter_for(provider).record(provider).await;
        }
    }

    /// Count served tokens against the provider's token window
    pub fn record_tokens(&self, key: &str, tokens: u64) {
        if self.rate_limiting_enabled {
            if let Some(window) = self.token_window_for(provider_of(key)) {
                window.record(tokens);
            }
        }
    }

    /// Record a successful attempt on the key's breaker
    pub fn record_success(&self, key: &str) {
        self.breaker_for(key).record_success();
    }

    /// Record a failed attempt on the key's breaker
    pub fn record_failure(&self, key: &str) {
        self.breaker_for(key).record_failure();
    }

    /// Current breaker state for a key
    #[must_use]
    pub fn breaker_state(&self, key: &str) -> CircuitState {
        self.breaker_for(key).state()
    }

    /// Current request-window usage for a provider as (used, max)
    pub async fn window_usage(&self, provider: &str) -> (u32, u32) {
        self.limiter_for(provider).usage(provider).await
    }

    /// Drop expired window entries across all providers
    pub async fn cleanup(&self) {
        for limiter in self.limiters.iter() {
            limiter.value().cleanup().await;
        }
    }

    fn breaker_for(&self, key: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(key, self.breaker_config.clone())))
            .clone()
    }

    fn limiter_for(&self, provider: &str) -> RateLimiter {
        self.limiters
            .entry(provider.to_string())
            .or_insert_with(|| {
                let config = self
                    .limit_configs
                    .get(provider)
                    .cloned()
                    .unwrap_or_else(|| self.default_limit.clone());
                RateLimiter::new(config)
            })
            .clone()
    }

    fn token_window_for(&self, provider: &str) -> Option<Arc<TokenWindow>> {
        let quota = *self.token_quotas.get(provider)?;
        Some(
            self.token_windows
                .entry(provider.to_string())
                .or_insert_with(|| Arc::new(TokenWindow::new(quota)))
                .clone(),
        )
    }
}

/// Keys are `provider:model`; windows apply to the provider part
fn provider_of(key: &str) -> &str {
    key.split(':').next().unwrap_or(key)
}
