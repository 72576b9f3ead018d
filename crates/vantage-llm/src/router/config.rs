//! Gateway configuration
//!
//! The full configuration surface: per-provider credentials and quotas,
//! default model and fallback chain, feature flags, breaker and retry
//! tunables. Validated at load time so that a missing credential or a
//! dangling model reference fails startup instead of a request.

use crate::cost::DailyLimit;
use crate::error::{Error, Result};
use crate::limits::{CircuitBreakerConfig, RateLimitConfig, RetryConfig};
use crate::providers::mask_api_key;
use crate::registry::ModelEntry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

fn default_true() -> bool {
    true
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_retry_attempts() -> u32 {
    3
}
fn default_rpm() -> u32 {
    60
}
fn default_health_interval_secs() -> u64 {
    300
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    3
}
fn default_recovery_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

/// Settings for one provider
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// API key
    #[serde(default)]
    pub api_key: String,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retry attempts for delayed retries
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Requests per minute quota
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,
    /// Tokens per minute quota, if the provider enforces one
    #[serde(default)]
    pub tokens_per_minute: Option<u32>,
    /// Daily token ceiling
    #[serde(default)]
    pub daily_max_tokens: Option<u64>,
    /// Daily cost ceiling (USD)
    #[serde(default)]
    pub daily_max_cost: Option<f64>,
    /// Daily request ceiling
    #[serde(default)]
    pub daily_max_requests: Option<u64>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            timeout_ms: default_timeout_ms(),
            retry_attempts: default_retry_attempts(),
            requests_per_minute: default_rpm(),
            tokens_per_minute: None,
            daily_max_tokens: None,
            daily_max_cost: None,
            daily_max_requests: None,
        }
    }
}

// Custom Debug implementation to mask the API key
impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("retry_attempts", &self.retry_attempts)
            .field("requests_per_minute", &self.requests_per_minute)
            .field("tokens_per_minute", &self.tokens_per_minute)
            .field("daily_max_tokens", &self.daily_max_tokens)
            .field("daily_max_cost", &self.daily_max_cost)
            .field("daily_max_requests", &self.daily_max_requests)
            .finish()
    }
}

impl ProviderSettings {
    /// Create settings with an API key and defaults elsewhere
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Request timeout as a [`Duration`]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Daily limits derived from these settings
    #[must_use]
    pub fn daily_limit(&self) -> DailyLimit {
        DailyLimit {
            max_tokens: self.daily_max_tokens,
            max_cost: self.daily_max_cost,
            max_requests: self.daily_max_requests,
        }
    }
}

/// Feature flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Enforce per-provider sliding windows
    #[serde(default = "default_true")]
    pub enable_rate_limiting: bool,
    /// Fail over to further candidates and queue delayed retries
    #[serde(default = "default_true")]
    pub enable_fallbacks: bool,
    /// Apply the load-balancing strategy as a priority tie-break
    #[serde(default = "default_true")]
    pub enable_load_balancing: bool,
    /// Run the periodic health-check sweep
    #[serde(default = "default_true")]
    pub enable_health_checks: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            enable_fallbacks: true,
            enable_load_balancing: true,
            enable_health_checks: true,
        }
    }
}

/// Ordering among equally eligible candidates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceStrategy {
    /// Rotate a shared index across calls
    #[default]
    RoundRobin,
    /// Prefer the model with the fewest recent selections
    LeastLoaded,
    /// Shuffle
    Random,
}

/// Circuit breaker tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSettings {
    /// Consecutive failures before opening
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Seconds after the last failure before a trial request
    #[serde(default = "default_recovery_timeout_secs")]
    pub recovery_timeout_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            recovery_timeout_secs: default_recovery_timeout_secs(),
        }
    }
}

impl BreakerSettings {
    /// Convert to the breaker's own config type
    #[must_use]
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_failure_threshold(self.failure_threshold)
            .with_success_threshold(self.success_threshold)
            .with_recovery_timeout(Duration::from_secs(self.recovery_timeout_secs))
    }
}

/// Delayed retry tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Attempts before a queued item is dropped
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Initial backoff in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetrySettings {
    /// Convert to the retry queue's own config type
    #[must_use]
    pub fn to_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

/// The full gateway configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Provider settings by provider id
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    /// Model used when a request carries no override
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Models tried, in order, after the default
    #[serde(default)]
    pub fallback_models: Vec<String>,
    /// Feature flags
    #[serde(default)]
    pub flags: FeatureFlags,
    /// Ordering among equal-priority candidates
    #[serde(default)]
    pub load_balancing: LoadBalanceStrategy,
    /// Seconds between health-check sweeps
    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,
    /// Circuit breaker tunables
    #[serde(default)]
    pub breaker: BreakerSettings,
    /// Delayed retry tunables
    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            default_model: default_model(),
            fallback_models: Vec::new(),
            flags: FeatureFlags::default(),
            load_balancing: LoadBalanceStrategy::default(),
            health_check_interval_secs: default_health_interval_secs(),
            breaker: BreakerSettings::default(),
            retry: RetrySettings::default(),
        }
    }
}

/// A partial configuration update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigPatch {
    /// Providers to add or replace
    #[serde(default)]
    pub providers: HashMap<String, ProviderSettings>,
    /// New default model
    #[serde(default)]
    pub default_model: Option<String>,
    /// New fallback chain
    #[serde(default)]
    pub fallback_models: Option<Vec<String>>,
    /// New feature flags
    #[serde(default)]
    pub flags: Option<FeatureFlags>,
    /// New balance strategy
    #[serde(default)]
    pub load_balancing: Option<LoadBalanceStrategy>,
    /// New health-check interval
    #[serde(default)]
    pub health_check_interval_secs: Option<u64>,
}

impl GatewayConfig {
    /// Validate against the model catalog.
    ///
    /// Missing credentials, zero quotas, an unconfigured default-model
    /// provider or a dangling fallback reference are all load-time errors.
    pub fn validate(&self, catalog: &[ModelEntry]) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config("no providers configured".to_string()));
        }

        for (id, settings) in &self.providers {
            if settings.api_key.trim().is_empty() {
                return Err(Error::Config(format!("provider {id} has no credential")));
            }
            if settings.requests_per_minute == 0 {
                return Err(Error::Config(format!(
                    "provider {id} has a zero requests-per-minute quota"
                )));
            }
        }

        self.check_model_ref(&self.default_model, "default model", catalog)?;
        for fallback in &self.fallback_models {
            self.check_model_ref(fallback, "fallback model", catalog)?;
        }
        Ok(())
    }

    fn check_model_ref(&self, model_id: &str, what: &str, catalog: &[ModelEntry]) -> Result<()> {
        let entry = catalog
            .iter()
            .find(|e| e.id == model_id)
            .ok_or_else(|| Error::Config(format!("{what} {model_id} is not in the catalog")))?;
        if !self.providers.contains_key(&entry.provider) {
            return Err(Error::Config(format!(
                "{what} {model_id} references unconfigured provider {}",
                entry.provider
            )));
        }
        Ok(())
    }

    /// Copy with all credentials cleared, safe to export
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        for settings in config.providers.values_mut() {
            settings.api_key = String::new();
        }
        config
    }

    /// Overlay a partial update
    pub fn merge(&mut self, patch: GatewayConfigPatch) {
        for (id, settings) in patch.providers {
            self.providers.insert(id, settings);
        }
        if let Some(default_model) = patch.default_model {
            self.default_model = default_model;
        }
        if let Some(fallback_models) = patch.fallback_models {
            self.fallback_models = fallback_models;
        }
        if let Some(flags) = patch.flags {
            self.flags = flags;
        }
        if let Some(load_balancing) = patch.load_balancing {
            self.load_balancing = load_balancing;
        }
        if let Some(secs) = patch.health_check_interval_secs {
            self.health_check_interval_secs = secs;
        }
    }

    /// Parse from TOML
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Per-provider sliding-window configs
    #[must_use]
    pub fn rate_limit_configs(&self) -> HashMap<String, RateLimitConfig> {
        self.providers
            .iter()
            .map(|(id, s)| (id.clone(), RateLimitConfig::per_minute(s.requests_per_minute)))
            .collect()
    }

    /// Per-provider tokens-per-minute quotas, where configured
    #[must_use]
    pub fn token_quotas(&self) -> HashMap<String, u64> {
        self.providers
            .iter()
            .filter_map(|(id, s)| s.tokens_per_minute.map(|q| (id.clone(), u64::from(q))))
            .collect()
    }

    /// Per-provider daily limits
    #[must_use]
    pub fn daily_limits(&self) -> HashMap<String, DailyLimit> {
        self.providers
            .iter()
            .map(|(id, s)| (id.clone(), s.daily_limit()))
            .collect()
    }
}
