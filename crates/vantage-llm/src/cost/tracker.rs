//! Cost tracker
//!
//! Append-only usage records with a retention window, day-bucketed
//! per-provider counters, and daily budget enforcement. Limit alerts are
//! emitted once per provider per calendar day.

use super::record::{ModelStats, ProviderStats, UsageRecord, UsageStats};
use crate::registry::ModelEntry;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Maximum records to keep in memory by default
const DEFAULT_MAX_RECORDS: usize = 10_000;

/// Record retention window in days
const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Assumed input share of a total-token estimate when the actual
/// input/output split is not yet known. A placeholder policy, not a
/// calibrated costing model; actual usage is recorded after the fact.
pub const ESTIMATE_INPUT_RATIO: f64 = 0.7;

/// Per-provider daily budget ceilings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DailyLimit {
    /// Maximum tokens per calendar day
    pub max_tokens: Option<u64>,
    /// Maximum cost per calendar day (USD)
    pub max_cost: Option<f64>,
    /// Maximum requests per calendar day
    pub max_requests: Option<u64>,
}

impl DailyLimit {
    /// Whether any ceiling is set
    #[must_use]
    pub fn is_enforced(&self) -> bool {
        self.max_tokens.is_some() || self.max_cost.is_some() || self.max_requests.is_some()
    }
}

/// Accumulated usage for one provider on one calendar day
#[derive(Debug, Clone, Default)]
pub struct DayUsage {
    /// The day the counters cover
    pub day: Option<NaiveDate>,
    /// Tokens used
    pub tokens: u64,
    /// Cost accumulated (USD)
    pub cost: f64,
    /// Requests issued
    pub requests: u64,
}

impl DayUsage {
    fn roll_to(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            *self = Self {
                day: Some(today),
                ..Self::default()
            };
        }
    }
}

/// Cost tracker for gateway usage
#[derive(Debug)]
pub struct CostTracker {
    records: RwLock<Vec<UsageRecord>>,
    daily: RwLock<HashMap<String, DayUsage>>,
    limits: RwLock<HashMap<String, DailyLimit>>,
    /// Provider -> last day an over-limit alert was emitted
    alerted: RwLock<HashMap<String, NaiveDate>>,
    next_id: AtomicU64,
    alerts_emitted: AtomicU64,
    max_records: usize,
    retention: ChronoDuration,
}

impl Default for CostTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CostTracker {
    /// Create a new tracker
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            daily: RwLock::new(HashMap::new()),
            limits: RwLock::new(HashMap::new()),
            alerted: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            alerts_emitted: AtomicU64::new(0),
            max_records: DEFAULT_MAX_RECORDS,
            retention: ChronoDuration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    /// Create with a custom in-memory record cap
    #[must_use]
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    /// Create a tracker with daily limits already installed
    #[must_use]
    pub fn with_limits(limits: HashMap<String, DailyLimit>) -> Self {
        Self {
            limits: RwLock::new(limits),
            ..Self::new()
        }
    }

    /// Set the daily limit for a provider
    pub async fn set_limit(&self, provider: &str, limit: DailyLimit) {
        self.limits.write().await.insert(provider.to_string(), limit);
    }

    /// Record a usage event
    pub async fn track(
        &self,
        provider: &str,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
        cost: f64,
        latency_ms: u64,
        success: bool,
        error_code: Option<&str>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let record = UsageRecord {
            id,
            timestamp: now,
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens,
            output_tokens,
            cost,
            latency_ms,
            success,
            error_code: error_code.map(str::to_string),
        };

        debug!(
            provider,
            model,
            input_tokens,
            output_tokens,
            cost,
            success,
            "Usage recorded"
        );

        {
            let mut records = self.records.write().await;
            records.push(record);

            let cutoff = now - self.retention;
            records.retain(|r| r.timestamp >= cutoff);
            if records.len() > self.max_records {
                let excess = records.len() - self.max_records;
                records.drain(..excess);
            }
        }

        let today = now.date_naive();
        {
            let mut daily = self.daily.write().await;
            let usage = daily.entry(provider.to_string()).or_default();
            usage.roll_to(today);
            usage.tokens += u64::from(input_tokens) + u64::from(output_tokens);
            usage.cost += cost;
            usage.requests += 1;
        }

        self.alert_if_over_limit(provider, today).await;
        id
    }

    /// Estimate cost for a total-token estimate at a model's rates.
    ///
    /// Splits the estimate 70/30 input/output, since the actual split is
    /// unknown before the request is served.
    #[must_use]
    pub fn estimate_cost(&self, model: &ModelEntry, total_tokens: u64) -> f64 {
        let input = total_tokens as f64 * ESTIMATE_INPUT_RATIO;
        let output = total_tokens as f64 * (1.0 - ESTIMATE_INPUT_RATIO);
        (input * model.input_cost + output * model.output_cost) / 1_000_000.0
    }

    /// Whether issuing a request with the given estimates would cross the
    /// provider's daily limit
    pub async fn would_exceed_limits(
        &self,
        provider: &str,
        estimated_tokens: u64,
        estimated_cost: f64,
    ) -> bool {
        let limit = match self.limits.read().await.get(provider).cloned() {
            Some(limit) if limit.is_enforced() => limit,
            _ => return false,
        };

        let today = Utc::now().date_naive();
        let usage = self.today_usage_inner(provider, today).await;

        if let Some(max_tokens) = limit.max_tokens {
            if usage.tokens + estimated_tokens > max_tokens {
                return true;
            }
        }
        if let Some(max_cost) = limit.max_cost {
            if usage.cost + estimated_cost > max_cost {
                return true;
            }
        }
        if let Some(max_requests) = limit.max_requests {
            if usage.requests + 1 > max_requests {
                return true;
            }
        }
        false
    }

    /// Today's accumulated usage for a provider
    pub async fn today_usage(&self, provider: &str) -> DayUsage {
        self.today_usage_inner(provider, Utc::now().date_naive())
            .await
    }

    async fn today_usage_inner(&self, provider: &str, today: NaiveDate) -> DayUsage {
        let daily = self.daily.read().await;
        match daily.get(provider) {
            Some(usage) if usage.day == Some(today) => usage.clone(),
            _ => DayUsage {
                day: Some(today),
                ..DayUsage::default()
            },
        }
    }

    /// Aggregate statistics over retained records
    pub async fn stats(&self) -> UsageStats {
        let records = self.records.read().await;
        let mut stats = UsageStats::default();
        let mut total_latency: u64 = 0;

        for record in records.iter() {
            stats.total_input_tokens += u64::from(record.input_tokens);
            stats.total_output_tokens += u64::from(record.output_tokens);
            stats.total_cost += record.cost;
            stats.total_requests += 1;
            if record.success {
                stats.successful_requests += 1;
            } else {
                stats.failed_requests += 1;
            }
            total_latency += record.latency_ms;

            let provider = stats
                .by_provider
                .entry(record.provider.clone())
                .or_insert_with(|| ProviderStats {
                    provider: record.provider.clone(),
                    ..ProviderStats::default()
                });
            provider.total_tokens +=
                u64::from(record.input_tokens) + u64::from(record.output_tokens);
            provider.total_cost += record.cost;
            provider.request_count += 1;
            if !record.success {
                provider.failure_count += 1;
            }

            let model = stats
                .by_model
                .entry(record.model.clone())
                .or_insert_with(|| ModelStats {
                    model: record.model.clone(),
                    ..ModelStats::default()
                });
            model.input_tokens += u64::from(record.input_tokens);
            model.output_tokens += u64::from(record.output_tokens);
            model.total_cost += record.cost;
            model.request_count += 1;
        }

        if stats.total_requests > 0 {
            stats.avg_latency_ms = total_latency as f64 / stats.total_requests as f64;
        }
        stats
    }

    /// Recent records, newest last
    pub async fn recent_records(&self, limit: usize) -> Vec<UsageRecord> {
        let records = self.records.read().await;
        let start = records.len().saturating_sub(limit);
        records[start..].to_vec()
    }

    /// Number of over-limit alerts emitted since startup
    #[must_use]
    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted.load(Ordering::SeqCst)
    }

    // Emits at most one alert per provider per calendar day.
    async fn alert_if_over_limit(&self, provider: &str, today: NaiveDate) {
        let limit = match self.limits.read().await.get(provider).cloned() {
            Some(limit) if limit.is_enforced() => limit,
            _ => return,
        };

        let usage = self.today_usage_inner(provider, today).await;
        let over_tokens = limit.max_tokens.is_some_and(|max| usage.tokens > max);
        let over_cost = limit.max_cost.is_some_and(|max| usage.cost > max);
        let over_requests = limit.max_requests.is_some_and(|max| usage.requests > max);
        if !(over_tokens || over_cost || over_requests) {
            return;
        }

        let mut alerted = self.alerted.write().await;
        if alerted.get(provider) == Some(&today) {
            return;
        }
        alerted.insert(provider.to_string(), today);
        self.alerts_emitted.fetch_add(1, Ordering::SeqCst);
        warn!(
            provider,
            tokens = usage.tokens,
            cost = usage.cost,
            requests = usage.requests,
            "Provider crossed its daily usage limit"
        );
    }
}
