//! Gateway façade types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use vantage_llm::ProviderStats;

/// How a summary should be shaped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryKind {
    /// A few sentences
    Brief,
    /// A full paragraph treatment
    Detailed,
    /// Bullet points
    BulletPoints,
}

impl SummaryKind {
    /// The instruction spliced into the summarize prompt
    #[must_use]
    pub fn focus(&self) -> &'static str {
        match self {
            Self::Brief => "Keep it to two or three sentences.",
            Self::Detailed => "Cover every substantive point in one or two paragraphs.",
            Self::BulletPoints => "Use short bullet points, one per fact.",
        }
    }
}

/// Overall service health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Every configured provider is reachable
    Healthy,
    /// Some providers are reachable
    Degraded,
    /// No provider is reachable
    Unhealthy,
}

/// Result of a health check across all configured providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Overall status
    pub status: HealthStatus,
    /// Per-provider reachability
    pub providers: HashMap<String, bool>,
}

impl HealthReport {
    /// Summarize per-provider probe results into a report
    #[must_use]
    pub fn from_probes(providers: HashMap<String, bool>) -> Self {
        let reachable = providers.values().filter(|r| **r).count();
        let status = if providers.is_empty() || reachable == 0 {
            HealthStatus::Unhealthy
        } else if reachable == providers.len() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        };
        Self { status, providers }
    }
}

/// Aggregate service metrics, as exposed to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceMetrics {
    /// Requests routed since startup
    pub total_requests: u64,
    /// Fraction of requests that succeeded
    pub success_rate: f64,
    /// Total tokens used, input and output combined
    pub tokens_used: u64,
    /// Total cost in USD
    pub total_cost: f64,
    /// Average request latency in milliseconds
    pub avg_latency_ms: f64,
    /// Per-provider breakdown
    pub by_provider: HashMap<String, ProviderStats>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probes(results: &[(&str, bool)]) -> HashMap<String, bool> {
        results
            .iter()
            .map(|(id, up)| ((*id).to_string(), *up))
            .collect()
    }

    #[test]
    fn test_all_reachable_is_healthy() {
        let report = HealthReport::from_probes(probes(&[("openai", true), ("gemini", true)]));
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_one_of_three_reachable_is_degraded() {
        let report = HealthReport::from_probes(probes(&[
            ("openai", true),
            ("anthropic", false),
            ("gemini", false),
        ]));
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.providers.values().filter(|r| **r).count(), 1);
    }

    #[test]
    fn test_none_reachable_is_unhealthy() {
        let report = HealthReport::from_probes(probes(&[("openai", false)]));
        assert_eq!(report.status, HealthStatus::Unhealthy);

        let empty = HealthReport::from_probes(HashMap::new());
        assert_eq!(empty.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_summary_kinds_have_distinct_focus() {
        assert_ne!(SummaryKind::Brief.focus(), SummaryKind::Detailed.focus());
        assert_ne!(
            SummaryKind::Detailed.focus(),
            SummaryKind::BulletPoints.focus()
        );
    }
}
