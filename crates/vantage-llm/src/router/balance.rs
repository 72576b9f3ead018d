//! Load balancing
//!
//! Reorders candidates that share a priority. Explicit request preferences
//! and the priority ordering itself are never bypassed; the strategy only
//! breaks ties inside an equal-priority group.

use super::config::LoadBalanceStrategy;
use crate::registry::ModelEntry;
use dashmap::DashMap;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Tie-break ordering among equal-priority candidates
pub struct Balancer {
    strategy: LoadBalanceStrategy,
    rr_index: AtomicUsize,
    /// Model id -> recent selection count
    selections: DashMap<String, u64>,
}

impl Balancer {
    /// Create a balancer for the given strategy
    #[must_use]
    pub fn new(strategy: LoadBalanceStrategy) -> Self {
        Self {
            strategy,
            rr_index: AtomicUsize::new(0),
            selections: DashMap::new(),
        }
    }

    /// Count a routed request against a model
    pub fn note_selection(&self, model_id: &str) {
        *self.selections.entry(model_id.to_string()).or_insert(0) += 1;
    }

    /// Recent selection count for a model
    #[must_use]
    pub fn selection_count(&self, model_id: &str) -> u64 {
        self.selections.get(model_id).map(|c| *c).unwrap_or(0)
    }

    /// Sort candidates by priority, then reorder each equal-priority run
    /// according to the strategy.
    pub fn order(&self, candidates: &mut [ModelEntry]) {
        candidates.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));

        let rotation = match self.strategy {
            LoadBalanceStrategy::RoundRobin => self.rr_index.fetch_add(1, Ordering::SeqCst),
            _ => 0,
        };

        let mut start = 0;
        while start < candidates.len() {
            let priority = candidates[start].priority;
            let mut end = start + 1;
            while end < candidates.len() && candidates[end].priority == priority {
                end += 1;
            }

            let run = &mut candidates[start..end];
            if run.len() > 1 {
                match self.strategy {
                    LoadBalanceStrategy::RoundRobin => {
                        run.rotate_left(rotation % run.len());
                    }
                    LoadBalanceStrategy::LeastLoaded => {
                        run.sort_by_key(|e| self.selection_count(&e.id));
                    }
                    LoadBalanceStrategy::Random => {
                        run.shuffle(&mut rand::thread_rng());
                    }
                }
            }
            start = end;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelKind;

    fn entry(id: &str, provider: &str, priority: u32) -> ModelEntry {
        ModelEntry {
            id: id.to_string(),
            provider: provider.to_string(),
            kind: ModelKind::Chat,
            context_window: 128_000,
            max_output_tokens: 4_096,
            input_cost: 1.0,
            output_cost: 2.0,
            capabilities: vec!["chat".to_string()],
            priority,
            available: true,
        }
    }

    fn ids(candidates: &[ModelEntry]) -> Vec<&str> {
        candidates.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn test_round_robin_rotates_across_calls() {
        let balancer = Balancer::new(LoadBalanceStrategy::RoundRobin);
        let base = vec![entry("a", "p1", 1), entry("b", "p2", 1), entry("c", "p3", 1)];

        let mut first = base.clone();
        balancer.order(&mut first);
        let mut second = base.clone();
        balancer.order(&mut second);
        let mut third = base.clone();
        balancer.order(&mut third);

        assert_eq!(ids(&first), vec!["a", "b", "c"]);
        assert_eq!(ids(&second), vec!["b", "c", "a"]);
        assert_eq!(ids(&third), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_priority_groups_are_never_crossed() {
        let balancer = Balancer::new(LoadBalanceStrategy::RoundRobin);
        for _ in 0..5 {
            let mut candidates = vec![
                entry("cheap-1", "p1", 1),
                entry("cheap-2", "p2", 1),
                entry("premium", "p3", 2),
            ];
            balancer.order(&mut candidates);
            // The priority-2 model always sorts last
            assert_eq!(candidates[2].id, "premium");
        }
    }

    #[test]
    fn test_least_loaded_prefers_cold_model() {
        let balancer = Balancer::new(LoadBalanceStrategy::LeastLoaded);
        balancer.note_selection("a");
        balancer.note_selection("a");
        balancer.note_selection("b");

        let mut candidates = vec![entry("a", "p1", 1), entry("b", "p2", 1), entry("c", "p3", 1)];
        balancer.order(&mut candidates);
        assert_eq!(ids(&candidates), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_random_keeps_the_same_set() {
        let balancer = Balancer::new(LoadBalanceStrategy::Random);
        let mut candidates = vec![entry("a", "p1", 1), entry("b", "p2", 1), entry("c", "p3", 1)];
        balancer.order(&mut candidates);

        let mut sorted = ids(&candidates);
        sorted.sort_unstable();
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }
}
