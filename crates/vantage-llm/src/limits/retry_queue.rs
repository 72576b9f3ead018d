//! Delayed retry of transient failures
//!
//! Retryable failures that exhaust all candidates land here as small
//! serializable records, not captured closures; a background sweep pops due
//! items and re-dispatches them through a function looked up by request
//! kind. Delays grow exponentially with a jitter cap of 10%.

use crate::completion::{EmbeddingRequest, GenerationRequest};
use crate::error::Result;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Retry behavior configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts before an item is dropped
    pub max_retries: u32,
    /// Initial delay
    pub base_delay: Duration,
    /// Delay ceiling
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Delay before the given attempt (1-based): exponential with ceiling,
    /// plus up to 10% jitter.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let base = self
            .base_delay
            .as_millis()
            .saturating_mul(1u128 << exp)
            .min(self.max_delay.as_millis()) as u64;
        Duration::from_millis(base + jitter(base / 10))
    }
}

/// Simple pseudo-random jitter (avoids pulling randomness into the hot path)
fn jitter(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    nanos % max
}

/// The request held by a retry item
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RetryPayload {
    /// A generation request
    Generation(GenerationRequest),
    /// An embedding request
    Embedding(EmbeddingRequest),
}

impl RetryPayload {
    /// Stable kind tag, used to look up the re-dispatch function
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Generation(_) => "generation",
            Self::Embedding(_) => "embedding",
        }
    }
}

/// A queued retry: plain data, safe to persist or inspect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryItem {
    /// Provider of the last failed attempt
    pub provider: String,
    /// Model of the last failed attempt
    pub model: String,
    /// The request to re-execute
    pub payload: RetryPayload,
    /// How many delayed attempts have been made
    pub attempt: u32,
    /// When the item becomes due
    pub next_retry_at: DateTime<Utc>,
}

/// Function that re-executes a due retry item
pub type RetryDispatch = Arc<dyn Fn(RetryItem) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Queue of pending retries
pub struct RetryQueue {
    items: Mutex<Vec<RetryItem>>,
    config: RetryConfig,
}

impl Default for RetryQueue {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryQueue {
    /// Create a queue with the given retry behavior
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            config,
        }
    }

    /// The queue's retry configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Enqueue a failed request for delayed re-execution.
    ///
    /// `attempt` is the attempt number about to be made; its backoff sets
    /// the due time.
    pub fn push(&self, provider: &str, model: &str, payload: RetryPayload, attempt: u32) {
        let delay = self.config.backoff(attempt);
        let item = RetryItem {
            provider: provider.to_string(),
            model: model.to_string(),
            payload,
            attempt,
            next_retry_at: Utc::now()
                + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero()),
        };
        debug!(
            provider,
            model,
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Queued request for delayed retry"
        );
        self.items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(item);
    }

    /// Remove and return every item that is due
    pub fn pop_due(&self, now: DateTime<Utc>) -> Vec<RetryItem> {
        let mut items = self.items.lock().unwrap_or_else(|e| e.into_inner());
        let (due, pending): (Vec<_>, Vec<_>) =
            items.drain(..).partition(|item| item.next_retry_at <= now);
        *items = pending;
        due
    }

    /// Number of queued items
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn the background sweep: pops due items on each tick and
    /// re-dispatches them, re-queueing retryable failures until the attempt
    /// budget runs out. Stops when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        dispatch: RetryDispatch,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        queue.sweep(&dispatch).await;
                    }
                    _ = cancel.cancelled() => {
                        info!("Retry sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }

    async fn sweep(&self, dispatch: &RetryDispatch) {
        let due = self.pop_due(Utc::now());
        for item in due {
            let attempt = item.attempt;
            let provider = item.provider.clone();
            let model = item.model.clone();
            let payload = item.payload.clone();

            match dispatch(item).await {
                Ok(()) => {
                    debug!(provider = %provider, model = %model, attempt, "Delayed retry succeeded");
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    self.push(&provider, &model, payload, attempt + 1);
                }
                Err(e) => {
                    warn!(
                        provider = %provider,
                        model = %model,
                        attempt,
                        error = %e,
                        "Dropping request after exhausting delayed retries"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::message::Message;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn generation_payload() -> RetryPayload {
        RetryPayload::Generation(GenerationRequest::new(vec![Message::user("hello")]))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        };

        // Jitter adds at most 10%
        let d1 = config.backoff(1);
        assert!(d1 >= Duration::from_secs(1) && d1 <= Duration::from_millis(1100));

        let d3 = config.backoff(3);
        assert!(d3 >= Duration::from_secs(4) && d3 <= Duration::from_millis(4400));

        let d10 = config.backoff(10);
        assert!(d10 >= Duration::from_secs(30) && d10 <= Duration::from_millis(33_000));
    }

    #[test]
    fn test_pop_due_respects_next_retry_at() {
        let queue = RetryQueue::default();
        queue.push("openai", "gpt-4o", generation_payload(), 1);
        assert_eq!(queue.len(), 1);

        // Not due yet: backoff is at least 1s
        assert!(queue.pop_due(Utc::now()).is_empty());
        assert_eq!(queue.len(), 1);

        // Due once the clock passes the retry time
        let later = Utc::now() + chrono::Duration::seconds(120);
        let due = queue.pop_due(later);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].provider, "openai");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_payload_kind_tags() {
        assert_eq!(generation_payload().kind(), "generation");
        let embed = RetryPayload::Embedding(EmbeddingRequest::new(vec!["x".into()]));
        assert_eq!(embed.kind(), "embedding");
    }

    #[test]
    fn test_item_round_trips_through_serde() {
        let queue = RetryQueue::default();
        queue.push("gemini", "gemini-2.5-flash", generation_payload(), 2);
        let item = queue
            .pop_due(Utc::now() + chrono::Duration::seconds(600))
            .pop()
            .unwrap();

        let json = serde_json::to_string(&item).unwrap();
        let back: RetryItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.provider, "gemini");
        assert_eq!(back.attempt, 2);
        assert_eq!(back.payload.kind(), "generation");
    }

    #[tokio::test]
    async fn test_sweep_requeues_retryable_failures_up_to_max() {
        let queue = Arc::new(RetryQueue::new(RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }));
        queue.push("openai", "gpt-4o", generation_payload(), 1);

        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = Arc::clone(&calls);
        let dispatch: RetryDispatch = Arc::new(move |_item| {
            let calls = Arc::clone(&calls_clone);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Network("still down".into()))
            })
        });

        // First sweep: attempt 1 fails, requeued as attempt 2
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.sweep(&dispatch).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);

        // Second sweep: attempt 2 fails at the budget, dropped
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.sweep(&dispatch).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_sweep_drops_non_retryable_immediately() {
        let queue = Arc::new(RetryQueue::new(RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }));
        queue.push("openai", "gpt-4o", generation_payload(), 1);

        let dispatch: RetryDispatch = Arc::new(|_item| {
            Box::pin(async { Err(Error::Authentication("bad key".into())) })
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.sweep(&dispatch).await;
        assert!(queue.is_empty());
    }
}
