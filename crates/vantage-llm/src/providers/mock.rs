//! Mock provider adapter for testing
//!
//! Returns queued outcomes in order, then a default success. Tracks how
//! many generate/embed calls reached it so tests can assert that blocked
//! requests never touched the network path.

use crate::adapter::ProviderAdapter;
use crate::completion::{GenerationRequest, ProviderOutput, TokenUsage};
use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// A scriptable adapter that replays queued outcomes
pub struct MockAdapter {
    id: String,
    outcomes: Arc<Mutex<VecDeque<Result<ProviderOutput>>>>,
    calls: AtomicU32,
    embed_calls: AtomicU32,
    reachable: AtomicBool,
    supports_embeddings: bool,
}

impl MockAdapter {
    /// Create a mock for the given provider id
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            outcomes: Arc::new(Mutex::new(VecDeque::new())),
            calls: AtomicU32::new(0),
            embed_calls: AtomicU32::new(0),
            reachable: AtomicBool::new(true),
            supports_embeddings: true,
        }
    }

    /// Disable the embeddings surface
    #[must_use]
    pub fn without_embeddings(mut self) -> Self {
        self.supports_embeddings = false;
        self
    }

    /// Queue a successful output with the given content
    pub fn push_output(&self, content: &str, model: &str) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Ok(ProviderOutput {
                content: content.to_string(),
                usage: TokenUsage::new(10, 5),
                finish_reason: Some("stop".to_string()),
                model: model.to_string(),
            }));
    }

    /// Queue a failure
    pub fn push_error(&self, error: Error) {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(Err(error));
    }

    /// Queue `n` server errors
    pub fn push_server_errors(&self, n: usize) {
        for _ in 0..n {
            self.push_error(Error::Server("backend down".to_string()));
        }
    }

    /// Script connectivity for `test_connection`
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Number of generate calls that reached this adapter
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of embed calls that reached this adapter
    #[must_use]
    pub fn embed_calls(&self) -> u32 {
        self.embed_calls.load(Ordering::SeqCst)
    }

    fn next_outcome(&self, model: &str) -> Result<ProviderOutput> {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        outcomes.pop_front().unwrap_or_else(|| {
            Ok(ProviderOutput {
                content: "mock response".to_string(),
                usage: TokenUsage::new(10, 5),
                finish_reason: Some("stop".to_string()),
                model: model.to_string(),
            })
        })
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MockAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports_embeddings(&self) -> bool {
        self.supports_embeddings
    }

    async fn generate(&self, _request: &GenerationRequest, model: &str) -> Result<ProviderOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next_outcome(model)
    }

    async fn embed(&self, texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_outcome("embedding") {
            Ok(_) => Ok(texts.iter().map(|_| vec![0.1, 0.2, 0.3]).collect()),
            Err(e) => Err(e),
        }
    }

    async fn test_connection(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}
