//! Model registry
//!
//! Catalog of known models: which provider serves them, what they can do,
//! how much they cost and whether they are currently available. The router
//! only ever selects a model whose availability flag is set and whose
//! provider is configured.

use crate::completion::TokenUsage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

// ============================================================================
// Pricing constants (per 1M tokens, USD)
// ============================================================================

/// GPT-4o-mini input cost per 1M tokens
pub const GPT4O_MINI_INPUT_COST: f64 = 0.15;
/// GPT-4o-mini output cost per 1M tokens
pub const GPT4O_MINI_OUTPUT_COST: f64 = 0.60;
/// GPT-4o input cost per 1M tokens
pub const GPT4O_INPUT_COST: f64 = 2.50;
/// GPT-4o output cost per 1M tokens
pub const GPT4O_OUTPUT_COST: f64 = 10.00;
/// text-embedding-3-small cost per 1M input tokens
pub const OPENAI_EMBEDDING_INPUT_COST: f64 = 0.02;

/// Claude Haiku 4.5 input cost per 1M tokens
pub const CLAUDE_HAIKU_INPUT_COST: f64 = 1.00;
/// Claude Haiku 4.5 output cost per 1M tokens
pub const CLAUDE_HAIKU_OUTPUT_COST: f64 = 5.00;
/// Claude Sonnet 4.5 input cost per 1M tokens
pub const CLAUDE_SONNET_INPUT_COST: f64 = 3.00;
/// Claude Sonnet 4.5 output cost per 1M tokens
pub const CLAUDE_SONNET_OUTPUT_COST: f64 = 15.00;

/// Gemini 2.5 Flash input cost per 1M tokens
pub const GEMINI_FLASH_INPUT_COST: f64 = 0.075;
/// Gemini 2.5 Flash output cost per 1M tokens
pub const GEMINI_FLASH_OUTPUT_COST: f64 = 0.60;
/// Gemini 2.5 Pro input cost per 1M tokens
pub const GEMINI_PRO_INPUT_COST: f64 = 1.25;
/// Gemini 2.5 Pro output cost per 1M tokens
pub const GEMINI_PRO_OUTPUT_COST: f64 = 15.00;
/// text-embedding-004 cost per 1M input tokens
pub const GEMINI_EMBEDDING_INPUT_COST: f64 = 0.01;

// ============================================================================
// Types
// ============================================================================

/// What a model can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Chat/completion model
    Chat,
    /// Embedding model
    Embedding,
}

/// A catalog entry for one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Model id (e.g. "gpt-4o-mini")
    pub id: String,
    /// Provider that serves it
    pub provider: String,
    /// What the model serves
    pub kind: ModelKind,
    /// Context window in tokens
    pub context_window: u32,
    /// Maximum output tokens
    pub max_output_tokens: u32,
    /// Input cost per 1M tokens (USD)
    pub input_cost: f64,
    /// Output cost per 1M tokens (USD)
    pub output_cost: f64,
    /// Capability tags (e.g. "analysis", "fast")
    pub capabilities: Vec<String>,
    /// Selection priority, lower = preferred
    pub priority: u32,
    /// Whether the model is currently available
    pub available: bool,
}

impl ModelEntry {
    /// Cost in USD for the given usage at this model's rates
    #[must_use]
    pub fn cost_for(&self, usage: &TokenUsage) -> f64 {
        (f64::from(usage.input_tokens) * self.input_cost
            + f64::from(usage.output_tokens) * self.output_cost)
            / 1_000_000.0
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Mutable catalog of known models
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: RwLock<HashMap<String, ModelEntry>>,
}

impl ModelRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry populated with the default catalog
    #[must_use]
    pub fn with_default_catalog() -> Self {
        let mut entries = HashMap::new();
        for entry in default_catalog() {
            entries.insert(entry.id.clone(), entry);
        }
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Register or replace a model entry
    pub async fn register(&self, entry: ModelEntry) {
        debug!(model = %entry.id, provider = %entry.provider, "Registering model");
        self.entries.write().await.insert(entry.id.clone(), entry);
    }

    /// Look up a model by id
    pub async fn get(&self, id: &str) -> Option<ModelEntry> {
        self.entries.read().await.get(id).cloned()
    }

    /// Flip a model's availability flag
    pub async fn set_available(&self, id: &str, available: bool) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            if entry.available != available {
                debug!(model = %id, available, "Model availability changed");
            }
            entry.available = available;
        }
    }

    /// Flip availability for every model of one provider
    pub async fn set_provider_available(&self, provider: &str, available: bool) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut().filter(|e| e.provider == provider) {
            entry.available = available;
        }
    }

    /// All models of the given kind, in priority order
    pub async fn models_for(&self, kind: ModelKind) -> Vec<ModelEntry> {
        let entries = self.entries.read().await;
        let mut models: Vec<ModelEntry> = entries
            .values()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect();
        models.sort_by(|a, b| a.priority.cmp(&b.priority).then(a.id.cmp(&b.id)));
        models
    }

    /// All registered models
    pub async fn all(&self) -> Vec<ModelEntry> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Number of registered models
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// The default model catalog for the three provider families
#[must_use]
pub fn default_catalog() -> Vec<ModelEntry> {
    fn chat(
        id: &str,
        provider: &str,
        context_window: u32,
        max_output_tokens: u32,
        input_cost: f64,
        output_cost: f64,
        capabilities: &[&str],
        priority: u32,
    ) -> ModelEntry {
        ModelEntry {
            id: id.to_string(),
            provider: provider.to_string(),
            kind: ModelKind::Chat,
            context_window,
            max_output_tokens,
            input_cost,
            output_cost,
            capabilities: capabilities.iter().map(|c| (*c).to_string()).collect(),
            priority,
            available: true,
        }
    }

    fn embedding(id: &str, provider: &str, context_window: u32, input_cost: f64, priority: u32) -> ModelEntry {
        ModelEntry {
            id: id.to_string(),
            provider: provider.to_string(),
            kind: ModelKind::Embedding,
            context_window,
            max_output_tokens: 0,
            input_cost,
            output_cost: 0.0,
            capabilities: vec!["embedding".to_string()],
            priority,
            available: true,
        }
    }

    vec![
        chat(
            "gpt-4o-mini",
            "openai",
            128_000,
            16_384,
            GPT4O_MINI_INPUT_COST,
            GPT4O_MINI_OUTPUT_COST,
            &["chat", "fast"],
            1,
        ),
        chat(
            "gpt-4o",
            "openai",
            128_000,
            16_384,
            GPT4O_INPUT_COST,
            GPT4O_OUTPUT_COST,
            &["chat", "analysis"],
            2,
        ),
        chat(
            "claude-haiku-4-5",
            "anthropic",
            200_000,
            8_192,
            CLAUDE_HAIKU_INPUT_COST,
            CLAUDE_HAIKU_OUTPUT_COST,
            &["chat", "fast"],
            1,
        ),
        chat(
            "claude-sonnet-4-5",
            "anthropic",
            200_000,
            64_000,
            CLAUDE_SONNET_INPUT_COST,
            CLAUDE_SONNET_OUTPUT_COST,
            &["chat", "analysis"],
            2,
        ),
        chat(
            "gemini-2.5-flash",
            "gemini",
            1_000_000,
            8_192,
            GEMINI_FLASH_INPUT_COST,
            GEMINI_FLASH_OUTPUT_COST,
            &["chat", "fast"],
            1,
        ),
        chat(
            "gemini-2.5-pro",
            "gemini",
            1_000_000,
            65_536,
            GEMINI_PRO_INPUT_COST,
            GEMINI_PRO_OUTPUT_COST,
            &["chat", "analysis"],
            2,
        ),
        embedding(
            "text-embedding-3-small",
            "openai",
            8_191,
            OPENAI_EMBEDDING_INPUT_COST,
            1,
        ),
        embedding(
            "text-embedding-004",
            "gemini",
            2_048,
            GEMINI_EMBEDDING_INPUT_COST,
            2,
        ),
    ]
}
