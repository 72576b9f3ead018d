//! Generation request and response types
//!
//! A [`GenerationRequest`] is created per call and carries everything the
//! router needs to pick a model. A [`GenerationResponse`] is stamped by the
//! router with the model that actually served the request, its cost and its
//! wall-clock latency, and is immutable once produced.

use crate::message::Message;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Token usage information
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub input_tokens: u32,
    /// Tokens generated
    pub output_tokens: u32,
    /// Total tokens
    pub total_tokens: u32,
}

impl TokenUsage {
    /// Create a usage record from input/output counts
    #[must_use]
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// A generation request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Rendered prompt messages
    pub messages: Vec<Message>,
    /// Explicit provider override
    pub provider: Option<String>,
    /// Explicit model override
    pub model: Option<String>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Conversation this request belongs to
    pub conversation_id: Option<String>,
    /// Caller metadata (user id, intent, ...)
    pub metadata: HashMap<String, String>,
}

impl GenerationRequest {
    /// Create a request from prompt messages
    #[must_use]
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    /// Add a message
    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    /// Pin the request to a provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Pin the request to a model
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Attach a conversation id
    #[must_use]
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// Attach a metadata entry
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// An embedding request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Texts to embed
    pub texts: Vec<String>,
    /// Explicit provider override
    pub provider: Option<String>,
}

impl EmbeddingRequest {
    /// Create a request for the given texts
    #[must_use]
    pub fn new(texts: Vec<String>) -> Self {
        Self {
            texts,
            provider: None,
        }
    }

    /// Pin the request to a provider
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// Raw adapter result, before the router stamps cost and latency
#[derive(Debug, Clone)]
pub struct ProviderOutput {
    /// Generated content
    pub content: String,
    /// Token usage reported by the backend
    pub usage: TokenUsage,
    /// Finish reason, if reported
    pub finish_reason: Option<String>,
    /// Model that served the request, as reported by the backend
    pub model: String,
}

/// A completed generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique request id
    pub request_id: String,
    /// Generated content
    pub content: String,
    /// Provider that served the request
    pub provider: String,
    /// Model that actually served the request (after any failover)
    pub model: String,
    /// Token usage
    pub usage: TokenUsage,
    /// Cost in USD for the serving model's rates
    pub cost: f64,
    /// Wall-clock latency in milliseconds
    pub latency_ms: u64,
    /// When the response was produced
    pub created_at: DateTime<Utc>,
}

impl GenerationResponse {
    /// Stamp an adapter output into a final response
    #[must_use]
    pub fn from_output(
        output: ProviderOutput,
        provider: impl Into<String>,
        cost: f64,
        latency_ms: u64,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            content: output.content,
            provider: provider.into(),
            model: output.model,
            usage: output.usage,
            cost,
            latency_ms,
            created_at: Utc::now(),
        }
    }
}
