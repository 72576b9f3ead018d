//! Vantage LLM - Provider abstraction and routing
//!
//! This crate is the request gateway of the Vantage advisor:
//! - Adapters: uniform interface to the OpenAI, Anthropic and Gemini REST backends
//! - Router: candidate selection, load balancing and failover across providers
//! - Limits: sliding-window rate limiting, circuit breaking and delayed retries
//! - Cost: per-request usage records, aggregate statistics and daily budgets
//! - Registry: the model catalog with pricing, priorities and availability

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod completion;
pub mod cost;
pub mod error;
pub mod limits;
pub mod message;
pub mod providers;
pub mod registry;
pub mod router;
pub mod token;

pub use adapter::ProviderAdapter;
pub use completion::{
    EmbeddingRequest, GenerationRequest, GenerationResponse, ProviderOutput, TokenUsage,
};
pub use cost::{CostTracker, DailyLimit, ModelStats, ProviderStats, UsageRecord, UsageStats};
pub use error::{Error, Result};
pub use limits::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, GateDecision, RateLimitConfig,
    RateLimiter, RequestGate, RetryConfig, RetryItem, RetryPayload, RetryQueue,
};
pub use message::{Message, MessageRole};
pub use registry::{default_catalog, ModelEntry, ModelKind, ModelRegistry};
pub use router::{
    BreakerSettings, FeatureFlags, GatewayConfig, GatewayConfigPatch, LoadBalanceStrategy,
    ModelRouter, ProviderSettings, RetrySettings,
};
pub use token::{estimate_tokens, TokenEstimator};

// Re-export adapter types at the crate root
pub use providers::anthropic::{AnthropicAdapter, AnthropicConfig};
pub use providers::gemini::{GeminiAdapter, GeminiConfig};
pub use providers::mock::MockAdapter;
pub use providers::openai::{OpenAiAdapter, OpenAiConfig};
