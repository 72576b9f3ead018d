//! Gateway core structure
//!
//! The `Gateway` is the top-level façade: it owns the template engine, the
//! conversation store and the router, and is constructed once at process
//! start and injected into callers.

use crate::conversation::{ConversationContext, ConversationStore};
use crate::error::Result;
use crate::prompts::TemplateEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vantage_llm::{
    default_catalog, GatewayConfig, Message, ModelRegistry, ModelRouter, TokenEstimator,
};

use super::types::{HealthReport, ServiceMetrics};

/// The service façade over prompt rendering, routing, conversations and
/// usage tracking
#[derive(Debug)]
pub struct Gateway {
    pub(super) router: Arc<ModelRouter>,
    pub(super) templates: TemplateEngine,
    pub(super) conversations: ConversationStore,
    pub(super) estimator: TokenEstimator,
}

impl Gateway {
    /// Build a gateway from a validated configuration.
    ///
    /// Uses the default model catalog; configuration problems (missing
    /// credential, dangling model reference, unknown provider) fail here,
    /// not on the first request.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let catalog = default_catalog();
        config.validate(&catalog)?;

        let registry = Arc::new(ModelRegistry::with_default_catalog());
        let router = Arc::new(ModelRouter::new(config, registry)?);
        info!("Gateway initialized");
        Ok(Self::with_router(router))
    }

    /// Build a gateway over a pre-built router (used by tests)
    #[must_use]
    pub fn with_router(router: Arc<ModelRouter>) -> Self {
        Self {
            router,
            templates: TemplateEngine::with_defaults(),
            conversations: ConversationStore::new(),
            estimator: TokenEstimator::new(),
        }
    }

    /// Replace the template engine
    #[must_use]
    pub fn with_templates(mut self, templates: TemplateEngine) -> Self {
        self.templates = templates;
        self
    }

    /// Replace the conversation store
    #[must_use]
    pub fn with_conversations(mut self, conversations: ConversationStore) -> Self {
        self.conversations = conversations;
        self
    }

    /// The router behind this gateway
    #[must_use]
    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    /// The template engine
    #[must_use]
    pub fn templates(&self) -> &TemplateEngine {
        &self.templates
    }

    /// Start the periodic health sweep and retry sweeper.
    ///
    /// Both tasks stop when `cancel` fires; the returned handles complete
    /// once they have shut down.
    pub fn start_background_tasks(
        &self,
        cancel: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        self.router.spawn_background_tasks(cancel)
    }

    /// Start a conversation for a user, optionally seeded with context.
    ///
    /// Returns the conversation id to pass to subsequent [`chat`] calls.
    ///
    /// [`chat`]: Gateway::chat
    pub fn create_conversation(&self, user_id: &str, initial_context: Option<&str>) -> String {
        self.conversations.create(user_id, initial_context)
    }

    /// A conversation's messages, oldest first
    pub async fn conversation_history(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.conversations.history(conversation_id).await
    }

    /// A copy of a conversation's full state
    pub async fn conversation(&self, conversation_id: &str) -> Result<ConversationContext> {
        self.conversations.snapshot(conversation_id).await
    }

    /// Drop a conversation's history
    pub async fn clear_conversation(&self, conversation_id: &str) -> Result<()> {
        self.conversations.clear(conversation_id).await
    }

    /// Aggregate usage metrics across all providers
    pub async fn metrics(&self) -> ServiceMetrics {
        let stats = self.router.tracker().stats().await;
        ServiceMetrics {
            total_requests: stats.total_requests,
            success_rate: stats.success_rate(),
            tokens_used: stats.total_input_tokens + stats.total_output_tokens,
            total_cost: stats.total_cost,
            avg_latency_ms: stats.avg_latency_ms,
            by_provider: stats.by_provider,
        }
    }

    /// Probe every configured provider and summarize overall status
    pub async fn health_check(&self) -> HealthReport {
        let probes = self.router.run_health_probe().await;
        let report = HealthReport::from_probes(probes);
        info!(status = ?report.status, "Health check complete");
        report
    }
}
