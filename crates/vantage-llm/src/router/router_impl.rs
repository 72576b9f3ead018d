//! Model router
//!
//! Selects candidate models for a request, consults the admission gate
//! before every attempt, and fails over through the candidate list until
//! one serves the request. First success wins; candidates are never raced
//! concurrently. Health checks and the retry sweep run as background tasks
//! owned by the router.

use super::balance::Balancer;
use super::config::GatewayConfig;
use crate::adapter::ProviderAdapter;
use crate::completion::{EmbeddingRequest, GenerationRequest, GenerationResponse, TokenUsage};
use crate::cost::CostTracker;
use crate::error::{Error, Result};
use crate::limits::{GateDecision, RequestGate, RetryDispatch, RetryItem, RetryPayload, RetryQueue};
use crate::providers::anthropic::{AnthropicAdapter, AnthropicConfig};
use crate::providers::gemini::{GeminiAdapter, GeminiConfig};
use crate::providers::openai::{OpenAiAdapter, OpenAiConfig};
use crate::registry::{ModelEntry, ModelKind, ModelRegistry};
use crate::token::TokenEstimator;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Routes requests across providers with failover
pub struct ModelRouter {
    config: GatewayConfig,
    registry: Arc<ModelRegistry>,
    adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    gate: RequestGate,
    tracker: Arc<CostTracker>,
    balancer: Balancer,
    retry_queue: Arc<RetryQueue>,
    estimator: TokenEstimator,
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field("config", &self.config)
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ModelRouter {
    /// Build a router with real adapters for every configured provider.
    ///
    /// An unknown provider id in the configuration is a load-time error.
    pub fn new(config: GatewayConfig, registry: Arc<ModelRegistry>) -> Result<Self> {
        let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
        for (id, settings) in &config.providers {
            let adapter: Arc<dyn ProviderAdapter> = match id.as_str() {
                "openai" => {
                    let mut cfg = OpenAiConfig::new(settings.api_key.clone())
                        .with_timeout(settings.timeout())
                        .with_requests_per_minute(settings.requests_per_minute);
                    if let Some(base_url) = &settings.base_url {
                        cfg = cfg.with_base_url(base_url.clone());
                    }
                    Arc::new(OpenAiAdapter::new(cfg))
                }
                "anthropic" => {
                    let mut cfg = AnthropicConfig::new(settings.api_key.clone())
                        .with_timeout(settings.timeout())
                        .with_requests_per_minute(settings.requests_per_minute);
                    if let Some(base_url) = &settings.base_url {
                        cfg = cfg.with_base_url(base_url.clone());
                    }
                    Arc::new(AnthropicAdapter::new(cfg))
                }
                "gemini" => {
                    let mut cfg = GeminiConfig::new(settings.api_key.clone())
                        .with_timeout(settings.timeout())
                        .with_requests_per_minute(settings.requests_per_minute);
                    if let Some(base_url) = &settings.base_url {
                        cfg = cfg.with_base_url(base_url.clone());
                    }
                    Arc::new(GeminiAdapter::new(cfg))
                }
                other => {
                    return Err(Error::Config(format!("unknown provider: {other}")));
                }
            };
            adapters.insert(id.clone(), adapter);
        }
        Ok(Self::with_adapters(config, registry, adapters))
    }

    /// Build a router over pre-built adapters (used by tests and embedders)
    #[must_use]
    pub fn with_adapters(
        config: GatewayConfig,
        registry: Arc<ModelRegistry>,
        adapters: HashMap<String, Arc<dyn ProviderAdapter>>,
    ) -> Self {
        let gate = RequestGate::new(
            config.breaker.to_config(),
            config.rate_limit_configs(),
            config.token_quotas(),
            config.flags.enable_rate_limiting,
        );
        let tracker = Arc::new(CostTracker::with_limits(config.daily_limits()));
        let balancer = Balancer::new(config.load_balancing);
        let retry_queue = Arc::new(RetryQueue::new(config.retry.to_config()));
        Self {
            config,
            registry,
            adapters,
            gate,
            tracker,
            balancer,
            retry_queue,
            estimator: TokenEstimator::new(),
        }
    }

    /// The router's configuration
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// The cost tracker fed by this router
    #[must_use]
    pub fn tracker(&self) -> &Arc<CostTracker> {
        &self.tracker
    }

    /// The model registry
    #[must_use]
    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// The admission gate
    #[must_use]
    pub fn gate(&self) -> &RequestGate {
        &self.gate
    }

    /// The retry queue
    #[must_use]
    pub fn retry_queue(&self) -> &Arc<RetryQueue> {
        &self.retry_queue
    }

    /// Candidate models for a generation request, in attempt order
    pub async fn select_candidates(&self, request: &GenerationRequest) -> Result<Vec<ModelEntry>> {
        self.candidates(
            ModelKind::Chat,
            request.provider.as_deref(),
            request.model.as_deref(),
        )
        .await
    }

    /// Route a generation request through the candidate list
    pub async fn route_generation(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.route_generation_inner(request, true).await
    }

    /// Route an embedding request through the embedding candidates
    pub async fn route_embedding(&self, request: EmbeddingRequest) -> Result<Vec<Vec<f32>>> {
        self.route_embedding_inner(request, true).await
    }

    #[instrument(skip(self, request), fields(conversation = request.conversation_id.as_deref().unwrap_or("-")))]
    async fn route_generation_inner(
        &self,
        request: GenerationRequest,
        queue_on_exhaust: bool,
    ) -> Result<GenerationResponse> {
        let candidates = self
            .candidates(
                ModelKind::Chat,
                request.provider.as_deref(),
                request.model.as_deref(),
            )
            .await?;

        let estimated_tokens = self.estimator.estimate_messages(&request.messages) as u64
            + u64::from(request.max_tokens.unwrap_or(0));

        let mut last_err: Option<Error> = None;
        let mut attempts = 0usize;
        let mut blocked_reset: Option<Duration> = None;

        for entry in &candidates {
            let key = format!("{}:{}", entry.provider, entry.id);
            match self.gate.can_make_request(&key, estimated_tokens).await {
                GateDecision::Allowed => {}
                GateDecision::BreakerOpen => {
                    debug!(key = %key, "Skipping candidate, breaker open");
                    continue;
                }
                GateDecision::WindowExhausted { reset_after } => {
                    debug!(key = %key, reset_ms = reset_after.as_millis() as u64, "Skipping candidate, window exhausted");
                    blocked_reset = Some(blocked_reset.map_or(reset_after, |d| d.max(reset_after)));
                    continue;
                }
            }

            let Some(adapter) = self.adapters.get(&entry.provider) else {
                continue;
            };

            self.gate.record_request(&key).await;
            let start = Instant::now();
            match adapter.generate(&request, &entry.id).await {
                Ok(output) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    let cost = entry.cost_for(&output.usage);
                    self.gate.record_success(&key);
                    self.gate
                        .record_tokens(&key, u64::from(output.usage.total_tokens));
                    self.balancer.note_selection(&entry.id);
                    self.tracker
                        .track(
                            &entry.provider,
                            &entry.id,
                            output.usage.input_tokens,
                            output.usage.output_tokens,
                            cost,
                            latency_ms,
                            true,
                            None,
                        )
                        .await;
                    info!(
                        provider = %entry.provider,
                        model = %entry.id,
                        latency_ms,
                        cost,
                        "Request served"
                    );
                    return Ok(GenerationResponse::from_output(
                        output,
                        &entry.provider,
                        cost,
                        latency_ms,
                    ));
                }
                Err(e) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    self.gate.record_failure(&key);
                    self.tracker
                        .track(
                            &entry.provider,
                            &entry.id,
                            0,
                            0,
                            0.0,
                            latency_ms,
                            false,
                            Some(e.code()),
                        )
                        .await;
                    attempts += 1;
                    warn!(
                        provider = %entry.provider,
                        model = %entry.id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Candidate failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(last) => {
                if queue_on_exhaust && last.is_retryable() && self.config.flags.enable_fallbacks {
                    if let Some(entry) = candidates.last() {
                        self.retry_queue.push(
                            &entry.provider,
                            &entry.id,
                            RetryPayload::Generation(request),
                            1,
                        );
                    }
                }
                Err(Error::Exhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            // Nothing was attempted: every candidate was blocked by a
            // breaker or an exhausted window.
            None => Err(Error::RateLimitExceeded {
                retry_after: blocked_reset,
            }),
        }
    }

    #[instrument(skip(self, request), fields(texts = request.texts.len()))]
    async fn route_embedding_inner(
        &self,
        request: EmbeddingRequest,
        queue_on_exhaust: bool,
    ) -> Result<Vec<Vec<f32>>> {
        let candidates = self
            .candidates(ModelKind::Embedding, request.provider.as_deref(), None)
            .await?;

        let estimated_tokens: u64 = request
            .texts
            .iter()
            .map(|t| self.estimator.estimate_text(t) as u64)
            .sum();

        let mut last_err: Option<Error> = None;
        let mut attempts = 0usize;
        let mut blocked_reset: Option<Duration> = None;

        for entry in &candidates {
            let key = format!("{}:{}", entry.provider, entry.id);
            match self.gate.can_make_request(&key, estimated_tokens).await {
                GateDecision::Allowed => {}
                GateDecision::BreakerOpen => {
                    debug!(key = %key, "Skipping candidate, breaker open");
                    continue;
                }
                GateDecision::WindowExhausted { reset_after } => {
                    blocked_reset = Some(blocked_reset.map_or(reset_after, |d| d.max(reset_after)));
                    continue;
                }
            }

            let Some(adapter) = self.adapters.get(&entry.provider) else {
                continue;
            };

            self.gate.record_request(&key).await;
            let start = Instant::now();
            match adapter.embed(&request.texts, &entry.id).await {
                Ok(vectors) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    let usage = TokenUsage::new(estimated_tokens.min(u64::from(u32::MAX)) as u32, 0);
                    let cost = entry.cost_for(&usage);
                    self.gate.record_success(&key);
                    self.gate.record_tokens(&key, estimated_tokens);
                    self.balancer.note_selection(&entry.id);
                    self.tracker
                        .track(
                            &entry.provider,
                            &entry.id,
                            usage.input_tokens,
                            0,
                            cost,
                            latency_ms,
                            true,
                            None,
                        )
                        .await;
                    return Ok(vectors);
                }
                Err(e) => {
                    let latency_ms = start.elapsed().as_millis() as u64;
                    self.gate.record_failure(&key);
                    self.tracker
                        .track(
                            &entry.provider,
                            &entry.id,
                            0,
                            0,
                            0.0,
                            latency_ms,
                            false,
                            Some(e.code()),
                        )
                        .await;
                    attempts += 1;
                    warn!(
                        provider = %entry.provider,
                        model = %entry.id,
                        error = %e,
                        retryable = e.is_retryable(),
                        "Embedding candidate failed, trying next"
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(last) => {
                if queue_on_exhaust && last.is_retryable() && self.config.flags.enable_fallbacks {
                    if let Some(entry) = candidates.last() {
                        self.retry_queue.push(
                            &entry.provider,
                            &entry.id,
                            RetryPayload::Embedding(request),
                            1,
                        );
                    }
                }
                Err(Error::Exhausted {
                    attempts,
                    last: Box::new(last),
                })
            }
            None => Err(Error::RateLimitExceeded {
                retry_after: blocked_reset,
            }),
        }
    }

    // Candidate selection: filter by kind, override, availability and
    // configured provider; the configured default/fallback chain leads,
    // then the rest in priority order with the balance tie-break.
    async fn candidates(
        &self,
        kind: ModelKind,
        provider_override: Option<&str>,
        model_override: Option<&str>,
    ) -> Result<Vec<ModelEntry>> {
        if let Some(model_id) = model_override {
            return self.explicit_candidate(kind, provider_override, model_id).await;
        }

        let mut eligible: Vec<ModelEntry> = self
            .registry
            .models_for(kind)
            .await
            .into_iter()
            .filter(|e| e.available)
            .filter(|e| self.adapters.contains_key(&e.provider))
            .filter(|e| provider_override.is_none_or(|p| e.provider == p))
            .collect();

        if eligible.is_empty() {
            return Err(Error::NoEligibleModel(match provider_override {
                Some(p) => format!("no available model for provider {p}"),
                None => "no available model matches the request".to_string(),
            }));
        }

        let mut ordered = Vec::with_capacity(eligible.len());
        if kind == ModelKind::Chat && provider_override.is_none() {
            let chain = std::iter::once(&self.config.default_model)
                .chain(self.config.fallback_models.iter());
            for id in chain {
                if let Some(pos) = eligible.iter().position(|e| &e.id == id) {
                    ordered.push(eligible.remove(pos));
                }
            }
        }

        if self.config.flags.enable_load_balancing {
            self.balancer.order(&mut eligible);
        }
        ordered.extend(eligible);

        if !self.config.flags.enable_fallbacks {
            ordered.truncate(1);
        }
        Ok(ordered)
    }

    // An explicit model override must resolve exactly, without touching
    // the network, or the request fails with NoEligibleModel.
    async fn explicit_candidate(
        &self,
        kind: ModelKind,
        provider_override: Option<&str>,
        model_id: &str,
    ) -> Result<Vec<ModelEntry>> {
        let entry = self
            .registry
            .get(model_id)
            .await
            .ok_or_else(|| Error::NoEligibleModel(format!("unknown model: {model_id}")))?;
        if entry.kind != kind {
            return Err(Error::NoEligibleModel(format!(
                "{model_id} does not serve this request kind"
            )));
        }
        if !entry.available {
            return Err(Error::NoEligibleModel(format!(
                "{model_id} is currently unavailable"
            )));
        }
        if !self.adapters.contains_key(&entry.provider) {
            return Err(Error::NoEligibleModel(format!(
                "provider {} is not configured",
                entry.provider
            )));
        }
        if let Some(provider) = provider_override {
            if entry.provider != provider {
                return Err(Error::NoEligibleModel(format!(
                    "{model_id} is not served by provider {provider}"
                )));
            }
        }
        Ok(vec![entry])
    }

    /// Probe every configured provider and flip registry availability.
    ///
    /// Returns per-provider reachability.
    pub async fn run_health_probe(&self) -> HashMap<String, bool> {
        let mut results = HashMap::new();
        for (id, adapter) in &self.adapters {
            let reachable = adapter.test_connection().await;
            self.registry.set_provider_available(id, reachable).await;
            if !reachable {
                warn!(provider = %id, "Provider failed health check");
            }
            results.insert(id.clone(), reachable);
        }
        results
    }

    /// Spawn the periodic health sweep and the retry sweeper.
    ///
    /// Both stop when `cancel` fires.
    pub fn spawn_background_tasks(
        self: &Arc<Self>,
        cancel: CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::new();

        if self.config.flags.enable_health_checks {
            let router = Arc::clone(self);
            let health_cancel = cancel.clone();
            let interval = Duration::from_secs(self.config.health_check_interval_secs);
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            let results = router.run_health_probe().await;
                            let reachable = results.values().filter(|r| **r).count();
                            debug!(reachable, total = results.len(), "Health sweep complete");
                        }
                        _ = health_cancel.cancelled() => {
                            info!("Health check sweep shutting down");
                            break;
                        }
                    }
                }
            }));
        }

        let router = Arc::clone(self);
        let dispatch: RetryDispatch = Arc::new(move |item: RetryItem| {
            let router = Arc::clone(&router);
            Box::pin(async move {
                match item.payload {
                    RetryPayload::Generation(request) => router
                        .route_generation_inner(request, false)
                        .await
                        .map(|_| ()),
                    RetryPayload::Embedding(request) => router
                        .route_embedding_inner(request, false)
                        .await
                        .map(|_| ()),
                }
            })
        });
        let sweep_interval = Duration::from_millis(self.config.retry.base_delay_ms);
        handles.push(
            self.retry_queue
                .spawn_sweeper(sweep_interval, dispatch, cancel),
        );

        handles
    }
}
