//! Tests for router module

use super::*;
use crate::completion::{EmbeddingRequest, GenerationRequest};
use crate::error::Error;
use crate::limits::CircuitState;
use crate::message::Message;
use crate::providers::mock::MockAdapter;
use crate::registry::{ModelEntry, ModelKind, ModelRegistry};
use std::collections::HashMap;
use std::sync::Arc;

fn chat_entry(id: &str, provider: &str, priority: u32) -> ModelEntry {
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

fn embed_entry(id: &str, provider: &str, priority: u32) -> ModelEntry {
    ModelEntry {
        kind: ModelKind::Embedding,
        max_output_tokens: 0,
        output_cost: 0.0,
        ..chat_entry(id, provider, priority)
    }
}

async fn registry_with(entries: Vec<ModelEntry>) -> Arc<ModelRegistry> {
    let registry = Arc::new(ModelRegistry::new());
    for entry in entries {
        registry.register(entry).await;
    }
    registry
}

fn config_for(providers: &[&str]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for p in providers {
        config
            .providers
            .insert((*p).to_string(), ProviderSettings::new(format!("sk-{p}-test-key")));
    }
    config
}

fn request() -> GenerationRequest {
    GenerationRequest::new(vec![Message::user("hello")])
}

struct TwoProviders {
    router: Arc<ModelRouter>,
    alpha: Arc<MockAdapter>,
    beta: Arc<MockAdapter>,
}

async fn two_provider_router(config: GatewayConfig) -> TwoProviders {
    let registry = registry_with(vec![
        chat_entry("alpha-chat", "alpha", 1),
        chat_entry("beta-chat", "beta", 2),
    ])
    .await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    let beta = Arc::new(MockAdapter::new("beta"));
    let mut adapters: HashMap<String, Arc<dyn crate::adapter::ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    adapters.insert("beta".to_string(), beta.clone());
    TwoProviders {
        router: Arc::new(ModelRouter::with_adapters(config, registry, adapters)),
        alpha,
        beta,
    }
}

#[tokio::test]
async fn test_failover_to_next_candidate() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    fixture.alpha.push_error(Error::Server("backend down".into()));

    let response = fixture.router.route_generation(request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(response.model, "beta-chat");
    assert_eq!(fixture.alpha.calls(), 1);
    assert_eq!(fixture.beta.calls(), 1);

    // The broken candidate is recorded as exactly one failure
    let stats = fixture.router.tracker().stats().await;
    assert_eq!(stats.by_provider["alpha"].failure_count, 1);
    assert_eq!(stats.by_provider["beta"].failure_count, 0);
    assert_eq!(stats.total_requests, 2);
}

#[tokio::test]
async fn test_non_retryable_error_still_advances() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    fixture
        .alpha
        .push_error(Error::Authentication("bad key".into()));

    // A broken API key on one provider does not forbid trying another
    let response = fixture.router.route_generation(request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    // But the non-retryable failure is never queued for delayed retry
    assert!(fixture.router.retry_queue().is_empty());
}

#[tokio::test]
async fn test_explicit_unavailable_model_makes_no_network_call() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    fixture
        .router
        .registry()
        .set_available("alpha-chat", false)
        .await;

    let err = fixture
        .router
        .route_generation(request().with_model("alpha-chat"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoEligibleModel(_)));
    assert_eq!(fixture.alpha.calls(), 0);
    assert_eq!(fixture.beta.calls(), 0);
}

#[tokio::test]
async fn test_explicit_unknown_model_rejected() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    let err = fixture
        .router
        .route_generation(request().with_model("no-such-model"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NoEligibleModel(_)));
}

#[tokio::test]
async fn test_provider_override_is_respected() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    let response = fixture
        .router
        .route_generation(request().with_provider("beta"))
        .await
        .unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(fixture.alpha.calls(), 0);
}

#[tokio::test]
async fn test_breaker_opens_and_blocks_after_five_failures() {
    let registry = registry_with(vec![chat_entry("alpha-chat", "alpha", 1)]).await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    alpha.push_server_errors(5);
    let mut adapters: HashMap<String, Arc<dyn crate::adapter::ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    let router = ModelRouter::with_adapters(config_for(&["alpha"]), registry, adapters);

    for _ in 0..5 {
        let err = router.route_generation(request()).await.unwrap_err();
        assert!(matches!(err, Error::Exhausted { .. }));
    }
    assert_eq!(
        router.gate().breaker_state("alpha:alpha-chat"),
        CircuitState::Open
    );

    // While open, no request reaches the adapter
    let err = router.route_generation(request()).await.unwrap_err();
    assert!(matches!(err, Error::RateLimitExceeded { .. }));
    assert_eq!(alpha.calls(), 5);
}

#[tokio::test]
async fn test_window_cap_blocks_before_adapter() {
    let mut config = config_for(&["alpha"]);
    config
        .providers
        .get_mut("alpha")
        .unwrap()
        .requests_per_minute = 2;
    let registry = registry_with(vec![chat_entry("alpha-chat", "alpha", 1)]).await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    let mut adapters: HashMap<String, Arc<dyn crate::adapter::ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    let router = ModelRouter::with_adapters(config, registry, adapters);

    assert!(router.route_generation(request()).await.is_ok());
    assert!(router.route_generation(request()).await.is_ok());

    let err = router.route_generation(request()).await.unwrap_err();
    match err {
        Error::RateLimitExceeded { retry_after } => assert!(retry_after.is_some()),
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(alpha.calls(), 2);
}

#[tokio::test]
async fn test_response_cost_matches_serving_model_rates() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    let response = fixture.router.route_generation(request()).await.unwrap();

    // Mock usage is 10 input / 5 output at 1.0 / 2.0 per 1M tokens
    let expected = (10.0 * 1.0 + 5.0 * 2.0) / 1_000_000.0;
    assert!((response.cost - expected).abs() < 1e-12);
    assert_eq!(response.usage.total_tokens, 15);
}

#[tokio::test]
async fn test_round_robin_alternates_equal_priority() {
    let mut config = config_for(&["alpha", "beta"]);
    config.load_balancing = LoadBalanceStrategy::RoundRobin;
    let registry = registry_with(vec![
        chat_entry("alpha-chat", "alpha", 1),
        chat_entry("beta-chat", "beta", 1),
    ])
    .await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    let beta = Arc::new(MockAdapter::new("beta"));
    let mut adapters: HashMap<String, Arc<dyn crate::adapter::ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    adapters.insert("beta".to_string(), beta.clone());
    let router = ModelRouter::with_adapters(config, registry, adapters);

    for _ in 0..4 {
        router.route_generation(request()).await.unwrap();
    }
    assert_eq!(alpha.calls(), 2);
    assert_eq!(beta.calls(), 2);
}

#[tokio::test]
async fn test_fallbacks_disabled_stops_after_first_candidate() {
    let mut config = config_for(&["alpha", "beta"]);
    config.flags.enable_fallbacks = false;
    let fixture = two_provider_router(config).await;
    fixture.alpha.push_error(Error::Server("down".into()));

    let err = fixture.router.route_generation(request()).await.unwrap_err();
    assert!(matches!(err, Error::Exhausted { attempts: 1, .. }));
    assert_eq!(fixture.beta.calls(), 0);
}

#[tokio::test]
async fn test_exhausted_retryable_failure_is_queued() {
    let registry = registry_with(vec![chat_entry("alpha-chat", "alpha", 1)]).await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    alpha.push_error(Error::Network("reset".into()));
    let mut adapters: HashMap<String, Arc<dyn crate::adapter::ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    let router = ModelRouter::with_adapters(config_for(&["alpha"]), registry, adapters);

    let err = router.route_generation(request()).await.unwrap_err();
    match err {
        Error::Exhausted { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(last.is_retryable());
        }
        other => panic!("expected exhausted, got {other:?}"),
    }
    assert_eq!(router.retry_queue().len(), 1);
}

#[tokio::test]
async fn test_embedding_failover() {
    let mut config = config_for(&["alpha", "beta"]);
    config.default_model = "gpt-4o-mini".to_string();
    let registry = registry_with(vec![
        embed_entry("alpha-embed", "alpha", 1),
        embed_entry("beta-embed", "beta", 2),
    ])
    .await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    let beta = Arc::new(MockAdapter::new("beta"));
    alpha.push_error(Error::Server("down".into()));
    let mut adapters: HashMap<String, Arc<dyn crate::adapter::ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    adapters.insert("beta".to_string(), beta.clone());
    let router = ModelRouter::with_adapters(config, registry, adapters);

    let vectors = router
        .route_embedding(EmbeddingRequest::new(vec!["a".into(), "b".into()]))
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(alpha.embed_calls(), 1);
    assert_eq!(beta.embed_calls(), 1);
}

#[tokio::test]
async fn test_health_probe_marks_provider_unavailable() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    fixture.alpha.set_reachable(false);

    let results = fixture.router.run_health_probe().await;
    assert_eq!(results["alpha"], false);
    assert_eq!(results["beta"], true);
    assert!(!fixture
        .router
        .registry()
        .get("alpha-chat")
        .await
        .unwrap()
        .available);

    // Routing now skips the unhealthy provider entirely
    let response = fixture.router.route_generation(request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(fixture.alpha.calls(), 0);
}

#[tokio::test]
async fn test_configured_chain_leads_candidate_order() {
    let mut config = config_for(&["alpha", "beta"]);
    config.default_model = "beta-chat".to_string();
    let fixture = two_provider_router(config).await;

    // beta-chat has the worse priority but is the configured default
    let response = fixture.router.route_generation(request()).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(fixture.alpha.calls(), 0);
}

#[tokio::test]
async fn test_unknown_provider_rejected_at_build_time() {
    let config = config_for(&["doesnotexist"]);
    let registry = Arc::new(ModelRegistry::with_default_catalog());
    let err = ModelRouter::new(config, registry).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_all_candidates_failing_raises_last_error() {
    let fixture = two_provider_router(config_for(&["alpha", "beta"])).await;
    fixture.alpha.push_error(Error::Server("alpha down".into()));
    fixture
        .beta
        .push_error(Error::RateLimitExceeded { retry_after: None });

    let err = fixture.router.route_generation(request()).await.unwrap_err();
    match err {
        Error::Exhausted { attempts, last } => {
            assert_eq!(attempts, 2);
            assert!(matches!(*last, Error::RateLimitExceeded { .. }));
        }
        other => panic!("expected exhausted, got {other:?}"),
    }
}
