//! Tests for the gateway façade

use super::*;
use crate::error::CoreError;
use crate::prompts::TemplateEngine;
use std::collections::HashMap;
use std::sync::Arc;
use vantage_llm::{
    Error as GatewayError, GatewayConfig, MessageRole, MockAdapter, ModelEntry, ModelKind,
    ModelRegistry, ModelRouter, ProviderAdapter, ProviderSettings,
};

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

fn config_for(providers: &[&str]) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    for p in providers {
        config
            .providers
            .insert((*p).to_string(), ProviderSettings::new(format!("sk-{p}-test-key")));
    }
    config
}

struct Fixture {
    gateway: Gateway,
    alpha: Arc<MockAdapter>,
    beta: Arc<MockAdapter>,
}

async fn gateway_with(config: GatewayConfig) -> Fixture {
    let registry = Arc::new(ModelRegistry::new());
    registry.register(chat_entry("alpha-chat", "alpha", 1)).await;
    registry.register(chat_entry("beta-chat", "beta", 2)).await;
    registry.register(embed_entry("alpha-embed", "alpha", 1)).await;

    let alpha = Arc::new(MockAdapter::new("alpha"));
    let beta = Arc::new(MockAdapter::new("beta"));
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    adapters.insert("beta".to_string(), beta.clone());

    Fixture {
        gateway: Gateway::with_router(Arc::new(ModelRouter::with_adapters(
            config, registry, adapters,
        ))),
        alpha,
        beta,
    }
}

#[tokio::test]
async fn test_chat_appends_exchange_to_conversation() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    fixture.alpha.push_output("Markets closed mixed today.", "alpha-chat");

    let id = fixture.gateway.create_conversation("user-1", None);
    let response = fixture
        .gateway
        .chat("How did markets do?", Some(&id), None)
        .await
        .unwrap();

    assert_eq!(response.content, "Markets closed mixed today.");
    assert_eq!(response.provider, "alpha");

    let history = fixture.gateway.conversation_history(&id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, MessageRole::User);
    assert_eq!(history[0].content, "How did markets do?");
    assert_eq!(history[1].role, MessageRole::Assistant);
    assert_eq!(history[1].content, "Markets closed mixed today.");
}

#[tokio::test]
async fn test_chat_without_conversation_keeps_store_empty() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    fixture.gateway.chat("hello", None, None).await.unwrap();
    assert!(fixture.gateway.conversations.is_empty());
}

#[tokio::test]
async fn test_chat_unknown_conversation_makes_no_network_call() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    let err = fixture
        .gateway
        .chat("hello", Some("missing"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ConversationNotFound(_)));
    assert_eq!(fixture.alpha.calls(), 0);
    assert_eq!(fixture.beta.calls(), 0);
}

#[tokio::test]
async fn test_chat_failover_records_serving_provider() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    fixture
        .alpha
        .push_error(GatewayError::Server("backend down".into()));

    let response = fixture.gateway.chat("hello", None, None).await.unwrap();
    assert_eq!(response.provider, "beta");
    assert_eq!(response.model, "beta-chat");
}

#[tokio::test]
async fn test_budget_refusal_precedes_routing() {
    let mut config = config_for(&["alpha"]);
    config
        .providers
        .get_mut("alpha")
        .unwrap()
        .daily_max_requests = Some(1);

    let registry = Arc::new(ModelRegistry::new());
    registry.register(chat_entry("alpha-chat", "alpha", 1)).await;
    let alpha = Arc::new(MockAdapter::new("alpha"));
    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha.clone());
    let gateway = Gateway::with_router(Arc::new(ModelRouter::with_adapters(
        config, registry, adapters,
    )));

    assert!(gateway.chat("first", None, None).await.is_ok());

    let err = gateway.chat("second", None, None).await.unwrap_err();
    match err {
        CoreError::Gateway(GatewayError::BudgetExceeded { provider, .. }) => {
            assert_eq!(provider, "alpha");
        }
        other => panic!("expected budget refusal, got {other:?}"),
    }
    // The refused request never reached the adapter
    assert_eq!(alpha.calls(), 1);
}

#[tokio::test]
async fn test_unknown_template_fails_before_routing() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    let gateway = fixture.gateway.with_templates(TemplateEngine::new());

    let err = gateway.chat("hello", None, None).await.unwrap_err();
    assert!(matches!(err, CoreError::UnknownTemplate(_)));
    assert_eq!(fixture.alpha.calls(), 0);
}

#[tokio::test]
async fn test_recommendation_lists_items() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    let response = fixture
        .gateway
        .recommendation(
            "Which broker suits a beginner?",
            &["Broker A".to_string(), "Broker B".to_string()],
            "low fees, EU regulated",
        )
        .await
        .unwrap();
    assert!(!response.content.is_empty());
    assert_eq!(fixture.alpha.calls(), 1);
}

#[tokio::test]
async fn test_summarize_and_analyses_route() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;

    fixture
        .gateway
        .summarize("Quarterly earnings rose 12%.", SummaryKind::Brief)
        .await
        .unwrap();
    fixture
        .gateway
        .broker_analysis("Founded 2010, FCA regulated, 0.1% commission")
        .await
        .unwrap();
    fixture
        .gateway
        .market_analysis("S&P 500 -0.4%, yields up 5bp")
        .await
        .unwrap();
    assert_eq!(fixture.alpha.calls(), 3);
}

#[tokio::test]
async fn test_rag_answer_numbers_chunks() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    let response = fixture
        .gateway
        .rag_answer(
            "What is the management fee?",
            &["The fund charges 0.25% annually.".to_string()],
        )
        .await
        .unwrap();
    assert!(!response.content.is_empty());
}

#[tokio::test]
async fn test_embeddings_return_one_vector_per_text() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    let vectors = fixture
        .gateway
        .embeddings(vec!["a".to_string(), "b".to_string()], None)
        .await
        .unwrap();
    assert_eq!(vectors.len(), 2);
    assert_eq!(fixture.alpha.embed_calls(), 1);
}

#[tokio::test]
async fn test_metrics_aggregate_routed_requests() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    fixture.gateway.chat("one", None, None).await.unwrap();
    fixture.gateway.chat("two", None, None).await.unwrap();

    let metrics = fixture.gateway.metrics().await;
    assert_eq!(metrics.total_requests, 2);
    assert!((metrics.success_rate - 1.0).abs() < 1e-9);
    // Mock usage is 10 input / 5 output per request
    assert_eq!(metrics.tokens_used, 30);
    assert!(metrics.total_cost > 0.0);
    assert_eq!(metrics.by_provider["alpha"].request_count, 2);
}

#[tokio::test]
async fn test_health_check_degraded_with_one_reachable() {
    let registry = Arc::new(ModelRegistry::new());
    registry.register(chat_entry("alpha-chat", "alpha", 1)).await;
    registry.register(chat_entry("beta-chat", "beta", 2)).await;
    registry.register(chat_entry("gamma-chat", "gamma", 3)).await;

    let alpha = Arc::new(MockAdapter::new("alpha"));
    let beta = Arc::new(MockAdapter::new("beta"));
    let gamma = Arc::new(MockAdapter::new("gamma"));
    beta.set_reachable(false);
    gamma.set_reachable(false);

    let mut adapters: HashMap<String, Arc<dyn ProviderAdapter>> = HashMap::new();
    adapters.insert("alpha".to_string(), alpha);
    adapters.insert("beta".to_string(), beta);
    adapters.insert("gamma".to_string(), gamma);
    let gateway = Gateway::with_router(Arc::new(ModelRouter::with_adapters(
        config_for(&["alpha", "beta", "gamma"]),
        registry,
        adapters,
    )));

    let report = gateway.health_check().await;
    assert_eq!(report.status, HealthStatus::Degraded);
    assert_eq!(report.providers.values().filter(|r| **r).count(), 1);
    assert!(report.providers["alpha"]);
}

#[tokio::test]
async fn test_clear_conversation_empties_history() {
    let fixture = gateway_with(config_for(&["alpha", "beta"])).await;
    let id = fixture.gateway.create_conversation("user-1", Some("EUR portfolio"));
    fixture.gateway.chat("hello", Some(&id), None).await.unwrap();

    fixture.gateway.clear_conversation(&id).await.unwrap();
    assert!(fixture
        .gateway
        .conversation_history(&id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_invalid_config_rejected_at_construction() {
    // No providers at all
    let err = Gateway::new(GatewayConfig::default()).unwrap_err();
    assert!(matches!(err, CoreError::Gateway(GatewayError::Config(_))));

    // Default model served by an unconfigured provider
    let mut config = GatewayConfig::default();
    config
        .providers
        .insert("anthropic".to_string(), ProviderSettings::new("sk-ant-test"));
    config.default_model = "gpt-4o-mini".to_string();
    assert!(Gateway::new(config).is_err());
}
