//! Anthropic provider adapter
//!
//! Chat over the Anthropic messages API. The credential travels in an
//! `x-api-key` header and system messages are a separate request field.
//! Anthropic offers no embeddings endpoint.

use super::{
    classify_transport_error, mask_api_key, parse_retry_after, sanitize_api_error, LocalQuota,
};
use crate::adapter::ProviderAdapter;
use crate::completion::{GenerationRequest, ProviderOutput, TokenUsage};
use crate::error::{Error, Result};
use crate::message::MessageRole;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Anthropic API base URL
pub const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";

/// API version header value
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default requests-per-minute quota
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 30;

/// Output tokens requested when the caller does not set a cap
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Anthropic provider configuration
#[derive(Clone)]
pub struct AnthropicConfig {
    /// API key
    pub api_key: String,
    /// Base URL override
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// Local requests-per-minute quota
    pub requests_per_minute: u32,
}

// Custom Debug implementation to mask the API key
impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl AnthropicConfig {
    /// Create a new configuration with an API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: ANTHROPIC_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| Error::NotConfigured("ANTHROPIC_API_KEY not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the local requests-per-minute quota
    #[must_use]
    pub fn with_requests_per_minute(mut self, rpm: u32) -> Self {
        self.requests_per_minute = rpm;
        self
    }
}

/// Anthropic adapter
pub struct AnthropicAdapter {
    client: Client,
    config: AnthropicConfig,
    quota: LocalQuota,
}

// Wire types
#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: WireUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct WireUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicAdapter {
    /// Create a new Anthropic adapter
    #[must_use]
    pub fn new(config: AnthropicConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        let quota = LocalQuota::new("anthropic", config.requests_per_minute);
        Self {
            client,
            config,
            quota,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(AnthropicConfig::from_env()?))
    }

    // System prompts are a dedicated field, so split them off the
    // conversation turns.
    fn split_messages(request: &GenerationRequest) -> (Option<String>, Vec<WireMessage>) {
        let mut system_parts = Vec::new();
        let mut turns = Vec::new();
        for msg in &request.messages {
            match msg.role {
                MessageRole::System => system_parts.push(msg.content.clone()),
                role => turns.push(WireMessage {
                    role: role.as_str().to_string(),
                    content: msg.content.clone(),
                }),
            }
        }
        let system = if system_parts.is_empty() {
            None
        } else {
            Some(system_parts.join("\n\n"))
        };
        (system, turns)
    }

    async fn fail_from_response(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Error::from_status(status, sanitize_api_error(&body), retry_after)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn id(&self) -> &str {
        "anthropic"
    }

    fn supports_embeddings(&self) -> bool {
        false
    }

    #[instrument(skip(self, request), fields(model = %model))]
    async fn generate(&self, request: &GenerationRequest, model: &str) -> Result<ProviderOutput> {
        self.quota.acquire().await?;

        let (system, messages) = Self::split_messages(request);
        let api_request = MessagesRequest {
            model: model.to_string(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages,
            system,
            temperature: request.temperature,
        };

        debug!("Sending request to Anthropic");

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::fail_from_response(response).await);
        }

        let api_response: MessagesResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let content = api_response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .map(|block| block.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        Ok(ProviderOutput {
            content,
            usage: TokenUsage::new(
                api_response.usage.input_tokens,
                api_response.usage.output_tokens,
            ),
            finish_reason: api_response.stop_reason,
            model: api_response.model,
        })
    }

    async fn embed(&self, _texts: &[String], _model: &str) -> Result<Vec<Vec<f32>>> {
        Err(Error::Client(
            "anthropic does not offer an embeddings endpoint".to_string(),
        ))
    }

    async fn test_connection(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/v1/models", self.config.base_url))
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}
