//! OpenAI provider adapter
//!
//! Chat completions and embeddings over the OpenAI REST API with bearer
//! authentication.

use super::{
    classify_transport_error, mask_api_key, parse_retry_after, sanitize_api_error, LocalQuota,
};
use crate::adapter::ProviderAdapter;
use crate::completion::{GenerationRequest, ProviderOutput, TokenUsage};
use crate::error::{Error, Result};
use crate::message::Message;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// OpenAI API base URL
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Default requests-per-minute quota
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 500;

/// OpenAI provider configuration
#[derive(Clone)]
pub struct OpenAiConfig {
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
impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl OpenAiConfig {
    /// Create a new configuration with an API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: OPENAI_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::NotConfigured("OPENAI_API_KEY not set".to_string()))?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        Ok(config)
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

/// OpenAI adapter
pub struct OpenAiAdapter {
    client: Client,
    config: OpenAiConfig,
    quota: LocalQuota,
}

// Wire types
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
    model: String,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Serialize)]
struct EmbeddingApiRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

impl OpenAiAdapter {
    /// Create a new OpenAI adapter
    #[must_use]
    pub fn new(config: OpenAiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        let quota = LocalQuota::new("openai", config.requests_per_minute);
        Self {
            client,
            config,
            quota,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OpenAiConfig::from_env()?))
    }

    fn convert_message(msg: &Message) -> ChatMessage {
        ChatMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }

    async fn fail_from_response(response: reqwest::Response) -> Error {
        let status = response.status().as_u16();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        Error::from_status(status, sanitize_api_error(&body), retry_after)
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn id(&self) -> &str {
        "openai"
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(model = %model))]
    async fn generate(&self, request: &GenerationRequest, model: &str) -> Result<ProviderOutput> {
        self.quota.acquire().await?;

        let chat_request = ChatRequest {
            model: model.to_string(),
            messages: request.messages.iter().map(Self::convert_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        debug!("Sending request to OpenAI");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&chat_request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::fail_from_response(response).await);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let choice = chat_response
            .choices
            .first()
            .ok_or_else(|| Error::InvalidResponse("no choices in response".to_string()))?;

        let usage = chat_response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(ProviderOutput {
            content: choice.message.content.clone().unwrap_or_default(),
            usage,
            finish_reason: choice.finish_reason.clone(),
            model: chat_response.model,
        })
    }

    #[instrument(skip(self, texts), fields(model = %model, count = texts.len()))]
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        self.quota.acquire().await?;

        let api_request = EmbeddingApiRequest {
            model: model.to_string(),
            input: texts.to_vec(),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::fail_from_response(response).await);
        }

        let api_response: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        Ok(api_response.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn test_connection(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}
