//! Gemini provider adapter
//!
//! Chat and embeddings over the Google Generative Language REST API. The
//! credential travels in an `x-goog-api-key` header; chat uses
//! `generateContent`, embeddings use `embedContent`.

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

/// Gemini API base URL
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default requests-per-minute quota
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 20;

/// Gemini provider configuration
#[derive(Clone)]
pub struct GeminiConfig {
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
impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &mask_api_key(&self.api_key))
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("requests_per_minute", &self.requests_per_minute)
            .finish()
    }
}

impl GeminiConfig {
    /// Create a new configuration with an API key
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: GEMINI_API_BASE.to_string(),
            timeout: Duration::from_secs(30),
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
        }
    }

    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| Error::NotConfigured("GEMINI_API_KEY not set".to_string()))?;
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

/// Gemini adapter
pub struct GeminiAdapter {
    client: Client,
    config: GeminiConfig,
    quota: LocalQuota,
}

// Wire types
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
    model_version: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Serialize)]
struct EmbedRequest {
    content: Content,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

impl GeminiAdapter {
    /// Create a new Gemini adapter
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        let quota = LocalQuota::new("gemini", config.requests_per_minute);
        Self {
            client,
            config,
            quota,
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(GeminiConfig::from_env()?))
    }

    // Gemini has no system role in contents; system messages become a
    // systemInstruction block and assistant turns use the "model" role.
    fn convert_request(request: &GenerationRequest) -> GenerateRequest {
        let mut system_parts = Vec::new();
        let mut contents = Vec::new();
        for msg in &request.messages {
            match msg.role {
                MessageRole::System => system_parts.push(Part {
                    text: msg.content.clone(),
                }),
                MessageRole::User => contents.push(Content {
                    role: Some("user".to_string()),
                    parts: vec![Part {
                        text: msg.content.clone(),
                    }],
                }),
                MessageRole::Assistant => contents.push(Content {
                    role: Some("model".to_string()),
                    parts: vec![Part {
                        text: msg.content.clone(),
                    }],
                }),
            }
        }

        let system_instruction = if system_parts.is_empty() {
            None
        } else {
            Some(Content {
                role: None,
                parts: system_parts,
            })
        };

        let generation_config = if request.max_tokens.is_some() || request.temperature.is_some() {
            Some(GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            })
        } else {
            None
        };

        GenerateRequest {
            contents,
            system_instruction,
            generation_config,
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
impl ProviderAdapter for GeminiAdapter {
    fn id(&self) -> &str {
        "gemini"
    }

    fn supports_embeddings(&self) -> bool {
        true
    }

    #[instrument(skip(self, request), fields(model = %model))]
    async fn generate(&self, request: &GenerationRequest, model: &str) -> Result<ProviderOutput> {
        self.quota.acquire().await?;

        let api_request = Self::convert_request(request);

        debug!("Sending request to Gemini");

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.config.base_url, model
            ))
            .header("x-goog-api-key", &self.config.api_key)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| classify_transport_error(&e))?;

        if !response.status().is_success() {
            return Err(Self::fail_from_response(response).await);
        }

        let api_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::InvalidResponse(e.to_string()))?;

        let candidate = api_response
            .candidates
            .first()
            .ok_or_else(|| Error::InvalidResponse("no candidates in response".to_string()))?;

        let content = candidate
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join("");

        let usage = api_response
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        Ok(ProviderOutput {
            content,
            usage,
            finish_reason: candidate.finish_reason.clone(),
            model: api_response
                .model_version
                .unwrap_or_else(|| model.to_string()),
        })
    }

    #[instrument(skip(self, texts), fields(model = %model, count = texts.len()))]
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            self.quota.acquire().await?;

            let api_request = EmbedRequest {
                content: Content {
                    role: None,
                    parts: vec![Part { text: text.clone() }],
                },
            };

            let response = self
                .client
                .post(format!(
                    "{}/models/{}:embedContent",
                    self.config.base_url, model
                ))
                .header("x-goog-api-key", &self.config.api_key)
                .header("Content-Type", "application/json")
                .json(&api_request)
                .send()
                .await
                .map_err(|e| classify_transport_error(&e))?;

            if !response.status().is_success() {
                return Err(Self::fail_from_response(response).await);
            }

            let api_response: EmbedResponse = response
                .json()
                .await
                .map_err(|e| Error::InvalidResponse(e.to_string()))?;
            vectors.push(api_response.embedding.values);
        }
        Ok(vectors)
    }

    async fn test_connection(&self) -> bool {
        let result = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .header("x-goog-api-key", &self.config.api_key)
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status().is_success())
    }
}
