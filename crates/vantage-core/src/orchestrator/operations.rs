//! Intent-specific gateway operations
//!
//! Each operation is a thin composition: render the prompt, check the
//! daily budget, route through the candidate list, append the exchange to
//! the conversation when one was supplied, and hand the response back.

use crate::error::{CoreError, Result};
use std::collections::HashMap;
use tracing::{instrument, warn};
use vantage_llm::{
    EmbeddingRequest, Error as GatewayError, GenerationRequest, GenerationResponse, Message,
};

use super::core::Gateway;
use super::types::SummaryKind;
use crate::prompts::RenderedPrompt;

fn vars(pairs: &[(&str, String)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

impl Gateway {
    /// Answer a chat message, in the context of a conversation when an id
    /// is supplied.
    #[instrument(skip(self, message, extra_context), fields(conversation = conversation_id.unwrap_or("-")))]
    pub async fn chat(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        extra_context: Option<&str>,
    ) -> Result<GenerationResponse> {
        let history = match conversation_id {
            Some(id) => self.conversations.history(id).await?,
            None => Vec::new(),
        };

        let mut variables = vars(&[("message", message.to_string())]);
        if let Some(context) = extra_context {
            variables.insert("context".to_string(), format!("{context}\n\n"));
        }

        let rendered = self.templates.render("chat", &variables, &history)?;
        let mut request = self.request_from(rendered, "chat");
        if let Some(id) = conversation_id {
            request = request.with_conversation_id(id);
        }

        let response = self.dispatch(request).await?;
        if let Some(id) = conversation_id {
            self.conversations
                .append_exchange(id, Message::user(message), Message::assistant(&response.content))
                .await?;
        }
        Ok(response)
    }

    /// Rank candidate options against a client query and preferences
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn recommendation(
        &self,
        query: &str,
        items: &[String],
        preferences: &str,
    ) -> Result<GenerationResponse> {
        let listing = items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n");
        let rendered = self.templates.render(
            "recommendation",
            &vars(&[
                ("query", query.to_string()),
                ("items", listing),
                ("preferences", preferences.to_string()),
            ]),
            &[],
        )?;
        let request = self.request_from(rendered, "recommendation");
        self.dispatch(request).await
    }

    /// Summarize content in the requested shape
    #[instrument(skip_all, fields(kind = ?kind))]
    pub async fn summarize(&self, content: &str, kind: SummaryKind) -> Result<GenerationResponse> {
        let rendered = self.templates.render(
            "summarize",
            &vars(&[
                ("content", content.to_string()),
                ("focus", kind.focus().to_string()),
            ]),
            &[],
        )?;
        let request = self.request_from(rendered, "summarize");
        self.dispatch(request).await
    }

    /// Answer a question strictly from the supplied excerpts
    #[instrument(skip_all, fields(chunks = context_chunks.len()))]
    pub async fn rag_answer(
        &self,
        query: &str,
        context_chunks: &[String],
    ) -> Result<GenerationResponse> {
        let excerpts = context_chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| format!("[{}] {chunk}", i + 1))
            .collect::<Vec<_>>()
            .join("\n\n");
        let rendered = self.templates.render(
            "rag_answer",
            &vars(&[("query", query.to_string()), ("chunks", excerpts)]),
            &[],
        )?;
        let request = self.request_from(rendered, "rag_answer");
        self.dispatch(request).await
    }

    /// Produce a structured due-diligence analysis of a broker profile
    #[instrument(skip_all)]
    pub async fn broker_analysis(&self, profile: &str) -> Result<GenerationResponse> {
        let rendered = self.templates.render(
            "broker_analysis",
            &vars(&[("profile", profile.to_string())]),
            &[],
        )?;
        let request = self.request_from(rendered, "broker_analysis");
        self.dispatch(request).await
    }

    /// Produce a market commentary from a market snapshot
    #[instrument(skip_all)]
    pub async fn market_analysis(&self, snapshot: &str) -> Result<GenerationResponse> {
        let rendered = self.templates.render(
            "market_analysis",
            &vars(&[("snapshot", snapshot.to_string())]),
            &[],
        )?;
        let request = self.request_from(rendered, "market_analysis");
        self.dispatch(request).await
    }

    /// Generate an embedding vector per input text
    #[instrument(skip(self, texts), fields(texts = texts.len()))]
    pub async fn embeddings(
        &self,
        texts: Vec<String>,
        provider: Option<&str>,
    ) -> Result<Vec<Vec<f32>>> {
        let mut request = EmbeddingRequest::new(texts);
        if let Some(provider) = provider {
            request = request.with_provider(provider);
        }
        match self.router.route_embedding(request).await {
            Ok(vectors) => Ok(vectors),
            Err(e) => {
                warn!(error = %e, user_message = e.user_message(), "Embedding request failed");
                Err(e.into())
            }
        }
    }

    fn request_from(&self, rendered: RenderedPrompt, intent: &str) -> GenerationRequest {
        GenerationRequest::new(rendered.messages)
            .with_max_tokens(rendered.max_tokens)
            .with_temperature(rendered.temperature)
            .with_metadata("intent", intent)
    }

    // The shared tail of every generation op: refuse when today's budget
    // would be crossed, then route with failover.
    async fn dispatch(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.guard_budget(&request).await?;
        match self.router.route_generation(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                warn!(error = %e, user_message = e.user_message(), "Generation failed");
                Err(e.into())
            }
        }
    }

    // Pre-flight check against the first candidate's provider. Estimated
    // cost uses the fixed input/output split; exact usage is tracked by the
    // router once the request is served.
    async fn guard_budget(&self, request: &GenerationRequest) -> Result<()> {
        let candidates = self.router.select_candidates(request).await?;
        let Some(entry) = candidates.first() else {
            return Ok(());
        };

        let estimated_tokens = self.estimator.estimate_messages(&request.messages) as u64
            + u64::from(request.max_tokens.unwrap_or(0));
        let estimated_cost = self.router.tracker().estimate_cost(entry, estimated_tokens);

        if self
            .router
            .tracker()
            .would_exceed_limits(&entry.provider, estimated_tokens, estimated_cost)
            .await
        {
            warn!(
                provider = %entry.provider,
                estimated_tokens,
                "Refusing request, daily budget would be crossed"
            );
            return Err(CoreError::Gateway(GatewayError::BudgetExceeded {
                provider: entry.provider.clone(),
                reason: format!("an estimated {estimated_tokens} tokens would cross today's ceiling"),
            }));
        }
        Ok(())
    }
}
