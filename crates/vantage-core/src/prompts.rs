//! Prompt templates
//!
//! Named templates with `{{var}}` placeholders, required/optional variable
//! lists and per-template generation defaults. Rendering validates the
//! supplied variables, substitutes every occurrence, and prepends a
//! condensed view of the recent conversation.

use crate::error::{CoreError, Result};
use std::collections::HashMap;
use vantage_llm::{Message, MessageRole};

/// How many prior turns are condensed into the prompt
pub const HISTORY_WINDOW: usize = 5;

/// Longest slice of a prior turn carried into the prompt
const HISTORY_SNIPPET_CHARS: usize = 280;

/// A named prompt template
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    /// Template name
    pub name: String,
    /// System prompt prepended to every rendering
    pub system_prompt: String,
    /// Body with `{{var}}` placeholders
    pub body: String,
    /// Variables that must be supplied
    pub required: Vec<String>,
    /// Variables that may be supplied; absent ones render as empty
    pub optional: Vec<String>,
    /// Default max tokens for this template
    pub max_tokens: u32,
    /// Default temperature for this template
    pub temperature: f32,
}

impl PromptTemplate {
    /// Create a template
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        system_prompt: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            body: body.into(),
            required: Vec::new(),
            optional: Vec::new(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    /// Set the required variables
    #[must_use]
    pub fn with_required(mut self, names: &[&str]) -> Self {
        self.required = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Set the optional variables
    #[must_use]
    pub fn with_optional(mut self, names: &[&str]) -> Self {
        self.optional = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Set default max tokens
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set default temperature
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A rendered prompt, ready to become a generation request
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    /// Prompt messages, system first
    pub messages: Vec<Message>,
    /// Max tokens from the template
    pub max_tokens: u32,
    /// Temperature from the template
    pub temperature: f32,
}

/// Extract placeholder names from a template body, in order of first use
#[must_use]
pub fn extract_placeholders(body: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        let name = rest[start + 2..start + 2 + end].trim();
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &rest[start + 2 + end + 2..];
    }
    names
}

/// Check that every required variable of a template is supplied
pub fn validate_variables(
    template: &PromptTemplate,
    variables: &HashMap<String, String>,
) -> Result<()> {
    for name in &template.required {
        if !variables.contains_key(name) {
            return Err(CoreError::MissingVariable {
                template: template.name.clone(),
                variable: name.clone(),
            });
        }
    }
    Ok(())
}

/// Condense the last few conversation turns into a context block
#[must_use]
pub fn condense_history(history: &[Message]) -> String {
    let start = history.len().saturating_sub(HISTORY_WINDOW);
    let mut block = String::from("Recent conversation:\n");
    for msg in &history[start..] {
        if msg.role == MessageRole::System {
            continue;
        }
        let mut content = msg.content.as_str();
        if content.len() > HISTORY_SNIPPET_CHARS {
            let mut end = HISTORY_SNIPPET_CHARS;
            while !content.is_char_boundary(end) {
                end -= 1;
            }
            content = &content[..end];
        }
        block.push_str(msg.role.as_str());
        block.push_str(": ");
        block.push_str(content);
        block.push('\n');
    }
    block
}

/// Holds named templates and renders prompts from them
#[derive(Debug)]
pub struct TemplateEngine {
    templates: HashMap<String, PromptTemplate>,
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TemplateEngine {
    /// Create an engine with no templates
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: HashMap::new(),
        }
    }

    /// Create an engine with the built-in advisor templates
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut engine = Self::new();
        for template in default_templates() {
            engine.register(template);
        }
        engine
    }

    /// Register or replace a template
    pub fn register(&mut self, template: PromptTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    /// Look up a template by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PromptTemplate> {
        self.templates.get(name)
    }

    /// Registered template names
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.templates.keys().map(String::as_str).collect()
    }

    /// Render a template with the given variables and conversation history.
    ///
    /// Fails with [`CoreError::MissingVariable`] when a required variable is
    /// absent; absent optional variables render as empty strings.
    pub fn render(
        &self,
        name: &str,
        variables: &HashMap<String, String>,
        history: &[Message],
    ) -> Result<RenderedPrompt> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| CoreError::UnknownTemplate(name.to_string()))?;
        validate_variables(template, variables)?;

        let mut body = template.body.clone();
        for (key, value) in variables {
            body = body.replace(&format!("{{{{{key}}}}}"), value);
        }
        for key in &template.optional {
            if !variables.contains_key(key) {
                body = body.replace(&format!("{{{{{key}}}}}"), "");
            }
        }

        let mut messages = Vec::new();
        if !template.system_prompt.is_empty() {
            messages.push(Message::system(&template.system_prompt));
        }
        if !history.is_empty() {
            messages.push(Message::system(condense_history(history)));
        }
        messages.push(Message::user(body.trim()));

        Ok(RenderedPrompt {
            messages,
            max_tokens: template.max_tokens,
            temperature: template.temperature,
        })
    }
}

// The built-in templates for the advisor's intents.
fn default_templates() -> Vec<PromptTemplate> {
    vec![
        PromptTemplate::new(
            "chat",
            "You are Vantage, a research assistant for retail investors. \
             Answer clearly, cite concrete figures when you have them, and \
             say so plainly when you are unsure. Never present speculation \
             as financial advice.",
            "{{context}}{{message}}",
        )
        .with_required(&["message"])
        .with_optional(&["context"])
        .with_max_tokens(1024)
        .with_temperature(0.7),
        PromptTemplate::new(
            "recommendation",
            "You are Vantage, helping an investor choose between brokers and \
             investment products. Weigh fees, regulation, market access and \
             the client's stated preferences. Be explicit about trade-offs.",
            "A client asks: {{query}}\n\nCandidate options:\n{{items}}\n\n\
             Client preferences: {{preferences}}\n\n\
             Recommend the best matches, ranked, with one short reason each.",
        )
        .with_required(&["query", "items", "preferences"])
        .with_max_tokens(1024)
        .with_temperature(0.6),
        PromptTemplate::new(
            "summarize",
            "You are Vantage, summarizing financial content for investors. \
             Keep every number and named entity accurate.",
            "Summarize the following content. {{focus}}\n\n{{content}}",
        )
        .with_required(&["content", "focus"])
        .with_max_tokens(512)
        .with_temperature(0.3),
        PromptTemplate::new(
            "rag_answer",
            "You are Vantage, answering questions strictly from the provided \
             excerpts. If the excerpts do not contain the answer, say so \
             instead of guessing.",
            "Excerpts:\n{{chunks}}\n\nQuestion: {{query}}",
        )
        .with_required(&["query", "chunks"])
        .with_max_tokens(1024)
        .with_temperature(0.2),
        PromptTemplate::new(
            "broker_analysis",
            "You are Vantage, producing a structured analysis of a broker for \
             a due-diligence report. Cover regulation, fees, platform quality, \
             market access and notable risks.",
            "Analyze the following broker profile:\n\n{{profile}}",
        )
        .with_required(&["profile"])
        .with_max_tokens(2048)
        .with_temperature(0.4),
        PromptTemplate::new(
            "market_analysis",
            "You are Vantage, writing a concise market commentary. Separate \
             observed data from interpretation, and flag uncertainty.",
            "Analyze the following market snapshot:\n\n{{snapshot}}",
        )
        .with_required(&["snapshot"])
        .with_max_tokens(2048)
        .with_temperature(0.4),
    ]
}
