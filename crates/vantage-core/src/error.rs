//! Error types for service orchestration

use thiserror::Error;

/// Orchestration error type
#[derive(Debug, Error)]
pub enum CoreError {
    /// No template registered under this name
    #[error("unknown template: {0}")]
    UnknownTemplate(String),

    /// A required template variable was not supplied
    #[error("template {template} is missing required variable {variable}")]
    MissingVariable {
        /// Template name
        template: String,
        /// The missing variable
        variable: String,
    },

    /// No conversation with this id
    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    /// An error raised by the gateway
    #[error(transparent)]
    Gateway(#[from] vantage_llm::Error),
}

impl CoreError {
    /// User-facing message, safe to surface directly to a caller
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Gateway(e) => e.user_message(),
            Self::ConversationNotFound(_) => "This conversation is no longer available.",
            Self::UnknownTemplate(_) | Self::MissingVariable { .. } => {
                "The request could not be completed. Please try again."
            }
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CoreError>;
