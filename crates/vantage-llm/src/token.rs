//! Token estimation
//!
//! Client-side token estimation using tiktoken's cl100k_base encoding,
//! used for pre-flight budget checks before actual usage is known.

use crate::message::Message;
use std::sync::LazyLock;
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Global tokenizer instance (initialized once, thread-safe)
static TOKENIZER: LazyLock<CoreBPE> = LazyLock::new(|| {
    cl100k_base().expect("cl100k_base tokenizer is a compile-time constant and should never fail")
});

/// Per-message overhead for role markers and separators
const MESSAGE_OVERHEAD: usize = 6;

/// Per-conversation overhead for start/end tokens
const CONVERSATION_OVERHEAD: usize = 3;

/// Token estimator for pre-flight budget checks
///
/// Uses cl100k_base, which is exact for OpenAI models and a close
/// approximation for the other provider families.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    /// Create a new estimator
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Estimate tokens in a string
    #[must_use]
    pub fn estimate_text(&self, text: &str) -> usize {
        TOKENIZER.encode_with_special_tokens(text).len()
    }

    /// Estimate tokens in a single message, including role overhead
    #[must_use]
    pub fn estimate_message(&self, message: &Message) -> usize {
        self.estimate_text(&message.content) + MESSAGE_OVERHEAD
    }

    /// Estimate total tokens for a set of prompt messages
    #[must_use]
    pub fn estimate_messages(&self, messages: &[Message]) -> usize {
        messages
            .iter()
            .map(|m| self.estimate_message(m))
            .sum::<usize>()
            + CONVERSATION_OVERHEAD
    }
}

/// Convenience function to estimate tokens in text
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    TokenEstimator::new().estimate_text(text)
}
