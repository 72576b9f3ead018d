//! Provider adapters
//!
//! One module per backend family. All families are REST APIs with a
//! credential header; they differ only in endpoints, wire shapes and
//! pricing.
//!
//! - `openai`: OpenAI chat completions + embeddings
//! - `anthropic`: Anthropic messages (chat only)
//! - `gemini`: Google Gemini generateContent + embedContent
//! - `mock`: scriptable adapter for tests

pub mod anthropic;
pub mod gemini;
pub mod mock;
pub mod openai;

use crate::error::{Error, Result};
use crate::limits::{RateLimitConfig, RateLimiter};
use reqwest::header::HeaderMap;
use std::time::Duration;

/// Minimum key length to display partial key
const MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY: usize = 8;

/// Mask API key for safe display in logs and Debug output
#[must_use]
pub fn mask_api_key(key: &str) -> String {
    if key.len() <= MIN_KEY_LENGTH_FOR_PARTIAL_DISPLAY {
        return "****".to_string();
    }
    format!("{}...{}", &key[..4], &key[key.len() - 4..])
}

/// Sanitize backend error text before it lands in logs or error values
#[must_use]
pub fn sanitize_api_error(error: &str) -> String {
    let lower = error.to_lowercase();

    if lower.contains("api key")
        || lower.contains("apikey")
        || lower.contains("bearer")
        || lower.contains("authorization")
        || lower.contains("credential")
    {
        return "authentication detail withheld".to_string();
    }

    if error.len() > 300 {
        let mut end = 300;
        while !error.is_char_boundary(end) {
            end -= 1;
        }
        return format!("{}...(truncated)", &error[..end]);
    }
    error.to_string()
}

/// Parse a Retry-After header as whole seconds
#[must_use]
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Convert a reqwest transport error into the taxonomy
#[must_use]
pub fn classify_transport_error(e: &reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Network("request timed out".to_string())
    } else if e.is_connect() {
        Error::Network(format!("connection failed: {}", sanitize_api_error(&e.to_string())))
    } else {
        Error::Network(sanitize_api_error(&e.to_string()))
    }
}

/// The local per-adapter quota gate: checked before every network call
pub(crate) struct LocalQuota {
    limiter: RateLimiter,
    key: String,
}

impl LocalQuota {
    pub(crate) fn new(provider: &str, requests_per_minute: u32) -> Self {
        Self {
            limiter: RateLimiter::new(RateLimitConfig::per_minute(requests_per_minute)),
            key: provider.to_string(),
        }
    }

    /// Decrement remaining quota, or fail before the network call is made
    pub(crate) async fn acquire(&self) -> Result<()> {
        let result = self.limiter.acquire(&self.key).await;
        if result.allowed {
            Ok(())
        } else {
            Err(Error::RateLimitExceeded {
                retry_after: Some(result.reset_after),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_key() {
        assert_eq!(mask_api_key("sk-1234567890abcdef"), "sk-1...cdef");
        assert_eq!(mask_api_key("short"), "****");
    }

    #[test]
    fn test_sanitize_hides_credentials() {
        assert_eq!(
            sanitize_api_error("Invalid API key provided"),
            "authentication detail withheld"
        );
        assert_eq!(sanitize_api_error("connection reset"), "connection reset");
    }

    #[test]
    fn test_sanitize_truncates_long_errors() {
        let long = "x".repeat(500);
        let out = sanitize_api_error(&long);
        assert!(out.ends_with("...(truncated)"));
        assert!(out.len() < 400);
    }

    #[test]
    fn test_parse_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "12".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(Duration::from_secs(12)));

        let mut bad = HeaderMap::new();
        bad.insert(reqwest::header::RETRY_AFTER, "soon".parse().unwrap());
        assert_eq!(parse_retry_after(&bad), None);
        assert_eq!(parse_retry_after(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_local_quota_blocks_before_network() {
        let quota = LocalQuota::new("openai", 2);
        assert!(quota.acquire().await.is_ok());
        assert!(quota.acquire().await.is_ok());
        let err = quota.acquire().await.unwrap_err();
        assert!(matches!(err, Error::RateLimitExceeded { .. }));
    }
}
