//! Error types for the Vantage gateway
//!
//! Every provider adapter converts backend failures into this taxonomy at
//! its own boundary; raw transport errors never cross into the router.

use std::time::Duration;
use thiserror::Error;

/// Gateway error type
#[derive(Debug, Error)]
pub enum Error {
    /// Provider or local rate limit hit
    #[error("rate limit exceeded")]
    RateLimitExceeded {
        /// Provider-supplied retry-after hint, if any
        retry_after: Option<Duration>,
    },

    /// Timeout, connection reset or DNS failure
    #[error("network error: {0}")]
    Network(String),

    /// Backend returned a 5xx status
    #[error("server error: {0}")]
    Server(String),

    /// Backend returned 401/403
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Other 4xx or a malformed request
    #[error("client error: {0}")]
    Client(String),

    /// Success status with an undecodable body
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider referenced but not configured
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// Candidate selection produced no usable model
    #[error("no eligible model: {0}")]
    NoEligibleModel(String),

    /// A daily usage limit would be crossed
    #[error("daily budget exceeded for {provider}: {reason}")]
    BudgetExceeded {
        /// Provider whose limit would be crossed
        provider: String,
        /// Which limit (tokens, cost or requests) and by how much
        reason: String,
    },

    /// Every candidate model failed
    #[error("all {attempts} candidates failed, last error: {last}")]
    Exhausted {
        /// Number of candidates actually attempted
        attempts: usize,
        /// The last underlying cause
        last: Box<Error>,
    },

    /// Configuration rejected at load time
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a failover attempt or delayed retry can succeed.
    ///
    /// Rate limits, network failures and 5xx responses are transient;
    /// everything else indicates a request or configuration problem.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Network(_) | Self::Server(_)
        )
    }

    /// Provider-supplied retry-after hint, if this is a rate-limit error
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Stable short code for usage records and logs
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => "rate_limit",
            Self::Network(_) => "network",
            Self::Server(_) => "server",
            Self::Authentication(_) => "auth",
            Self::Client(_) => "client",
            Self::InvalidResponse(_) => "invalid_response",
            Self::NotConfigured(_) => "not_configured",
            Self::NoEligibleModel(_) => "no_eligible_model",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Exhausted { .. } => "exhausted",
            Self::Config(_) => "config",
        }
    }

    /// User-facing message, safe to surface directly to a caller
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::RateLimitExceeded { .. } => {
                "The service is temporarily busy. Please retry shortly."
            }
            Self::Network(_) | Self::Server(_) => {
                "The service is temporarily unavailable. Please try again."
            }
            Self::Authentication(_) | Self::NotConfigured(_) | Self::Config(_) => {
                "The service is misconfigured. Please contact support."
            }
            Self::NoEligibleModel(_) => "No model is currently available for this request.",
            Self::BudgetExceeded { .. } => {
                "The daily usage limit has been reached. Please try again tomorrow."
            }
            Self::Exhausted { last, .. } => last.user_message(),
            Self::Client(_) | Self::InvalidResponse(_) => {
                "The request could not be completed. Please try again."
            }
        }
    }

    /// Classify an HTTP status into the error taxonomy.
    ///
    /// `retry_after` is the parsed `Retry-After` header, honored for 429s.
    #[must_use]
    pub fn from_status(status: u16, detail: impl Into<String>, retry_after: Option<Duration>) -> Self {
        let detail = detail.into();
        match status {
            429 => Self::RateLimitExceeded { retry_after },
            401 | 403 => Self::Authentication(detail),
            500..=599 => Self::Server(detail),
            _ => Self::Client(detail),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::RateLimitExceeded { retry_after: None }.is_retryable());
        assert!(Error::Network("reset".into()).is_retryable());
        assert!(Error::Server("500".into()).is_retryable());

        assert!(!Error::Authentication("401".into()).is_retryable());
        assert!(!Error::Client("400".into()).is_retryable());
        assert!(!Error::InvalidResponse("bad json".into()).is_retryable());
        assert!(!Error::Config("missing key".into()).is_retryable());
    }

    #[test]
    fn test_from_status_mapping() {
        let hint = Some(Duration::from_secs(7));
        match Error::from_status(429, "busy", hint) {
            Error::RateLimitExceeded { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }

        assert!(matches!(
            Error::from_status(401, "", None),
            Error::Authentication(_)
        ));
        assert!(matches!(
            Error::from_status(403, "", None),
            Error::Authentication(_)
        ));
        assert!(matches!(Error::from_status(503, "", None), Error::Server(_)));
        assert!(matches!(Error::from_status(400, "", None), Error::Client(_)));
    }

    #[test]
    fn test_exhausted_delegates_user_message() {
        let err = Error::Exhausted {
            attempts: 3,
            last: Box::new(Error::RateLimitExceeded { retry_after: None }),
        };
        assert_eq!(
            err.user_message(),
            "The service is temporarily busy. Please retry shortly."
        );
    }

    #[test]
    fn test_retry_after_only_on_rate_limit() {
        let err = Error::RateLimitExceeded {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_secs(3)));
        assert_eq!(Error::Network("x".into()).retry_after(), None);
    }
}
