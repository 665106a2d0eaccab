//! The model backend seam.

use crate::core::StageId;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// One completion request sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    /// The stage issuing the call.
    pub stage: StageId,
    /// System instruction (the agent's role).
    pub system: String,
    /// The fully rendered user prompt.
    pub prompt: String,
}

/// Errors reported by a model backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The service could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http {
        /// Status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The service refused the request itself (bad key, bad model, bad
    /// payload). Repeating it will not help.
    #[error("request rejected with HTTP {status}: {body}")]
    Rejected {
        /// Status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Quota or rate limit exhausted.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The service answered but the envelope could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Builds the error for a non-success HTTP status.
    #[must_use]
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body: String = body.into();
        let body = if body.chars().count() > 500 {
            body.chars().take(500).collect::<String>() + "…"
        } else {
            body
        };
        match status {
            429 => Self::RateLimited(body),
            400..=499 => Self::Rejected { status, body },
            _ => Self::Http { status, body },
        }
    }
}

/// A language-model completion service.
///
/// Implementations must be cheap to share across runs; the invoker holds
/// one behind an `Arc` and calls it concurrently.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Completes one prompt, returning the model's text answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;
}

/// Connection settings shared by the HTTP backends.
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    /// API key sent with every request.
    pub api_key: String,
    /// Model identifier.
    pub model: String,
    /// Base URL of the API, without a trailing slash.
    pub base_url: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum answer length in tokens.
    pub max_tokens: u32,
    /// Sampling seed, where the API supports one.
    pub seed: Option<u64>,
    /// Transport-level request timeout.
    pub request_timeout: Duration,
}

impl HttpBackendConfig {
    /// Creates a configuration with defaults for everything but the key.
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            temperature: 0.7,
            max_tokens: 4096,
            seed: Some(42),
            request_timeout: Duration::from_secs(120),
        }
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the maximum answer length.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Sets the sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    /// Sets the transport timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classifies_rate_limit() {
        assert!(matches!(BackendError::from_status(429, "slow down"), BackendError::RateLimited(_)));
        assert!(matches!(
            BackendError::from_status(503, "down"),
            BackendError::Http { status: 503, .. }
        ));
    }

    #[test]
    fn test_from_status_client_errors_are_rejections() {
        for status in [400, 401, 403, 404] {
            assert!(matches!(
                BackendError::from_status(status, "nope"),
                BackendError::Rejected { status: s, .. } if s == status
            ));
        }
    }

    #[test]
    fn test_from_status_truncates_body() {
        let err = BackendError::from_status(500, "x".repeat(2000));
        match err {
            BackendError::Http { body, .. } => assert_eq!(body.chars().count(), 501),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_config_trims_base_url() {
        let config = HttpBackendConfig::new("k", "m", "https://api.example.com/v1/");
        assert_eq!(config.base_url, "https://api.example.com/v1");
    }
}
