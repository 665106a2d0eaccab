//! Service configuration.
//!
//! Every option can be given as a flag or through a `PRDFLOW_*`
//! environment variable.

use crate::agents::{AgentInvoker, ModelBackend, StubBackend};
use crate::errors::PrdflowError;
use crate::pipeline::{BackoffStrategy, JitterStrategy, RetryConfig};
use crate::store::{FileRunStore, InMemoryRunStore, RunStore};
use clap::{Parser, ValueEnum};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "http-backends")]
use crate::agents::{AnthropicBackend, HttpBackendConfig, OpenAiBackend, ANTHROPIC_BASE_URL, OPENAI_BASE_URL};

/// Default model for the OpenAI-compatible backend.
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Default model for the Anthropic backend.
pub const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-20250514";

/// Where runs are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Process memory; runs are lost on restart.
    Memory,
    /// One JSON file per run under the data directory.
    File,
}

/// Which model service answers agent calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Deterministic canned answers.
    Stub,
    /// OpenAI-compatible chat completions.
    Openai,
    /// Anthropic messages.
    Anthropic,
}

/// Command-line and environment configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "prdflow", version, about = "Turns a product idea into a PRD bundle")]
pub struct AppConfig {
    /// Address to bind the HTTP server to
    #[arg(long, env = "PRDFLOW_BIND", default_value = "0.0.0.0")]
    pub bind: String,

    /// HTTP port
    #[arg(long, env = "PRDFLOW_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding persisted runs
    #[arg(long, env = "PRDFLOW_DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// Run store
    #[arg(long, env = "PRDFLOW_STORE", value_enum, default_value = "file")]
    pub store: StoreKind,

    /// Model backend; falls back to the stub when no API key is set
    #[arg(long, env = "PRDFLOW_BACKEND", value_enum, default_value = "openai")]
    pub backend: BackendKind,

    /// API key for the model backend
    #[arg(long, env = "PRDFLOW_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Model identifier (backend default if unset)
    #[arg(long, env = "PRDFLOW_MODEL")]
    pub model: Option<String>,

    /// Base URL of the model API (backend default if unset)
    #[arg(long, env = "PRDFLOW_BASE_URL")]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds
    #[arg(long, env = "PRDFLOW_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Calls per stage, including the first one
    #[arg(long, env = "PRDFLOW_MAX_ATTEMPTS", default_value_t = 3)]
    pub max_attempts: u32,

    /// Base retry delay in milliseconds
    #[arg(long, env = "PRDFLOW_RETRY_BASE_MS", default_value_t = 500)]
    pub retry_base_ms: u64,

    /// Maximum retry delay in milliseconds
    #[arg(long, env = "PRDFLOW_RETRY_MAX_MS", default_value_t = 8000)]
    pub retry_max_ms: u64,

    /// How the retry delay grows between attempts
    #[arg(long, env = "PRDFLOW_RETRY_BACKOFF", value_enum, default_value = "exponential")]
    pub retry_backoff: BackoffStrategy,

    /// Randomization applied to each retry delay
    #[arg(long, env = "PRDFLOW_RETRY_JITTER", value_enum, default_value = "full")]
    pub retry_jitter: JitterStrategy,

    /// Sampling temperature
    #[arg(long, env = "PRDFLOW_TEMPERATURE", default_value_t = 0.7)]
    pub temperature: f32,

    /// Maximum answer length in tokens
    #[arg(long, env = "PRDFLOW_MAX_TOKENS", default_value_t = 4096)]
    pub max_tokens: u32,

    /// Sampling seed
    #[arg(long, env = "PRDFLOW_SEED", default_value_t = 42)]
    pub seed: u64,

    /// Allowed CORS origins, comma separated (any origin if empty)
    #[arg(long, env = "PRDFLOW_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Emit JSON logs
    #[arg(long, env = "PRDFLOW_LOG_JSON")]
    pub log_json: bool,
}

impl AppConfig {
    /// Checks option values that clap cannot.
    ///
    /// # Errors
    ///
    /// Returns `Validation` naming the first offending option.
    pub fn validate(&self) -> Result<(), PrdflowError> {
        if self.call_timeout_secs == 0 {
            return Err(PrdflowError::validation("call timeout must be at least one second"));
        }
        if self.max_attempts == 0 {
            return Err(PrdflowError::validation("max attempts must be at least 1"));
        }
        if self.retry_base_ms > self.retry_max_ms {
            return Err(PrdflowError::validation(format!(
                "retry base delay ({} ms) exceeds the maximum ({} ms)",
                self.retry_base_ms, self.retry_max_ms
            )));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PrdflowError::validation(format!(
                "temperature must be between 0 and 2, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(PrdflowError::validation("max tokens must be positive"));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(PrdflowError::validation(format!("base URL '{url}' is not an http(s) URL")));
            }
        }
        self.socket_addr().map(|_| ())
    }

    /// Returns the address to listen on.
    ///
    /// The bind address may be an IPv4 or IPv6 literal (brackets optional)
    /// or a host name such as `localhost`.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the bind address does not resolve.
    pub fn socket_addr(&self) -> Result<SocketAddr, PrdflowError> {
        let host = self.bind.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        let invalid = |reason: String| PrdflowError::validation(format!("invalid bind address '{}': {reason}", self.bind));
        (host, self.port)
            .to_socket_addrs()
            .map_err(|e| invalid(e.to_string()))?
            .next()
            .ok_or_else(|| invalid("no addresses".to_string()))
    }

    /// Returns the per-stage retry policy.
    #[must_use]
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_attempts(self.max_attempts)
            .with_base_delay_ms(self.retry_base_ms)
            .with_max_delay_ms(self.retry_max_ms)
            .with_backoff(self.retry_backoff)
            .with_jitter(self.retry_jitter)
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// Returns the backend that will actually be used.
    ///
    /// HTTP backends need an API key; without one the stub answers.
    #[must_use]
    pub fn effective_backend(&self) -> BackendKind {
        let has_key = self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
        match self.backend {
            BackendKind::Openai | BackendKind::Anthropic if !has_key => BackendKind::Stub,
            kind => kind,
        }
    }

    /// Opens the configured run store.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the data directory cannot be used.
    pub fn build_store(&self) -> Result<Arc<dyn RunStore>, PrdflowError> {
        let store: Arc<dyn RunStore> = match self.store {
            StoreKind::Memory => Arc::new(InMemoryRunStore::new()),
            StoreKind::File => Arc::new(FileRunStore::open(&self.data_dir)?),
        };
        Ok(store)
    }

    /// Builds the configured model backend.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the HTTP client cannot be built or HTTP
    /// backends were compiled out.
    pub fn build_backend(&self) -> Result<Arc<dyn ModelBackend>, PrdflowError> {
        match self.effective_backend() {
            BackendKind::Stub => Ok(Arc::new(StubBackend::new())),
            #[cfg(feature = "http-backends")]
            BackendKind::Openai => {
                let config = self.http_config(DEFAULT_OPENAI_MODEL, OPENAI_BASE_URL);
                let backend = OpenAiBackend::new(config).map_err(|e| PrdflowError::validation(e.to_string()))?;
                Ok(Arc::new(backend))
            }
            #[cfg(feature = "http-backends")]
            BackendKind::Anthropic => {
                let config = self.http_config(DEFAULT_ANTHROPIC_MODEL, ANTHROPIC_BASE_URL);
                let backend =
                    AnthropicBackend::new(config).map_err(|e| PrdflowError::validation(e.to_string()))?;
                Ok(Arc::new(backend))
            }
            #[cfg(not(feature = "http-backends"))]
            kind => Err(PrdflowError::validation(format!(
                "backend {kind:?} requires the http-backends feature"
            ))),
        }
    }

    /// Builds the agent invoker around the configured backend.
    ///
    /// # Errors
    ///
    /// Same as [`build_backend`](Self::build_backend).
    pub fn build_invoker(&self) -> Result<AgentInvoker, PrdflowError> {
        Ok(AgentInvoker::new(self.build_backend()?).with_call_timeout(self.call_timeout()))
    }

    #[cfg(feature = "http-backends")]
    fn http_config(&self, default_model: &str, default_url: &str) -> HttpBackendConfig {
        HttpBackendConfig::new(
            self.api_key.clone().unwrap_or_default(),
            self.model.clone().unwrap_or_else(|| default_model.to_string()),
            self.base_url.clone().unwrap_or_else(|| default_url.to_string()),
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens)
        .with_seed(Some(self.seed))
        .with_request_timeout(self.call_timeout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> AppConfig {
        let mut argv = vec!["prdflow"];
        argv.extend_from_slice(args);
        AppConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = parse(&[]);
        config.validate().unwrap();
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_config(), RetryConfig::default());
    }

    #[test]
    fn test_retry_strategies_are_selectable() {
        let config = parse(&["--retry-backoff", "linear", "--retry-jitter", "decorrelated"]);
        let retry = config.retry_config();
        assert_eq!(retry.backoff_strategy, BackoffStrategy::Linear);
        assert_eq!(retry.jitter_strategy, JitterStrategy::Decorrelated);

        let retry = parse(&["--retry-backoff", "constant", "--retry-jitter", "none"]).retry_config();
        assert_eq!(retry.backoff_strategy, BackoffStrategy::Constant);
        assert_eq!(retry.jitter_strategy, JitterStrategy::None);

        assert!(AppConfig::try_parse_from(["prdflow", "--retry-jitter", "random"]).is_err());
    }

    #[test]
    fn test_missing_key_falls_back_to_stub() {
        let config = parse(&["--backend", "anthropic", "--api-key", "  "]);
        assert_eq!(config.effective_backend(), BackendKind::Stub);
        assert_eq!(config.build_backend().unwrap().name(), "stub");

        let config = parse(&["--backend", "stub", "--api-key", "sk-test"]);
        assert_eq!(config.effective_backend(), BackendKind::Stub);
    }

    #[cfg(feature = "http-backends")]
    #[test]
    fn test_http_backend_selected_with_key() {
        let config = parse(&["--backend", "anthropic", "--api-key", "sk-test"]);
        assert_eq!(config.effective_backend(), BackendKind::Anthropic);
        assert_eq!(config.build_backend().unwrap().name(), "anthropic");
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        assert!(parse(&["--max-attempts", "0"]).validate().is_err());
        assert!(parse(&["--call-timeout-secs", "0"]).validate().is_err());
        assert!(parse(&["--retry-base-ms", "9000", "--retry-max-ms", "100"]).validate().is_err());
        assert!(parse(&["--temperature", "3.5"]).validate().is_err());
        assert!(parse(&["--bind", "not an address"]).validate().is_err());
        assert!(parse(&["--base-url", "ftp://example.com"]).validate().is_err());
    }

    #[test]
    fn test_bind_accepts_names_and_ipv6() {
        let addr = parse(&["--bind", "localhost", "--port", "9000"]).socket_addr().unwrap();
        assert!(addr.ip().is_loopback());
        assert_eq!(addr.port(), 9000);

        let addr = parse(&["--bind", "::"]).socket_addr().unwrap();
        assert!(addr.is_ipv6());
        assert!(addr.ip().is_unspecified());

        let addr = parse(&["--bind", "[::1]"]).socket_addr().unwrap();
        assert!(addr.ip().is_loopback());

        assert_eq!(parse(&[]).socket_addr().unwrap().to_string(), "0.0.0.0:8000");
    }

    #[test]
    fn test_cors_origins_split_on_commas() {
        let config = parse(&["--cors-origins", "http://localhost:5173,https://prd.example.com"]);
        assert_eq!(config.cors_origins.len(), 2);
    }

    #[test]
    fn test_memory_store() {
        let config = parse(&["--store", "memory"]);
        assert!(config.build_store().unwrap().is_empty());
    }
}
