//! Model adapter contract shared by every backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Per-call options understood by every adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Backend model id; the adapter's default model when `None`
    pub model_name: Option<String>,
    /// Only a label is expected, so this stays minimal
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl QueryConfig {
    pub fn new(max_output_tokens: u32) -> Self {
        Self {
            model_name: None,
            max_output_tokens,
            temperature: 0.0,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_name = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Failure at the adapter boundary
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdapterError {
    /// Whether another attempt could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AdapterError::Http(e) => !e.is_builder() && !e.is_decode(),
            AdapterError::Api { status, .. } => *status >= 500,
            AdapterError::RateLimited { .. } | AdapterError::Timeout { .. } => true,
            AdapterError::Auth(_) | AdapterError::Parse(_) | AdapterError::Config(_) => false,
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// A model backend.
///
/// One `query` is one network call. Adapters never retry; the batch runner
/// owns the retry policy.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Provider name (e.g. "anthropic", "openai", "gemini")
    fn name(&self) -> &str;

    /// Model used when the query config names none
    fn default_model(&self) -> &str;

    /// Send a prompt and return the raw response text
    async fn query(&self, prompt: &str, config: &QueryConfig) -> AdapterResult<String>;
}

/// Read an HTTP `retry-after` header (seconds), defaulting to a minute
pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(60)
        * 1000
}

/// Map a reqwest error, turning transport timeouts into [`AdapterError::Timeout`]
pub(crate) fn map_transport_error(error: reqwest::Error, timeout_ms: u64) -> AdapterError {
    if error.is_timeout() {
        AdapterError::Timeout { timeout_ms }
    } else {
        AdapterError::Http(error)
    }
}
