//! Anthropic (Claude) Messages API adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::traits::{
    map_transport_error, retry_after_ms, AdapterError, AdapterResult, ModelAdapter, QueryConfig,
};
use crate::runner::rate_limiter::RateLimiter;

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    rate_limiter: RateLimiter,
    default_model: String,
    timeout_ms: u64,
}

impl AnthropicClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
            rate_limiter: RateLimiter::new(50),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_ms: 0,
        }
    }

    /// Create from the `ANTHROPIC_API_KEY` environment variable
    pub fn from_env() -> AdapterResult<Self> {
        Self::from_env_var("ANTHROPIC_API_KEY")
    }

    pub fn from_env_var(var: &str) -> AdapterResult<Self> {
        let api_key = std::env::var(var)
            .map_err(|_| AdapterError::Config(format!("{} not set", var)))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_rate_limit(mut self, rpm: u32) -> Self {
        self.rate_limiter = RateLimiter::new(rpm);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Transport timeout; `0` leaves requests unbounded
    pub fn with_timeout(mut self, timeout_ms: u64) -> AdapterResult<Self> {
        self.http_client = build_client(timeout_ms)?;
        self.timeout_ms = timeout_ms;
        Ok(self)
    }
}

pub(crate) fn build_client(timeout_ms: u64) -> AdapterResult<Client> {
    let mut builder = Client::builder();
    if timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(timeout_ms));
    }
    builder.build().map_err(AdapterError::Http)
}

#[derive(Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: [AnthropicMessage<'a>; 1],
}

#[derive(Serialize)]
struct AnthropicMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct AnthropicError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Concatenate the text blocks of a response
fn response_text(response: AnthropicResponse) -> String {
    response
        .content
        .into_iter()
        .filter(|block| block.content_type == "text")
        .filter_map(|block| block.text)
        .collect()
}

#[async_trait]
impl ModelAdapter for AnthropicClient {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn query(&self, prompt: &str, config: &QueryConfig) -> AdapterResult<String> {
        self.rate_limiter.acquire().await;

        let model = config.model_name.as_deref().unwrap_or(&self.default_model);
        let body = AnthropicRequest {
            model,
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            messages: [AnthropicMessage {
                role: "user",
                content: prompt,
            }],
        };

        tracing::debug!("anthropic request: model={} max_tokens={}", model, config.max_output_tokens);

        let response = self
            .http_client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_ms))?;

        let status = response.status();

        if status == 429 {
            return Err(AdapterError::RateLimited {
                retry_after_ms: retry_after_ms(response.headers()),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<AnthropicError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };
            if status == 401 || status == 403 {
                return Err(AdapterError::Auth(message));
            }
            return Err(AdapterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        Ok(response_text(api_response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_skips_non_text_blocks() {
        let response: AnthropicResponse = serde_json::from_str(
            r#"{"content": [{"type": "thinking", "thinking": "hmm"}, {"type": "text", "text": "B"}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(response), "B");
    }

    #[test]
    fn test_request_shape() {
        let body = AnthropicRequest {
            model: "claude-3-7-sonnet-20250219",
            max_tokens: 1,
            temperature: 0.0,
            messages: [AnthropicMessage {
                role: "user",
                content: "Hvad betyder det?",
            }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 1);
        assert_eq!(json["messages"][0]["role"], "user");
    }

    #[test]
    fn test_builder_settings() {
        let client = AnthropicClient::new("key".to_string()).with_model("claude-3-sonnet-20240229");
        assert_eq!(client.default_model(), "claude-3-sonnet-20240229");
        assert_eq!(client.name(), "anthropic");
    }
}
