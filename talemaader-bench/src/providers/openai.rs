//! OpenAI-compatible chat completions adapter
//!
//! Serves OpenAI itself and the providers exposing the same wire protocol
//! (DeepSeek, xAI Grok, the Llama API); they differ only by base URL, key
//! variable and provider name.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::anthropic::build_client;
use super::traits::{
    map_transport_error, retry_after_ms, AdapterError, AdapterResult, ModelAdapter, QueryConfig,
};
use crate::runner::rate_limiter::RateLimiter;

const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Client for any OpenAI-compatible endpoint
pub struct OpenAIClient {
    name: String,
    api_key: String,
    base_url: String,
    http_client: Client,
    rate_limiter: RateLimiter,
    default_model: String,
    timeout_ms: u64,
}

impl OpenAIClient {
    pub fn new(api_key: String) -> Self {
        Self {
            name: "openai".to_string(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
            rate_limiter: RateLimiter::new(500),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_ms: 0,
        }
    }

    /// Create from the `OPENAI_API_KEY` environment variable
    pub fn from_env() -> AdapterResult<Self> {
        Self::from_env_var("OPENAI_API_KEY")
    }

    pub fn from_env_var(var: &str) -> AdapterResult<Self> {
        let api_key = std::env::var(var)
            .map_err(|_| AdapterError::Config(format!("{} not set", var)))?;
        Ok(Self::new(api_key))
    }

    /// Provider name reported in logs and errors (e.g. "deepseek")
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
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

    pub fn with_timeout(mut self, timeout_ms: u64) -> AdapterResult<Self> {
        self.http_client = build_client(timeout_ms)?;
        self.timeout_ms = timeout_ms;
        Ok(self)
    }
}

/// Reasoning tokens count against `max_completion_tokens`, so a one-letter
/// budget would leave nothing for the answer itself.
const REASONING_MIN_COMPLETION_TOKENS: u32 = 1024;

/// o1/o3 reasoning models take `max_completion_tokens` and reject `temperature`
fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3")
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

impl<'a> ChatRequest<'a> {
    fn build(model: &'a str, prompt: &'a str, config: &QueryConfig) -> Self {
        let messages = [ChatMessage {
            role: "user",
            content: prompt,
        }];
        if is_reasoning_model(model) {
            Self {
                model,
                messages,
                max_tokens: None,
                max_completion_tokens: Some(config.max_output_tokens.max(REASONING_MIN_COMPLETION_TOKENS)),
                temperature: None,
            }
        } else {
            Self {
                model,
                messages,
                max_tokens: Some(config.max_output_tokens),
                max_completion_tokens: None,
                temperature: Some(config.temperature),
            }
        }
    }
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAIError {
    error: OpenAIErrorDetail,
}

#[derive(Deserialize)]
struct OpenAIErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
}

/// Classify a 429 body: quota exhaustion is not worth retrying
fn classify_too_many_requests(provider: &str, body: &str, retry_after_ms: u64) -> AdapterError {
    if let Ok(error) = serde_json::from_str::<OpenAIError>(body) {
        let error_type = error.error.error_type.as_deref().unwrap_or("");
        if error_type == "insufficient_quota"
            || error.error.message.contains("exceeded your current quota")
        {
            return AdapterError::Auth(format!("{} quota exceeded: {}", provider, error.error.message));
        }
        tracing::debug!("Rate limited (type={}): {}", error_type, error.error.message);
    }
    AdapterError::RateLimited { retry_after_ms }
}

#[async_trait]
impl ModelAdapter for OpenAIClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn query(&self, prompt: &str, config: &QueryConfig) -> AdapterResult<String> {
        self.rate_limiter.acquire().await;

        let model = config.model_name.as_deref().unwrap_or(&self.default_model);
        let body = ChatRequest::build(model, prompt, config);

        tracing::debug!("{} request: model={} max_tokens={}", self.name, model, config.max_output_tokens);

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_ms))?;

        let status = response.status();

        if status == 429 {
            let retry_after = retry_after_ms(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_too_many_requests(&self.name, &body, retry_after));
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OpenAIError>(&body) {
                Ok(error) => error.error.message,
                Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
            };

            if status == 401 || status == 403 {
                return Err(AdapterError::Auth(format!(
                    "{} auth error ({}): {}",
                    self.name,
                    status.as_u16(),
                    message
                )));
            }

            return Err(AdapterError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::Parse("No choices in response".to_string()))?;

        Ok(choice.message.content.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasoning_models_use_completion_tokens() {
        let config = QueryConfig::new(1);
        let body = serde_json::to_value(ChatRequest::build("o1-preview", "prompt", &config)).unwrap();
        assert_eq!(body["max_completion_tokens"], 1024);
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("temperature").is_none());

        let large = QueryConfig::new(4096);
        let body = serde_json::to_value(ChatRequest::build("o3-mini", "prompt", &large)).unwrap();
        assert_eq!(body["max_completion_tokens"], 4096);

        let body = serde_json::to_value(ChatRequest::build("gpt-4o", "prompt", &config)).unwrap();
        assert_eq!(body["max_tokens"], 1);
        assert_eq!(body["temperature"], 0.0);
    }

    #[test]
    fn test_quota_exhaustion_is_not_rate_limiting() {
        let body = r#"{"error": {"message": "You exceeded your current quota", "type": "insufficient_quota"}}"#;
        let error = classify_too_many_requests("openai", body, 1000);
        assert!(matches!(error, AdapterError::Auth(_)));
        assert!(!error.is_retryable());

        let body = r#"{"error": {"message": "Slow down", "type": "rate_limit_error"}}"#;
        let error = classify_too_many_requests("openai", body, 1000);
        assert!(matches!(error, AdapterError::RateLimited { retry_after_ms: 1000 }));
    }

    #[test]
    fn test_compatible_provider_naming() {
        let client = OpenAIClient::new("key".to_string())
            .with_name("deepseek")
            .with_base_url("https://api.deepseek.com/")
            .with_model("deepseek-chat");
        assert_eq!(client.name(), "deepseek");
        assert_eq!(client.base_url, "https://api.deepseek.com");
        assert_eq!(client.default_model(), "deepseek-chat");
    }
}
