//! Google Gemini `generateContent` adapter

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::anthropic::build_client;
use super::traits::{
    map_transport_error, retry_after_ms, AdapterError, AdapterResult, ModelAdapter, QueryConfig,
};
use crate::runner::rate_limiter::RateLimiter;

const DEFAULT_MODEL: &str = "gemini-1.5-pro-latest";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    api_key: String,
    base_url: String,
    http_client: Client,
    rate_limiter: RateLimiter,
    default_model: String,
    timeout_ms: u64,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http_client: Client::new(),
            rate_limiter: RateLimiter::new(60),
            default_model: DEFAULT_MODEL.to_string(),
            timeout_ms: 0,
        }
    }

    /// Create from the `GOOGLE_API_KEY` environment variable
    pub fn from_env() -> AdapterResult<Self> {
        Self::from_env_var("GOOGLE_API_KEY")
    }

    pub fn from_env_var(var: &str) -> AdapterResult<Self> {
        let api_key = std::env::var(var)
            .map_err(|_| AdapterError::Config(format!("{} not set", var)))?;
        Ok(Self::new(api_key))
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

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

/// Text of the first candidate. A blocked prompt yields empty text, which
/// the normalizer treats as undetermined.
fn candidate_text(response: GenerateResponse) -> AdapterResult<String> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        tracing::warn!("Gemini blocked the prompt: {}", reason);
        return Ok(String::new());
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AdapterError::Parse("No candidates in response".to_string()))?;

    Ok(candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default())
}

#[async_trait]
impl ModelAdapter for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn query(&self, prompt: &str, config: &QueryConfig) -> AdapterResult<String> {
        self.rate_limiter.acquire().await;

        let model = config.model_name.as_deref().unwrap_or(&self.default_model);
        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                candidate_count: 1,
            },
        };

        let response = self
            .http_client
            .post(format!("{}/models/{}:generateContent", self.base_url, model))
            .header("x-goog-api-key", &self.api_key)
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
            let message = match serde_json::from_str::<GeminiError>(&body) {
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

        let api_response: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Parse(e.to_string()))?;

        candidate_text(api_response)
    }
}
