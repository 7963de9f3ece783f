//! Model adapter implementations

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod scripted;
pub mod traits;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;
pub use scripted::{Reply, ScriptedAdapter};
pub use traits::{AdapterError, AdapterResult, ModelAdapter, QueryConfig};

use crate::config::{Config, ProviderKind};
use std::sync::Arc;

/// Build the adapter serving a model alias, applying its provider settings
pub fn create_adapter(alias: &str, config: &Config) -> AdapterResult<Arc<dyn ModelAdapter>> {
    let (model, provider) = config
        .resolve(alias)
        .map_err(|e| AdapterError::Config(e.to_string()))?;

    let adapter: Arc<dyn ModelAdapter> = match provider.kind {
        ProviderKind::Anthropic => {
            let mut client = AnthropicClient::from_env_var(&provider.api_key_env)?
                .with_rate_limit(provider.rpm)
                .with_model(&model.model_id)
                .with_timeout(provider.timeout_ms)?;
            if let Some(url) = &provider.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        ProviderKind::OpenaiCompatible => {
            let mut client = OpenAIClient::from_env_var(&provider.api_key_env)?
                .with_name(&model.provider)
                .with_rate_limit(provider.rpm)
                .with_model(&model.model_id)
                .with_timeout(provider.timeout_ms)?;
            if let Some(url) = &provider.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
        ProviderKind::Gemini => {
            let mut client = GeminiClient::from_env_var(&provider.api_key_env)?
                .with_rate_limit(provider.rpm)
                .with_model(&model.model_id)
                .with_timeout(provider.timeout_ms)?;
            if let Some(url) = &provider.base_url {
                client = client.with_base_url(url);
            }
            Arc::new(client)
        }
    };

    tracing::debug!("Created {} adapter for {} ({})", adapter.name(), alias, model.model_id);
    Ok(adapter)
}
