//! Configuration management for the idiom benchmark
//!
//! Loads provider, model alias and run settings from TOML files and provides
//! runtime access.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::SingleYesPolicy;
use crate::normalize::Mode;
use crate::providers::QueryConfig;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Model aliases, as used on the command line and in store file names
    #[serde(default)]
    pub models: BTreeMap<String, ModelConfig>,
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
    #[serde(default)]
    pub data: DataConfig,
}

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Anthropic,
    OpenaiCompatible,
    Gemini,
}

/// Provider-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    /// Endpoint override; the client default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Requests per minute
    #[serde(default = "default_rpm")]
    pub rpm: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

/// A model alias
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub provider: String,
    pub model_id: String,
    /// Overrides the per-mode token budget from `[benchmark]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
}

/// Benchmark execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// New items per `run` invocation
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_parallel_requests")]
    pub parallel_requests: usize,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_choice_max_tokens")]
    pub choice_max_tokens: u32,
    #[serde(default = "default_verdict_max_tokens")]
    pub verdict_max_tokens: u32,
    #[serde(default)]
    pub single_yes_policy: SingleYesPolicy,
}

/// Dataset and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_options_path")]
    pub options_path: String,
    /// Separate gold labels file; `None` when the options file carries them
    #[serde(default = "default_labels_path")]
    pub labels_path: Option<String>,
    #[serde(default = "default_predictions_dir")]
    pub predictions_dir: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

// Default value functions
fn default_rpm() -> u32 { 60 }
fn default_timeout_ms() -> u64 { 60_000 }
fn default_batch_size() -> usize { 5 }
fn default_parallel_requests() -> usize { 3 }
fn default_retry_count() -> u32 { 3 }
fn default_retry_delay_ms() -> u64 { 1000 }
fn default_max_retry_delay_ms() -> u64 { 60_000 }
fn default_choice_max_tokens() -> u32 { 1 }
fn default_verdict_max_tokens() -> u32 { 3 }
fn default_options_path() -> String { "data/raw/talemaader_leverance_2_uden_labels.csv".to_string() }
fn default_labels_path() -> Option<String> { Some("data/raw/talemaader_leverance_2_kun_labels.csv".to_string()) }
fn default_predictions_dir() -> String { "data/predictions".to_string() }
fn default_output_dir() -> String { "results".to_string() }

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            parallel_requests: default_parallel_requests(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            max_retry_delay_ms: default_max_retry_delay_ms(),
            temperature: 0.0,
            choice_max_tokens: default_choice_max_tokens(),
            verdict_max_tokens: default_verdict_max_tokens(),
            single_yes_policy: SingleYesPolicy::default(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            options_path: default_options_path(),
            labels_path: default_labels_path(),
            predictions_dir: default_predictions_dir(),
            output_dir: default_output_dir(),
        }
    }
}

impl DataConfig {
    /// Labels file, if any. An empty `labels_path` means the options file
    /// carries the gold labels itself.
    pub fn labels_file(&self) -> Option<&Path> {
        self.labels_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .map(Path::new)
    }

    /// Prediction store of one model in one mode
    pub fn store_path(&self, model: &str, mode: Mode) -> PathBuf {
        Path::new(&self.predictions_dir)
            .join(mode.as_str())
            .join(format!("predicted_labels_{}.csv", model))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from default config location or return defaults
    pub fn load_or_default() -> Self {
        let config_paths = ["config/models.toml", "../config/models.toml"];

        for path in &config_paths {
            if let Ok(config) = Self::from_file(path) {
                tracing::info!("Loaded configuration from {}", path);
                return config;
            }
        }

        tracing::info!("Using default configuration");
        Self::default()
    }

    /// Save configuration to a TOML file
    pub fn save_toml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
            }
        }
        fs::write(path, content)
            .map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Resolve a model alias to its model and provider settings
    pub fn resolve(&self, alias: &str) -> Result<(&ModelConfig, &ProviderConfig), ConfigError> {
        let model = self
            .models
            .get(alias)
            .ok_or_else(|| ConfigError::UnknownModel(alias.to_string()))?;
        let provider = self
            .providers
            .get(&model.provider)
            .ok_or_else(|| ConfigError::UnknownProvider(model.provider.clone()))?;
        Ok((model, provider))
    }

    /// Query settings for one model in one mode
    pub fn query_config(&self, alias: &str, mode: Mode) -> Result<QueryConfig, ConfigError> {
        let (model, _) = self.resolve(alias)?;
        let budget = match mode {
            Mode::MultipleChoice => self.benchmark.choice_max_tokens,
            Mode::YesNo => self.benchmark.verdict_max_tokens,
        };
        Ok(QueryConfig::new(model.max_output_tokens.unwrap_or(budget))
            .with_model(&model.model_id)
            .with_temperature(self.benchmark.temperature))
    }

    /// Model aliases in name order
    pub fn model_aliases(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut providers = BTreeMap::new();
        let provider = |kind, base_url: Option<&str>, api_key_env: &str, rpm| ProviderConfig {
            kind,
            base_url: base_url.map(str::to_string),
            api_key_env: api_key_env.to_string(),
            rpm,
            timeout_ms: default_timeout_ms(),
        };

        providers.insert("anthropic".to_string(), provider(ProviderKind::Anthropic, None, "ANTHROPIC_API_KEY", 50));
        providers.insert("openai".to_string(), provider(ProviderKind::OpenaiCompatible, None, "OPENAI_API_KEY", 500));
        providers.insert("gemini".to_string(), provider(ProviderKind::Gemini, None, "GOOGLE_API_KEY", 60));
        providers.insert(
            "llama".to_string(),
            provider(ProviderKind::OpenaiCompatible, Some("https://api.llama-api.com"), "LLAMA_API_KEY", 60),
        );
        providers.insert(
            "xai".to_string(),
            provider(ProviderKind::OpenaiCompatible, Some("https://api.x.ai/v1"), "XAI_API_KEY", 60),
        );
        providers.insert(
            "deepseek".to_string(),
            provider(ProviderKind::OpenaiCompatible, Some("https://api.deepseek.com"), "DEEPSEEK_API_KEY", 60),
        );

        let mut models = BTreeMap::new();
        let aliases = [
            ("claude", "anthropic", "claude-3-sonnet-20240229"),
            ("claude-3-5-sonnet", "anthropic", "claude-3-5-sonnet-20241022"),
            ("claude-3-7-sonnet", "anthropic", "claude-3-7-sonnet-20250219"),
            ("gpt-4", "openai", "gpt-4-0125-preview"),
            ("gpt-4o", "openai", "gpt-4o"),
            ("gpt-4o-mini", "openai", "gpt-4o-mini"),
            ("gpt-3.5-turbo", "openai", "gpt-3.5-turbo-0125"),
            ("gemini", "gemini", "gemini-1.5-pro-latest"),
            ("llama", "llama", "llama3.1-70b"),
            ("grok-2", "xai", "grok-2-1212"),
            ("deepseek", "deepseek", "deepseek-chat"),
        ];
        for (alias, provider, model_id) in aliases {
            models.insert(alias.to_string(), ModelConfig {
                provider: provider.to_string(),
                model_id: model_id.to_string(),
                max_output_tokens: None,
            });
        }

        Self {
            providers,
            models,
            benchmark: BenchmarkConfig::default(),
            data: DataConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    UnknownModel(String),
    UnknownProvider(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::UnknownModel(m) => write!(f, "Unknown model alias: {}", m),
            ConfigError::UnknownProvider(p) => write!(f, "Unknown provider: {}", p),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.benchmark.batch_size, 5);
        assert_eq!(config.benchmark.choice_max_tokens, 1);
        assert_eq!(config.models.len(), 11);

        let (model, provider) = config.resolve("grok-2").unwrap();
        assert_eq!(model.model_id, "grok-2-1212");
        assert_eq!(provider.kind, ProviderKind::OpenaiCompatible);
        assert_eq!(provider.api_key_env, "XAI_API_KEY");
    }

    #[test]
    fn test_parse_toml_config() {
        let toml = r#"
[providers.local]
kind = "openai_compatible"
base_url = "http://localhost:8080/v1"
api_key_env = "LOCAL_KEY"

[models.tiny]
provider = "local"
model_id = "tiny-1b"
max_output_tokens = 2

[benchmark]
batch_size = 20
single_yes_policy = "undetermined_when_wrong"
"#;
        let config = Config::from_toml(toml).unwrap();
        assert_eq!(config.providers["local"].rpm, 60);
        assert_eq!(config.benchmark.batch_size, 20);
        assert_eq!(config.benchmark.parallel_requests, 3);
        assert_eq!(config.benchmark.single_yes_policy, SingleYesPolicy::UndeterminedWhenWrong);

        let query = config.query_config("tiny", Mode::YesNo).unwrap();
        assert_eq!(query.max_output_tokens, 2);
        assert_eq!(query.model_name.as_deref(), Some("tiny-1b"));
    }

    #[test]
    fn test_unknown_alias_and_provider() {
        let mut config = Config::default();
        assert!(matches!(config.resolve("gpt-7"), Err(ConfigError::UnknownModel(_))));

        config.models.insert("orphan".to_string(), ModelConfig {
            provider: "nowhere".to_string(),
            model_id: "x".to_string(),
            max_output_tokens: None,
        });
        assert!(matches!(config.resolve("orphan"), Err(ConfigError::UnknownProvider(_))));
    }

    #[test]
    fn test_store_path_layout() {
        let data = DataConfig::default();
        assert_eq!(
            data.store_path("gpt-4o", Mode::YesNo),
            PathBuf::from("data/predictions/yes_no/predicted_labels_gpt-4o.csv")
        );
        assert!(data.labels_file().is_some());

        let combined = DataConfig {
            labels_path: Some(String::new()),
            ..DataConfig::default()
        };
        assert!(combined.labels_file().is_none());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config").join("models.toml");
        Config::default().save_toml(&path).unwrap();

        let reloaded = Config::from_file(&path).unwrap();
        assert_eq!(reloaded.models.len(), 11);
        assert_eq!(reloaded.data.labels_path, default_labels_path());
    }
}
