//! In-process adapter with canned replies, for offline runs and tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::traits::{AdapterError, AdapterResult, ModelAdapter, QueryConfig};

/// A canned reply. Errors are rebuilt on every use since `AdapterError`
/// is not `Clone`.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Text(String),
    ApiError { status: u16, message: String },
    RateLimited { retry_after_ms: u64 },
    AuthError(String),
    Timeout,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply::Text(text.into())
    }

    fn to_result(&self) -> AdapterResult<String> {
        match self {
            Reply::Text(text) => Ok(text.clone()),
            Reply::ApiError { status, message } => Err(AdapterError::Api {
                status: *status,
                message: message.clone(),
            }),
            Reply::RateLimited { retry_after_ms } => Err(AdapterError::RateLimited {
                retry_after_ms: *retry_after_ms,
            }),
            Reply::AuthError(message) => Err(AdapterError::Auth(message.clone())),
            Reply::Timeout => Err(AdapterError::Timeout { timeout_ms: 0 }),
        }
    }
}

struct Rule {
    pattern: String,
    /// Consumed front to back; the last reply repeats
    replies: Vec<Reply>,
}

/// Adapter answering from a script keyed by prompt substrings.
///
/// The first rule whose pattern occurs in the prompt answers. Prompts
/// matching no rule get the fallback reply.
pub struct ScriptedAdapter {
    model: String,
    rules: Mutex<Vec<Rule>>,
    fallback: Reply,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            rules: Mutex::new(Vec::new()),
            fallback: Reply::text(""),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Adapter returning the same text for every prompt
    pub fn with_response(text: &str) -> Self {
        Self::new().with_fallback(Reply::text(text))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_fallback(mut self, reply: Reply) -> Self {
        self.fallback = reply;
        self
    }

    /// Answer prompts containing `pattern` with `reply`
    pub fn on(self, pattern: impl Into<String>, reply: Reply) -> Self {
        self.on_sequence(pattern, vec![reply])
    }

    /// Answer prompts containing `pattern` with `replies` in order
    pub fn on_sequence(self, pattern: impl Into<String>, replies: Vec<Reply>) -> Self {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                pattern: pattern.into(),
                replies,
            });
        }
        self
    }

    /// Number of `query` calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in arrival order
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn next_reply(&self, prompt: &str) -> Reply {
        let Ok(mut rules) = self.rules.lock() else {
            return self.fallback.clone();
        };
        match rules.iter_mut().find(|rule| prompt.contains(&rule.pattern)) {
            Some(rule) if rule.replies.len() > 1 => rule.replies.remove(0),
            Some(rule) => rule.replies.first().cloned().unwrap_or_else(|| self.fallback.clone()),
            None => self.fallback.clone(),
        }
    }
}

impl Default for ScriptedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        &self.model
    }

    async fn query(&self, prompt: &str, _config: &QueryConfig) -> AdapterResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.next_reply(prompt).to_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rules_match_by_substring() {
        let adapter = ScriptedAdapter::new()
            .on("slå to fluer", Reply::text("B"))
            .with_fallback(Reply::text("A"));
        let config = QueryConfig::default();

        assert_eq!(adapter.query("Sentence: slå to fluer med ét smæk", &config).await.unwrap(), "B");
        assert_eq!(adapter.query("Sentence: noget andet", &config).await.unwrap(), "A");
        assert_eq!(adapter.call_count(), 2);
        assert_eq!(adapter.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_sequence_then_sticky_last_reply() {
        let adapter = ScriptedAdapter::new().on_sequence(
            "x",
            vec![Reply::ApiError { status: 503, message: "busy".to_string() }, Reply::text("C")],
        );
        let config = QueryConfig::default();

        assert!(matches!(adapter.query("x", &config).await, Err(AdapterError::Api { status: 503, .. })));
        assert_eq!(adapter.query("x", &config).await.unwrap(), "C");
        assert_eq!(adapter.query("x", &config).await.unwrap(), "C");
    }
}
