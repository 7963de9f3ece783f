//! Danish idiom (talemåder) benchmark for LLMs
//!
//! This crate measures how well language models pick the true definition of
//! a Danish idiom among four candidates. Models are queried either with one
//! multiple-choice prompt per idiom or with four yes/no prompts, one per
//! definition.
//!
//! # Features
//!
//! - Anthropic, OpenAI-compatible (OpenAI, DeepSeek, xAI, Llama API) and
//!   Gemini adapters behind one [`providers::ModelAdapter`] contract
//! - Total response normalization: ambiguous output is undetermined, never
//!   an error
//! - Resumable batches over an append-only prediction store
//! - Gold-label reconciliation, discrepancy analysis and per-model accuracy
//!
//! # Example
//!
//! ```no_run
//! use talemaader_bench::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_or_default();
//!     let dataset = load_dataset(&config.data.options_path, config.data.labels_file())?;
//!
//!     // Query the next batch of unanswered idioms
//!     let adapter = create_adapter("gpt-4o", &config)?;
//!     let runner = BatchRunner::new(RunnerConfig::for_model(&config, "gpt-4o")?);
//!     let store_path = config.data.store_path("gpt-4o", Mode::MultipleChoice);
//!     let existing = PredictionLog::load(&store_path)?;
//!     let outcome = runner
//!         .run(&dataset, adapter, Mode::MultipleChoice, existing, Some(PredictionStore::open(&store_path)?))
//!         .await?;
//!
//!     // Score what has been answered so far
//!     let reconciled = reconcile(&outcome.predictions, &dataset, SingleYesPolicy::Determined);
//!     let mut results = ModelResultSet::new();
//!     results.insert("gpt-4o".to_string(), reconciled.records);
//!     print_console_report(Mode::MultipleChoice, &aggregate(&results));
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod dataset;
pub mod normalize;
pub mod providers;
pub mod reporting;
pub mod runner;
pub mod store;

pub use config::Config;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::analysis::{
        aggregate, reconcile, verify_store, ModelResultSet, ModelSummary, ReconciledRecord,
        SingleYesPolicy,
    };
    pub use crate::config::Config;
    pub use crate::dataset::{load_dataset, Dataset, IdiomItem, Letter};
    pub use crate::normalize::{normalize, Answer, Label, Mode, Verdict};
    pub use crate::providers::{create_adapter, AdapterError, ModelAdapter, QueryConfig};
    pub use crate::reporting::{print_console_report, JsonSummary};
    pub use crate::runner::{BatchRunner, RunOutcome, RunnerConfig};
    pub use crate::store::{PredictionLog, PredictionRecord, PredictionStore};
}
