//! Resumable batch runner
//!
//! Queries a model for the items that do not yet have a determined
//! prediction, at most `batch_size` of them per run. Every completed item is
//! appended to the prediction store right away, so an interrupted run leaves
//! valid records behind and the next run picks up where it stopped.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;

use crate::config::Config;
use crate::dataset::{Dataset, IdiomItem, ItemId, Letter};
use crate::normalize::{normalize_choice, normalize_verdict, Answer, Mode, Verdict};
use crate::providers::{AdapterError, ModelAdapter, QueryConfig};
use crate::store::{PredictionLog, PredictionRecord, PredictionStore, StoreError};

use super::prompts::{choice_prompt, verdict_prompt};

/// Configuration for the runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum new items per run
    pub batch_size: usize,
    /// Maximum concurrent adapter calls
    pub parallel_requests: usize,
    /// Number of retries on a retryable failure
    pub retry_count: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Query settings for multiple-choice prompts
    pub choice_query: QueryConfig,
    /// Query settings for yes/no prompts
    pub verdict_query: QueryConfig,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            parallel_requests: 3,
            retry_count: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            choice_query: QueryConfig::new(1),
            verdict_query: QueryConfig::new(3),
        }
    }
}

impl RunnerConfig {
    /// Runner settings for one model alias
    pub fn for_model(config: &Config, alias: &str) -> Result<Self, crate::config::ConfigError> {
        let bench = &config.benchmark;
        Ok(Self {
            batch_size: bench.batch_size,
            parallel_requests: bench.parallel_requests,
            retry_count: bench.retry_count,
            retry_delay_ms: bench.retry_delay_ms,
            max_retry_delay_ms: bench.max_retry_delay_ms,
            choice_query: config.query_config(alias, Mode::MultipleChoice)?,
            verdict_query: config.query_config(alias, Mode::YesNo)?,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }
}

/// Whole-run failures; single-item failures are recorded as data instead
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one run
#[derive(Debug)]
pub struct RunOutcome {
    /// Existing records followed by the ones written in this run
    pub predictions: PredictionLog,
    /// Items queried in this run, in dataset order
    pub attempted: Vec<ItemId>,
    /// Attempted items whose adapter calls failed or whose task panicked
    pub failures: usize,
    /// Attempted items left undetermined, failures included
    pub undetermined: usize,
    /// Dataset items still without a determined prediction
    pub remaining: usize,
}

/// Fold the four yes/no verdicts of an item into a letter.
///
/// Exactly one YES names that definition. No YES, several YES, or any
/// undetermined verdict gives no answer.
pub fn fold_verdicts(verdicts: &[Verdict; 4]) -> Answer {
    if verdicts.contains(&Verdict::Undetermined) {
        return Answer::Undetermined;
    }
    let mut yes = Letter::ALL
        .into_iter()
        .filter(|l| verdicts[l.index()] == Verdict::Yes);
    match (yes.next(), yes.next()) {
        (Some(letter), None) => Answer::Letter(letter),
        _ => Answer::Undetermined,
    }
}

/// Runs a model over the pending items of a dataset
pub struct BatchRunner {
    config: RunnerConfig,
    semaphore: Arc<Semaphore>,
}

impl BatchRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.parallel_requests.max(1)));
        Self { config, semaphore }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Query the next batch of pending items.
    ///
    /// Items whose latest record in `existing` is determined are never
    /// queried again. With a store, each finished item is appended as soon
    /// as it completes.
    pub async fn run(
        &self,
        dataset: &Dataset,
        adapter: Arc<dyn ModelAdapter>,
        mode: Mode,
        existing: PredictionLog,
        store: Option<PredictionStore>,
    ) -> Result<RunOutcome, RunError> {
        if !dataset.rejected().is_empty() {
            tracing::warn!("{} dataset rows were rejected and will not be queried", dataset.rejected().len());
        }

        let mut settled = existing.settled_ids();
        let batch = select_batch(dataset, &existing, &settled, self.config.batch_size);

        tracing::info!(
            "Running {} ({}) in {} mode: {} of {} items pending, {} in this batch",
            adapter.name(),
            adapter.default_model(),
            mode,
            dataset.items().iter().filter(|i| !settled.contains(&i.id())).count(),
            dataset.len(),
            batch.len()
        );

        let store = store.map(|s| Arc::new(Mutex::new(s)));
        let mut handles = Vec::with_capacity(batch.len());

        for item in batch {
            let item_id = item.id();
            let worker = self.clone_for_task();
            let adapter = adapter.clone();
            let store = store.clone();

            let handle = tokio::spawn(async move {
                let (record, failed) = worker.process_item(&item, adapter.as_ref(), mode).await;
                if let Some(store) = store {
                    store.lock().await.append(&record)?;
                }
                Ok::<_, StoreError>((record, failed))
            });
            handles.push((item_id, handle));
        }

        let mut predictions = existing;
        let mut attempted = Vec::new();
        let mut failures = 0;
        let mut undetermined = 0;
        let mut fatal = None;

        for (item_id, handle) in handles {
            match handle.await {
                Ok(Ok((record, failed))) => {
                    attempted.push(record.item_id);
                    if failed {
                        failures += 1;
                    }
                    if record.answer.is_determined() {
                        settled.insert(record.item_id);
                    } else {
                        undetermined += 1;
                    }
                    predictions.push(record);
                }
                Ok(Err(e)) => {
                    tracing::error!("Failed to write prediction: {}", e);
                    fatal.get_or_insert(e);
                }
                Err(e) => {
                    // nothing was stored, so the item stays pending
                    tracing::error!("Task for item {} panicked: {}", item_id, e);
                    attempted.push(item_id);
                    failures += 1;
                    undetermined += 1;
                }
            }
        }

        if let Some(e) = fatal {
            return Err(e.into());
        }

        let remaining = remaining_items(dataset, &settled);
        tracing::info!(
            "Batch done: {} attempted, {} undetermined ({} failed), {} items remaining",
            attempted.len(),
            undetermined,
            failures,
            remaining
        );

        Ok(RunOutcome {
            predictions,
            attempted,
            failures,
            undetermined,
            remaining,
        })
    }

    /// Query one item; returns the record and whether an adapter call failed
    async fn process_item(
        &self,
        item: &IdiomItem,
        adapter: &dyn ModelAdapter,
        mode: Mode,
    ) -> (PredictionRecord, bool) {
        match mode {
            Mode::MultipleChoice => {
                let prompt = choice_prompt(item);
                match self.query_with_retry(adapter, &prompt, &self.config.choice_query, item.id()).await {
                    Ok(raw) => {
                        let answer = normalize_choice(&raw);
                        if !answer.is_determined() {
                            tracing::warn!("Item {}: undetermined response {:?}", item.id(), raw);
                        }
                        (PredictionRecord::new(item.id(), answer, raw), false)
                    }
                    Err(e) => (
                        PredictionRecord::new(item.id(), Answer::Undetermined, format!("ERROR: {}", e)),
                        true,
                    ),
                }
            }
            Mode::YesNo => {
                let mut verdicts = [Verdict::Undetermined; 4];
                let mut responses = Vec::with_capacity(4);
                let mut failed = false;

                for letter in Letter::ALL {
                    let prompt = verdict_prompt(item.idiom(), &item.definition(letter).text);
                    match self.query_with_retry(adapter, &prompt, &self.config.verdict_query, item.id()).await {
                        Ok(raw) => {
                            verdicts[letter.index()] = normalize_verdict(&raw);
                            responses.push(raw);
                        }
                        Err(e) => {
                            failed = true;
                            responses.push(format!("ERROR: {}", e));
                        }
                    }
                }

                let answer = fold_verdicts(&verdicts);
                tracing::debug!("Item {}: verdicts {:?} -> {}", item.id(), verdicts, answer);
                // JSON array of the four outputs in A..D order
                let raw_response = serde_json::Value::from(responses).to_string();
                let record = PredictionRecord::new(item.id(), answer, raw_response).with_verdicts(verdicts);
                (record, failed)
            }
        }
    }

    /// One adapter call with the retry policy applied
    async fn query_with_retry(
        &self,
        adapter: &dyn ModelAdapter,
        prompt: &str,
        query: &QueryConfig,
        item_id: ItemId,
    ) -> Result<String, AdapterError> {
        let mut delay = self.config.retry_delay_ms;
        let mut attempt = 0;

        loop {
            let result = {
                let _permit = self.semaphore.acquire().await;
                adapter.query(prompt, query).await
            };

            let error = match result {
                Ok(raw) => return Ok(raw),
                Err(e) => e,
            };

            if !error.is_retryable() || attempt >= self.config.retry_count {
                tracing::error!("Error on {} for item {}: {}", adapter.name(), item_id, error);
                return Err(error);
            }

            attempt += 1;
            let wait = match &error {
                AdapterError::RateLimited { retry_after_ms } => {
                    tracing::warn!("Rate limited on {}, waiting {}ms", adapter.name(), retry_after_ms);
                    (*retry_after_ms).min(self.config.max_retry_delay_ms)
                }
                _ => delay,
            };
            tracing::info!("Retry {} for item {} on {}: {}", attempt, item_id, adapter.name(), error);
            sleep(Duration::from_millis(wait)).await;
            delay = (delay * 2).min(self.config.max_retry_delay_ms);
        }
    }

    /// Clone the runner for spawning item tasks
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            semaphore: self.semaphore.clone(),
        }
    }
}

/// Items never queried come first, in dataset order; leftover slots retry
/// items whose latest answer is undetermined.
fn select_batch(
    dataset: &Dataset,
    existing: &PredictionLog,
    settled: &HashSet<ItemId>,
    batch_size: usize,
) -> Vec<IdiomItem> {
    let latest = existing.latest();
    let fresh = dataset.items().iter().filter(|item| !latest.contains_key(&item.id()));
    let retry = dataset
        .items()
        .iter()
        .filter(|item| latest.contains_key(&item.id()) && !settled.contains(&item.id()));

    let chosen: HashSet<ItemId> = fresh.chain(retry).take(batch_size).map(IdiomItem::id).collect();
    dataset
        .items()
        .iter()
        .filter(|item| chosen.contains(&item.id()))
        .cloned()
        .collect()
}

fn remaining_items(dataset: &Dataset, settled: &HashSet<ItemId>) -> usize {
    dataset
        .items()
        .iter()
        .filter(|item| !settled.contains(&item.id()))
        .count()
}
