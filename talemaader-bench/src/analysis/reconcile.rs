//! Joining predictions with gold labels

use serde::{Deserialize, Serialize};

use crate::dataset::{Dataset, DefinitionKind, IdiomItem, ItemId, Letter};
use crate::normalize::Answer;
use crate::store::{PredictionLog, PredictionRecord};

/// How to read a yes/no prediction whose single YES is on a wrong definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleYesPolicy {
    /// A determined, incorrect answer
    #[default]
    Determined,
    /// No answer: the model rejected the true definition without
    /// committing to another one
    UndeterminedWhenWrong,
}

/// A prediction whose item is not in the gold set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("prediction for item {item_id} has no gold label")]
pub struct JoinMismatchError {
    pub item_id: ItemId,
}

/// One prediction checked against its gold label
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledRecord {
    pub item_id: ItemId,
    pub gold_label: Letter,
    pub predicted_label: Answer,
    /// False for undetermined and mismatched predictions
    pub is_correct: bool,
    /// Determined and different from gold
    pub is_discrepancy: bool,
    /// Kind of the definition the model picked
    pub predicted_kind: Option<DefinitionKind>,
}

impl ReconciledRecord {
    fn new(item: &IdiomItem, predicted_label: Answer) -> Self {
        let gold_label = item.gold_label();
        let predicted = predicted_label.letter();
        Self {
            item_id: item.id(),
            gold_label,
            predicted_label,
            is_correct: predicted == Some(gold_label),
            is_discrepancy: predicted.is_some_and(|l| l != gold_label),
            predicted_kind: predicted.map(|l| item.definition(l).kind),
        }
    }
}

/// Output of [`reconcile`]
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    /// In dataset order; items never predicted are absent
    pub records: Vec<ReconciledRecord>,
    pub unmatched: Vec<JoinMismatchError>,
}

/// Join the active prediction of each item with its gold label
pub fn reconcile(predictions: &PredictionLog, gold: &Dataset, policy: SingleYesPolicy) -> Reconciliation {
    let latest = predictions.latest();

    let records = gold
        .items()
        .iter()
        .filter_map(|item| {
            let record = latest.get(&item.id())?;
            Some(ReconciledRecord::new(item, apply_policy(record, item, policy)))
        })
        .collect();

    let unmatched: Vec<JoinMismatchError> = latest
        .keys()
        .filter(|id| !gold.contains(**id))
        .map(|&item_id| JoinMismatchError { item_id })
        .collect();

    for mismatch in &unmatched {
        tracing::warn!("{}; excluded from accuracy", mismatch);
    }

    Reconciliation { records, unmatched }
}

fn apply_policy(record: &PredictionRecord, item: &IdiomItem, policy: SingleYesPolicy) -> Answer {
    match (policy, record.verdicts, record.answer) {
        (SingleYesPolicy::UndeterminedWhenWrong, Some(_), Answer::Letter(l)) if l != item.gold_label() => {
            Answer::Undetermined
        }
        _ => record.answer,
    }
}
