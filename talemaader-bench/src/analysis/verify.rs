//! Prediction store consistency checks

use serde::Serialize;

use crate::dataset::{Dataset, ItemId};
use crate::store::PredictionLog;

/// Findings for one prediction store
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub model_name: String,
    pub total_records: usize,
    pub malformed_rows: usize,
    /// Dataset items with no record at all
    pub missing: Vec<ItemId>,
    /// Record ids absent from the dataset
    pub unmatched: Vec<ItemId>,
    /// Items with superseded records, and their record counts
    pub duplicates: Vec<(ItemId, usize)>,
    /// Items whose latest record is undetermined
    pub undetermined: Vec<ItemId>,
}

impl VerificationReport {
    /// Every dataset item has a determined prediction
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.undetermined.is_empty()
    }

    /// Whether the store holds anything a reader would ignore
    pub fn has_anomalies(&self) -> bool {
        self.malformed_rows > 0 || !self.unmatched.is_empty()
    }
}

/// Check a store against the dataset
pub fn verify_store(model_name: &str, predictions: &PredictionLog, dataset: &Dataset) -> VerificationReport {
    let latest = predictions.latest();

    let missing = dataset
        .items()
        .iter()
        .map(|item| item.id())
        .filter(|id| !latest.contains_key(id))
        .collect();

    let unmatched = latest
        .keys()
        .copied()
        .filter(|&id| !dataset.contains(id))
        .collect();

    let undetermined = latest
        .iter()
        .filter(|(id, record)| dataset.contains(**id) && !record.answer.is_determined())
        .map(|(&id, _)| id)
        .collect();

    VerificationReport {
        model_name: model_name.to_string(),
        total_records: predictions.len(),
        malformed_rows: predictions.malformed(),
        missing,
        unmatched,
        duplicates: predictions.duplicates(),
        undetermined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{IdiomItem, Letter};
    use crate::normalize::Answer;
    use crate::store::PredictionRecord;

    fn dataset() -> Dataset {
        let items = (1..=4)
            .map(|id| IdiomItem::from_options(id, format!("udtryk {}", id), ["a", "b", "c", "d"], Letter::A).unwrap())
            .collect();
        Dataset::from_items(items)
    }

    #[test]
    fn test_verify_store_findings() {
        let log = PredictionLog::new(vec![
            PredictionRecord::new(1, Answer::Letter(Letter::A), "A"),
            PredictionRecord::new(2, Answer::Undetermined, "ERROR: timeout"),
            PredictionRecord::new(1, Answer::Letter(Letter::B), "B"),
            PredictionRecord::new(42, Answer::Letter(Letter::C), "C"),
        ]);
        let report = verify_store("gpt-4o", &log, &dataset());

        assert_eq!(report.total_records, 4);
        assert_eq!(report.missing, vec![3, 4]);
        assert_eq!(report.unmatched, vec![42]);
        assert_eq!(report.duplicates, vec![(1, 2)]);
        assert_eq!(report.undetermined, vec![2]);
        assert!(!report.is_complete());
        assert!(report.has_anomalies());
    }

    #[test]
    fn test_complete_store() {
        let log = PredictionLog::new(
            (1..=4)
                .map(|id| PredictionRecord::new(id, Answer::Letter(Letter::D), "D"))
                .collect(),
        );
        let report = verify_store("claude", &log, &dataset());
        assert!(report.is_complete());
        assert!(!report.has_anomalies());
    }
}
