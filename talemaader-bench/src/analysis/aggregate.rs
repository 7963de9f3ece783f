//! Per-model accuracy summaries

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::reconcile::ReconciledRecord;
use crate::dataset::{DefinitionKind, Letter};

/// Model identifier to its reconciled records
pub type ModelResultSet = BTreeMap<String, Vec<ReconciledRecord>>;

/// Accuracy summary of one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_name: String,
    /// `correct_count / attempted_count`; 0.0 when nothing was attempted
    pub accuracy: f64,
    pub attempted_count: usize,
    pub correct_count: usize,
    pub undetermined_count: usize,
    pub discrepancy_count: usize,
    /// How often each letter was predicted
    pub letter_distribution: BTreeMap<Letter, usize>,
    /// Wrong answers by the kind of definition picked
    pub misinterpretations: BTreeMap<DefinitionKind, usize>,
}

impl ModelSummary {
    pub fn from_records(model_name: impl Into<String>, records: &[ReconciledRecord]) -> Self {
        let attempted_count = records.len();
        let correct_count = records.iter().filter(|r| r.is_correct).count();
        let undetermined_count = records
            .iter()
            .filter(|r| !r.predicted_label.is_determined())
            .count();
        let discrepancy_count = records.iter().filter(|r| r.is_discrepancy).count();

        let mut letter_distribution: BTreeMap<Letter, usize> =
            Letter::ALL.into_iter().map(|l| (l, 0)).collect();
        for letter in records.iter().filter_map(|r| r.predicted_label.letter()) {
            *letter_distribution.entry(letter).or_default() += 1;
        }

        let mut misinterpretations = BTreeMap::new();
        for record in records.iter().filter(|r| r.is_discrepancy) {
            let kind = record.predicted_kind.unwrap_or(DefinitionKind::Unclassified);
            *misinterpretations.entry(kind).or_default() += 1;
        }

        let accuracy = if attempted_count == 0 {
            0.0
        } else {
            correct_count as f64 / attempted_count as f64
        };

        Self {
            model_name: model_name.into(),
            accuracy,
            attempted_count,
            correct_count,
            undetermined_count,
            discrepancy_count,
            letter_distribution,
            misinterpretations,
        }
    }

    /// Share of determined answers on the most frequent letter
    pub fn position_bias(&self) -> Option<(Letter, f64)> {
        let determined: usize = self.letter_distribution.values().sum();
        if determined == 0 {
            return None;
        }
        self.letter_distribution
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(a.0)))
            .map(|(&letter, &count)| (letter, count as f64 / determined as f64))
    }
}

/// Summaries ranked by descending accuracy, ties broken by model name
pub fn aggregate(results: &ModelResultSet) -> Vec<ModelSummary> {
    let mut summaries: Vec<ModelSummary> = results
        .iter()
        .map(|(model, records)| ModelSummary::from_records(model, records))
        .collect();

    summaries.sort_by(|a, b| {
        b.accuracy
            .partial_cmp(&a.accuracy)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.model_name.cmp(&b.model_name))
    });

    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Answer;

    fn record(item_id: u32, gold: Letter, predicted: Answer) -> ReconciledRecord {
        let letter = predicted.letter();
        ReconciledRecord {
            item_id,
            gold_label: gold,
            predicted_label: predicted,
            is_correct: letter == Some(gold),
            is_discrepancy: letter.is_some_and(|l| l != gold),
            predicted_kind: letter.map(|l| {
                if l == gold {
                    DefinitionKind::True
                } else {
                    DefinitionKind::Concrete
                }
            }),
        }
    }

    #[test]
    fn test_undetermined_counts_as_attempted_and_incorrect() {
        let records = vec![
            record(1, Letter::A, Answer::Letter(Letter::A)),
            record(2, Letter::B, Answer::Undetermined),
            record(3, Letter::C, Answer::Letter(Letter::D)),
        ];
        let summary = ModelSummary::from_records("m", &records);

        assert!((summary.accuracy - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(summary.attempted_count, 3);
        assert_eq!(summary.undetermined_count, 1);
        assert_eq!(summary.discrepancy_count, 1);
        assert_eq!(summary.misinterpretations[&DefinitionKind::Concrete], 1);
        assert_eq!(summary.letter_distribution[&Letter::B], 0);
        assert_eq!(summary.letter_distribution[&Letter::D], 1);
    }

    #[test]
    fn test_empty_model_has_zero_accuracy() {
        let summary = ModelSummary::from_records("idle", &[]);
        assert_eq!(summary.accuracy, 0.0);
        assert_eq!(summary.attempted_count, 0);
        assert!(summary.position_bias().is_none());
    }

    #[test]
    fn test_ranking_with_name_tie_break() {
        let mut results = ModelResultSet::new();
        results.insert("zeta".to_string(), vec![record(1, Letter::A, Answer::Letter(Letter::A))]);
        results.insert("alpha".to_string(), vec![record(1, Letter::A, Answer::Letter(Letter::A))]);
        results.insert("mid".to_string(), vec![
            record(1, Letter::A, Answer::Letter(Letter::A)),
            record(2, Letter::B, Answer::Letter(Letter::C)),
        ]);

        let ranked: Vec<String> = aggregate(&results).into_iter().map(|s| s.model_name).collect();
        assert_eq!(ranked, vec!["alpha", "zeta", "mid"]);
    }

    #[test]
    fn test_position_bias() {
        let records = vec![
            record(1, Letter::A, Answer::Letter(Letter::A)),
            record(2, Letter::B, Answer::Letter(Letter::A)),
            record(3, Letter::C, Answer::Letter(Letter::A)),
            record(4, Letter::D, Answer::Letter(Letter::D)),
        ];
        let (letter, share) = ModelSummary::from_records("m", &records).position_bias().unwrap();
        assert_eq!(letter, Letter::A);
        assert!((share - 0.75).abs() < 1e-12);
    }
}
