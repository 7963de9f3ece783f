//! CSV reports: gold-joined predictions, discrepancies, accuracy summary

use std::fs;
use std::path::Path;

use serde::Serialize;

use super::ReportError;
use crate::analysis::{ModelSummary, ReconciledRecord};
use crate::dataset::{Dataset, ItemId};

#[derive(Serialize)]
struct GoldJoinedRow {
    item_id: ItemId,
    gold_label: String,
    predicted_label: String,
    is_correct: bool,
    is_discrepancy: bool,
}

/// One wrong, determined answer with the definitions involved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscrepancyRow {
    pub item_id: ItemId,
    pub idiom: String,
    pub predicted_label: String,
    pub gold_label: String,
    pub predicted_definition: String,
    pub true_definition: String,
    pub misinterpretation: String,
}

const GOLD_JOINED_HEADER: [&str; 5] = ["item_id", "gold_label", "predicted_label", "is_correct", "is_discrepancy"];

const DISCREPANCY_HEADER: [&str; 7] = [
    "item_id",
    "idiom",
    "predicted_label",
    "gold_label",
    "predicted_definition",
    "true_definition",
    "misinterpretation",
];

#[derive(Serialize)]
struct SummaryRow<'a> {
    model_name: &'a str,
    accuracy: f64,
    attempted_count: usize,
    undetermined_count: usize,
    correct_count: usize,
    discrepancy_count: usize,
}

fn writer_for(path: &Path) -> Result<csv::Writer<fs::File>, ReportError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|source| ReportError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(csv::Writer::from_path(path)?)
}

/// `item_id, gold_label, predicted_label, is_correct, is_discrepancy`
pub fn write_gold_joined(path: impl AsRef<Path>, records: &[ReconciledRecord]) -> Result<(), ReportError> {
    let mut writer = writer_for(path.as_ref())?;
    // serialize only emits the header along with a first row
    if records.is_empty() {
        writer.write_record(GOLD_JOINED_HEADER)?;
    }
    for record in records {
        writer.serialize(GoldJoinedRow {
            item_id: record.item_id,
            gold_label: record.gold_label.to_string(),
            predicted_label: record.predicted_label.to_string(),
            is_correct: record.is_correct,
            is_discrepancy: record.is_discrepancy,
        })?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Discrepancy details for the records of one model
pub fn discrepancy_rows(records: &[ReconciledRecord], dataset: &Dataset) -> Vec<DiscrepancyRow> {
    records
        .iter()
        .filter(|r| r.is_discrepancy)
        .filter_map(|record| {
            let item = dataset.get(record.item_id)?;
            let predicted = record.predicted_label.letter()?;
            let chosen = item.definition(predicted);
            Some(DiscrepancyRow {
                item_id: record.item_id,
                idiom: item.idiom().to_string(),
                predicted_label: predicted.to_string(),
                gold_label: record.gold_label.to_string(),
                predicted_definition: chosen.text.clone(),
                true_definition: item.definition(record.gold_label).text.clone(),
                misinterpretation: chosen.kind.to_string(),
            })
        })
        .collect()
}

pub fn write_discrepancies(path: impl AsRef<Path>, rows: &[DiscrepancyRow]) -> Result<(), ReportError> {
    let mut writer = writer_for(path.as_ref())?;
    if rows.is_empty() {
        writer.write_record(DISCREPANCY_HEADER)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    Ok(())
}

/// `model_name, accuracy, attempted_count, undetermined_count, correct_count, discrepancy_count`
pub fn write_summary(path: impl AsRef<Path>, summaries: &[ModelSummary]) -> Result<(), ReportError> {
    let mut writer = writer_for(path.as_ref())?;
    for summary in summaries {
        writer.serialize(SummaryRow {
            model_name: &summary.model_name,
            accuracy: summary.accuracy,
            attempted_count: summary.attempted_count,
            undetermined_count: summary.undetermined_count,
            correct_count: summary.correct_count,
            discrepancy_count: summary.discrepancy_count,
        })?;
    }
    writer.flush().map_err(|source| ReportError::Io {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    Ok(())
}
