//! Results reporting

pub mod csv_writer;

pub use csv_writer::{
    discrepancy_rows, write_discrepancies, write_gold_joined, write_summary, DiscrepancyRow,
};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::analysis::{ModelSummary, VerificationReport};
use crate::normalize::Mode;

/// Report output errors
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// JSON summary export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonSummary {
    pub run_id: String,
    pub timestamp: String,
    pub mode: Mode,
    pub dataset_items: usize,
    /// Ranked, best first
    pub models: Vec<ModelSummary>,
}

impl JsonSummary {
    pub fn new(run_id: impl Into<String>, mode: Mode, dataset_items: usize, models: Vec<ModelSummary>) -> Self {
        Self {
            run_id: run_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            mode,
            dataset_items,
            models,
        }
    }

    /// Write to JSON file
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), ReportError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json).map_err(|source| ReportError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}

/// Generate a console report
pub fn print_console_report(mode: Mode, summaries: &[ModelSummary]) {
    println!("\n=== Talemåder Benchmark Results ({}) ===\n", mode);

    println!("Model Rankings:");
    println!("{:-<50}", "");

    for (i, summary) in summaries.iter().enumerate() {
        println!(
            "  {}. {} - Accuracy: {:.1}% ({}/{}), Undetermined: {}, Discrepancies: {}",
            i + 1,
            summary.model_name,
            summary.accuracy * 100.0,
            summary.correct_count,
            summary.attempted_count,
            summary.undetermined_count,
            summary.discrepancy_count
        );
    }

    println!("\nPredicted Letter Distribution:");
    println!("{:-<50}", "");
    for summary in summaries {
        let counts: Vec<String> = summary
            .letter_distribution
            .iter()
            .map(|(letter, count)| format!("{}={}", letter, count))
            .collect();
        print!("  {}: {}", summary.model_name, counts.join(" "));
        match summary.position_bias() {
            Some((letter, share)) if share > 0.4 => {
                println!("  (favors {} at {:.0}%)", letter, share * 100.0)
            }
            _ => println!(),
        }
    }

    if summaries.iter().any(|s| !s.misinterpretations.is_empty()) {
        println!("\nMisinterpretations:");
        println!("{:-<50}", "");
        for summary in summaries.iter().filter(|s| !s.misinterpretations.is_empty()) {
            println!("  {}:", summary.model_name);
            for (kind, count) in &summary.misinterpretations {
                println!("    {}: {}", kind, count);
            }
        }
    }

    println!("\n{:=<50}", "");
}

/// Print the findings of a store check
pub fn print_verification_report(report: &VerificationReport, mode: Mode) {
    println!("\n=== Prediction Store: {} ({}) ===\n", report.model_name, mode);
    println!("  Records:      {}", report.total_records);
    println!("  Malformed:    {}", report.malformed_rows);
    println!("  Missing:      {}", report.missing.len());
    println!("  Undetermined: {}", report.undetermined.len());
    println!("  Duplicates:   {}", report.duplicates.len());
    println!("  Unmatched:    {}", report.unmatched.len());

    if !report.unmatched.is_empty() {
        println!("\n  Ids absent from the dataset: {:?}", report.unmatched);
    }
    if !report.undetermined.is_empty() {
        println!("  Undetermined items: {:?}", report.undetermined);
    }

    let status = if report.is_complete() { "COMPLETE" } else { "INCOMPLETE" };
    println!("\n  Status: {}", status);
    println!("{:=<50}", "");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_summary_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("summary.json");
        let summary = JsonSummary::new(
            "run-1",
            Mode::YesNo,
            1000,
            vec![ModelSummary::from_records("gpt-4o", &[])],
        );
        summary.write_to_file(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["mode"], "yes_no");
        assert_eq!(json["models"][0]["model_name"], "gpt-4o");
        assert_eq!(json["models"][0]["letter_distribution"]["A"], 0);
    }
}
