//! Dataset loading from delimited text files
//!
//! Two layouts are accepted:
//!
//! - an options file (`talemaade_udtryk, A, B, C, D`) plus a labels file
//!   (`udtryk_id, talemaade_udtryk, korrekt_def, falsk1, falsk2, falsk3`),
//!   joined on the idiom text;
//! - a single combined file that carries `korrekt_def` (and optionally
//!   `udtryk_id` and the `falsk*` columns) next to the options.
//!
//! `korrekt_def` and `falsk*` hold the 0-based position of a definition
//! (a letter is accepted too). Tab and comma delimiters are detected from the
//! header line.

use std::collections::HashMap;
use std::path::Path;

use super::{
    DataIntegrityError, Dataset, Definition, DefinitionKind, IdiomItem, ItemId, Letter,
    RejectedRow,
};

const IDIOM_COLUMNS: [&str; 2] = ["talemaade_udtryk", "idiom"];
const ID_COLUMNS: [&str; 2] = ["udtryk_id", "item_id"];
const LABEL_COLUMNS: [&str; 2] = ["korrekt_def", "correct_label"];
const DISTRACTOR_COLUMNS: [(&str, DefinitionKind); 3] = [
    ("falsk1", DefinitionKind::Concrete),
    ("falsk2", DefinitionKind::Abstract),
    ("falsk3", DefinitionKind::Random),
];

/// Error type for dataset loading. Whole-file failures only.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Missing column '{column}' in {file}")]
    MissingColumn { file: String, column: String },
}

/// Load a dataset from an options file and an optional separate labels file
pub fn load_dataset(options: impl AsRef<Path>, labels: Option<&Path>) -> Result<Dataset, LoadError> {
    let options_path = options.as_ref();
    let options_content = std::fs::read_to_string(options_path)?;
    let labels_content = labels.map(std::fs::read_to_string).transpose()?;

    let dataset = load_dataset_from_str(&options_content, labels_content.as_deref())?;
    tracing::info!(
        "Loaded {} idioms from {} ({} rows skipped)",
        dataset.len(),
        options_path.display(),
        dataset.rejected().len()
    );
    Ok(dataset)
}

/// Load a dataset from in-memory file contents
pub fn load_dataset_from_str(options: &str, labels: Option<&str>) -> Result<Dataset, LoadError> {
    let options_table = Table::parse(options, "options file")?;

    let label_rows = match labels {
        Some(content) => {
            let table = Table::parse(content, "labels file")?;
            Some(read_labels(&table)?)
        }
        None => None,
    };

    let idiom_col = options_table.require_any(&IDIOM_COLUMNS)?;
    let option_cols = [
        options_table.require("A")?,
        options_table.require("B")?,
        options_table.require("C")?,
        options_table.require("D")?,
    ];
    // Without a labels file the options file must carry the gold column itself
    let inline_labels = match label_rows {
        Some(_) => None,
        None => Some(LabelColumns::locate(&options_table)?),
    };

    let mut items = Vec::with_capacity(options_table.rows.len());
    let mut rejected = Vec::new();

    for (position, row) in options_table.rows.iter().enumerate() {
        let row_number = position + 1;
        let record = match row {
            Ok(record) => record,
            Err(message) => {
                rejected.push(RejectedRow {
                    row: row_number,
                    error: DataIntegrityError::Unreadable {
                        row: row_number,
                        message: message.clone(),
                    },
                });
                continue;
            }
        };

        let idiom = field(record, Some(idiom_col));
        let label = match (&label_rows, &inline_labels) {
            (Some(rows), _) => rows.get(idiom).cloned(),
            (None, Some(columns)) => Some(columns.read(record)),
            (None, None) => None,
        };

        let result = match label {
            Some(label) => build_item(row_number, idiom, record, &option_cols, &label),
            None => Err(DataIntegrityError::MissingLabel {
                idiom: idiom.to_string(),
            }),
        };

        match result {
            Ok(item) => items.push(item),
            Err(error) => {
                tracing::warn!("Skipping dataset row {}: {}", row_number, error);
                rejected.push(RejectedRow {
                    row: row_number,
                    error,
                });
            }
        }
    }

    Ok(Dataset::new(items, rejected))
}

/// Gold information for one idiom
#[derive(Debug, Clone, Default)]
struct LabelRow {
    id: Option<String>,
    correct: String,
    distractors: [Option<String>; 3],
}

#[derive(Debug, Clone, Copy)]
struct LabelColumns {
    id: Option<usize>,
    correct: usize,
    distractors: [Option<usize>; 3],
}

impl LabelColumns {
    fn locate(table: &Table) -> Result<Self, LoadError> {
        Ok(Self {
            id: table.find_any(&ID_COLUMNS),
            correct: table.require_any(&LABEL_COLUMNS)?,
            distractors: DISTRACTOR_COLUMNS.map(|(name, _)| table.find(name)),
        })
    }

    fn read(&self, record: &csv::StringRecord) -> LabelRow {
        let optional = |col: Option<usize>| {
            let value = field(record, col);
            (!value.is_empty()).then(|| value.to_string())
        };
        LabelRow {
            id: optional(self.id),
            correct: field(record, Some(self.correct)).to_string(),
            distractors: self.distractors.map(optional),
        }
    }
}

fn read_labels(table: &Table) -> Result<HashMap<String, LabelRow>, LoadError> {
    let idiom_col = table.require_any(&IDIOM_COLUMNS)?;
    let columns = LabelColumns::locate(table)?;

    let mut labels = HashMap::with_capacity(table.rows.len());
    for (position, row) in table.rows.iter().enumerate() {
        match row {
            Ok(record) => {
                let idiom = field(record, Some(idiom_col));
                if labels.insert(idiom.to_string(), columns.read(record)).is_some() {
                    tracing::warn!("Labels file repeats idiom '{}'; keeping the last row", idiom);
                }
            }
            Err(message) => {
                tracing::warn!("Skipping unreadable labels row {}: {}", position + 1, message);
            }
        }
    }
    Ok(labels)
}

fn build_item(
    row_number: usize,
    idiom: &str,
    record: &csv::StringRecord,
    option_cols: &[usize; 4],
    label: &LabelRow,
) -> Result<IdiomItem, DataIntegrityError> {
    let fallback_id = ItemId::try_from(row_number).unwrap_or(ItemId::MAX);
    let id = match &label.id {
        Some(raw) => raw.parse::<ItemId>().map_err(|_| DataIntegrityError::InvalidLabel {
            item_id: fallback_id,
            value: raw.clone(),
        })?,
        None => fallback_id,
    };

    let correct = parse_position(&label.correct).ok_or_else(|| DataIntegrityError::InvalidLabel {
        item_id: id,
        value: label.correct.clone(),
    })?;

    let mut kinds = [DefinitionKind::Unclassified; 4];
    for (raw, (_, kind)) in label.distractors.iter().zip(DISTRACTOR_COLUMNS) {
        if let Some(letter) = raw.as_deref().and_then(parse_position) {
            kinds[letter.index()] = kind;
        }
    }

    let definitions = Letter::ALL
        .into_iter()
        .map(|letter| {
            let text = field(record, Some(option_cols[letter.index()]));
            if letter == correct {
                Definition::correct(text)
            } else {
                Definition::distractor(text, kinds[letter.index()])
            }
        })
        .collect();

    IdiomItem::new(id, idiom, definitions)
}

/// Parse a definition position given as `0`-`3` or `A`-`D`
fn parse_position(raw: &str) -> Option<Letter> {
    let raw = raw.trim();
    // pandas writes integer columns with missing values as floats ("2.0")
    let raw = raw.strip_suffix(".0").unwrap_or(raw);
    match raw.parse::<usize>() {
        Ok(index) => Letter::from_index(index),
        Err(_) => raw.parse::<Letter>().ok(),
    }
}

fn field(record: &csv::StringRecord, column: Option<usize>) -> &str {
    column.and_then(|c| record.get(c)).map(str::trim).unwrap_or("")
}

/// A parsed delimited file: header plus rows, keeping per-row read errors
struct Table {
    name: &'static str,
    headers: Vec<String>,
    rows: Vec<Result<csv::StringRecord, String>>,
}

impl Table {
    fn parse(content: &str, name: &'static str) -> Result<Self, LoadError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let delimiter = sniff_delimiter(content);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let rows = reader
            .records()
            .map(|r| r.map_err(|e| e.to_string()))
            .collect();

        Ok(Self { name, headers, rows })
    }

    fn find(&self, column: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(column))
    }

    fn find_any(&self, columns: &[&str]) -> Option<usize> {
        columns.iter().find_map(|c| self.find(c))
    }

    fn require(&self, column: &str) -> Result<usize, LoadError> {
        self.find(column).ok_or_else(|| LoadError::MissingColumn {
            file: self.name.to_string(),
            column: column.to_string(),
        })
    }

    fn require_any(&self, columns: &[&str]) -> Result<usize, LoadError> {
        self.find_any(columns).ok_or_else(|| LoadError::MissingColumn {
            file: self.name.to_string(),
            column: columns.join(" | "),
        })
    }
}

fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or("");
    if header.contains('\t') {
        b'\t'
    } else if header.contains(';') && !header.contains(',') {
        b';'
    } else {
        b','
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPTIONS: &str = "talemaade_udtryk\tA\tB\tC\tD\n\
        have en høne at plukke\tvære sulten\thave noget at skændes om\tvære landmand\tvære glad\n\
        slå til Søren\tslå en mand\tvære heldig\tgøre noget helt vildt\tgå hjem\n";

    const LABELS: &str = "udtryk_id\ttalemaade_udtryk\tkorrekt_def\tfalsk1\tfalsk2\tfalsk3\n\
        11\thave en høne at plukke\t1\t2\t0\t3\n\
        12\tslå til Søren\t2\t0\t1\t3\n";

    #[test]
    fn test_two_file_layout() {
        let dataset = load_dataset_from_str(OPTIONS, Some(LABELS)).unwrap();
        assert_eq!(dataset.len(), 2);
        assert!(dataset.rejected().is_empty());

        let first = dataset.get(11).unwrap();
        assert_eq!(first.gold_label(), Letter::B);
        assert_eq!(first.definition(Letter::B).text, "have noget at skændes om");
        assert_eq!(first.definition(Letter::C).kind, DefinitionKind::Concrete);
        assert_eq!(first.definition(Letter::A).kind, DefinitionKind::Abstract);
        assert_eq!(first.definition(Letter::D).kind, DefinitionKind::Random);

        assert_eq!(dataset.get(12).unwrap().gold_label(), Letter::C);
        // dataset order is preserved
        assert_eq!(dataset.items()[0].id(), 11);
    }

    #[test]
    fn test_combined_layout_with_comma_delimiter() {
        let content = "idiom,A,B,C,D,korrekt_def\n\
            \"få kolde fødder\",fryse,blive nervøs,gå barfodet,løbe hurtigt,B\n";
        let dataset = load_dataset_from_str(content, None).unwrap();
        assert_eq!(dataset.len(), 1);
        let item = &dataset.items()[0];
        assert_eq!(item.id(), 1);
        assert_eq!(item.gold_label(), Letter::B);
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let options = "talemaade_udtryk\tA\tB\tC\tD\tkorrekt_def\n\
            god\ta\tb\tc\td\t0\n\
            mangler\ta\t\tc\td\t1\n\
            ukendt label\ta\tb\tc\td\t7\n\
            også god\ta\tb\tc\td\t3\n";
        let dataset = load_dataset_from_str(options, None).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.rejected().len(), 2);
        assert!(matches!(
            dataset.rejected()[0].error,
            DataIntegrityError::MissingDefinition { letter: Letter::B, .. }
        ));
        assert!(matches!(
            dataset.rejected()[1].error,
            DataIntegrityError::InvalidLabel { .. }
        ));
        assert_eq!(dataset.items()[1].gold_label(), Letter::D);
    }

    #[test]
    fn test_missing_label_row_is_rejected() {
        let labels = "talemaade_udtryk\tkorrekt_def\nhave en høne at plukke\t1\n";
        let dataset = load_dataset_from_str(OPTIONS, Some(labels)).unwrap();
        assert_eq!(dataset.len(), 1);
        assert!(matches!(
            &dataset.rejected()[0].error,
            DataIntegrityError::MissingLabel { idiom } if idiom == "slå til Søren"
        ));
    }

    #[test]
    fn test_missing_column_is_fatal() {
        let options = "talemaade_udtryk\tA\tB\tC\nx\ta\tb\tc\n";
        let err = load_dataset_from_str(options, Some(LABELS)).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn { ref column, .. } if column == "D"));
    }

    #[test]
    fn test_parse_position() {
        assert_eq!(parse_position("0"), Some(Letter::A));
        assert_eq!(parse_position("3.0"), Some(Letter::D));
        assert_eq!(parse_position("c"), Some(Letter::C));
        assert_eq!(parse_position("4"), None);
        assert_eq!(parse_position(""), None);
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let options = dir.path().join("talemaader_leverance_2_uden_labels.csv");
        let labels = dir.path().join("talemaader_leverance_2_kun_labels.csv");
        std::fs::write(&options, OPTIONS).unwrap();
        std::fs::write(&labels, LABELS).unwrap();

        let dataset = load_dataset(&options, Some(labels.as_path())).unwrap();
        assert_eq!(dataset.len(), 2);
    }
}
