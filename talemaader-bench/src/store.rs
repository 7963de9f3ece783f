//! Append-only prediction store
//!
//! One CSV file per (model, mode). Rows are only ever appended; a resumed run
//! may append a newer row for an item whose earlier answer was undetermined,
//! and readers take the latest row per item.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::ItemId;
use crate::normalize::{Answer, Verdict};

/// Prediction store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Prediction store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Prediction store CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// One model answer to one item
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub item_id: ItemId,
    /// Letter for multiple-choice runs, the folded letter for yes/no runs
    pub answer: Answer,
    /// Per-definition verdicts in A..D order (yes/no runs only)
    pub verdicts: Option<[Verdict; 4]>,
    /// Verbatim model output, or the adapter error text. Yes/no runs store a
    /// JSON array of the four outputs in A..D order.
    pub raw_response: String,
    pub timestamp: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(item_id: ItemId, answer: Answer, raw_response: impl Into<String>) -> Self {
        Self {
            item_id,
            answer,
            verdicts: None,
            raw_response: raw_response.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_verdicts(mut self, verdicts: [Verdict; 4]) -> Self {
        self.verdicts = Some(verdicts);
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoreRow {
    #[serde(alias = "udtryk_id")]
    item_id: ItemId,
    predicted_label: String,
    #[serde(default)]
    verdicts: String,
    #[serde(default)]
    raw_response: String,
    #[serde(default)]
    timestamp: String,
}

impl From<&PredictionRecord> for StoreRow {
    fn from(record: &PredictionRecord) -> Self {
        Self {
            item_id: record.item_id,
            predicted_label: record.answer.to_string(),
            verdicts: record
                .verdicts
                .map(|v| v.iter().map(Verdict::as_str).collect::<Vec<_>>().join("|"))
                .unwrap_or_default(),
            raw_response: record.raw_response.clone(),
            timestamp: record.timestamp.to_rfc3339(),
        }
    }
}

impl TryFrom<StoreRow> for PredictionRecord {
    type Error = String;

    fn try_from(row: StoreRow) -> Result<Self, Self::Error> {
        let answer: Answer = row.predicted_label.parse()?;

        let verdicts = if row.verdicts.trim().is_empty() {
            None
        } else {
            let parsed = row
                .verdicts
                .split('|')
                .map(str::parse::<Verdict>)
                .collect::<Result<Vec<_>, _>>()?;
            let verdicts: [Verdict; 4] = parsed
                .try_into()
                .map_err(|v: Vec<Verdict>| format!("Expected 4 verdicts, found {}", v.len()))?;
            Some(verdicts)
        };

        let timestamp = if row.timestamp.trim().is_empty() {
            DateTime::<Utc>::default()
        } else {
            DateTime::parse_from_rfc3339(row.timestamp.trim())
                .map_err(|e| format!("Bad timestamp '{}': {}", row.timestamp, e))?
                .with_timezone(&Utc)
        };

        Ok(Self {
            item_id: row.item_id,
            answer,
            verdicts,
            raw_response: row.raw_response,
            timestamp,
        })
    }
}

/// Writer appending one row per completed item
pub struct PredictionStore {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl PredictionStore {
    /// Open for appending, creating the file (and header) when new or empty.
    ///
    /// A last row without line terminator, left by an interrupted writer, is
    /// terminated when it is a complete record and cut off otherwise.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StoreError::Io { path: path.clone(), source };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        repair_tail(&mut file, &path).map_err(io_err)?;
        let is_empty = file.metadata().map_err(io_err)?.len() == 0;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_empty {
            writer.write_record(["item_id", "predicted_label", "verdicts", "raw_response", "timestamp"])?;
            writer.flush().map_err(io_err)?;
        }

        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append and flush one record
    pub fn append(&mut self, record: &PredictionRecord) -> Result<(), StoreError> {
        self.writer.serialize(StoreRow::from(record))?;
        self.writer.flush().map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

fn repair_tail(file: &mut File, path: &Path) -> std::io::Result<()> {
    if file.metadata()?.len() == 0 {
        return Ok(());
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(());
    }

    file.seek(SeekFrom::Start(0))?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(&mut *file);
    let headers = reader.byte_headers()?.clone();
    let mut record = csv::ByteRecord::new();
    let mut tail: Option<(u64, csv::ByteRecord)> = None;
    loop {
        let start = reader.position().byte();
        if !reader.read_byte_record(&mut record)? {
            break;
        }
        tail = Some((start, record.clone()));
    }
    drop(reader);

    match tail {
        Some((_, row)) if is_complete_row(&row, &headers) => {
            tracing::warn!("{}: terminating last row", path.display());
            file.write_all(b"\n")
        }
        Some((start, _)) => {
            tracing::warn!("{}: dropping torn row at byte {}", path.display(), start);
            file.set_len(start)
        }
        // only a torn header; rewritten by the caller
        None => file.set_len(0),
    }
}

/// A full row: every column present and the record parses
fn is_complete_row(row: &csv::ByteRecord, headers: &csv::ByteRecord) -> bool {
    row.len() == headers.len()
        && row
            .deserialize::<StoreRow>(Some(headers))
            .map_err(|e| e.to_string())
            .and_then(PredictionRecord::try_from)
            .is_ok()
}

/// All records of one store, in file order
#[derive(Debug, Clone, Default)]
pub struct PredictionLog {
    records: Vec<PredictionRecord>,
    malformed: usize,
}

impl PredictionLog {
    pub fn new(records: Vec<PredictionRecord>) -> Self {
        Self { records, malformed: 0 }
    }

    /// Read a store file. A missing file is an empty log; malformed rows are
    /// skipped with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let log = Self::from_csv(&content)?;

        tracing::info!(
            "Loaded {} prediction records from {} ({} malformed)",
            log.records.len(),
            path.display(),
            log.malformed
        );
        Ok(log)
    }

    /// Parse store content
    pub fn from_csv(content: &str) -> Result<Self, StoreError> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::Headers)
            .from_reader(content.as_bytes());

        let mut log = Self::default();
        for (index, row) in reader.deserialize::<StoreRow>().enumerate() {
            let parsed = row
                .map_err(|e| e.to_string())
                .and_then(PredictionRecord::try_from);
            match parsed {
                Ok(record) => log.records.push(record),
                Err(e) => {
                    tracing::warn!("Skipping malformed prediction row {}: {}", index + 2, e);
                    log.malformed += 1;
                }
            }
        }
        Ok(log)
    }

    pub fn push(&mut self, record: PredictionRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PredictionRecord] {
        &self.records
    }

    pub fn malformed(&self) -> usize {
        self.malformed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Active record per item: the last one in file order
    pub fn latest(&self) -> BTreeMap<ItemId, &PredictionRecord> {
        let mut latest = BTreeMap::new();
        for record in &self.records {
            latest.insert(record.item_id, record);
        }
        latest
    }

    /// Items whose active record is determined; a run never re-queries these
    pub fn settled_ids(&self) -> HashSet<ItemId> {
        self.latest()
            .into_iter()
            .filter(|(_, record)| record.answer.is_determined())
            .map(|(id, _)| id)
            .collect()
    }

    /// Items with more than one record, with their record counts
    pub fn duplicates(&self) -> Vec<(ItemId, usize)> {
        let mut counts: BTreeMap<ItemId, usize> = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.item_id).or_default() += 1;
        }
        counts.into_iter().filter(|&(_, n)| n > 1).collect()
    }
}
