use crate::error::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;

/// Stable identifier for a dataset (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatasetId(pub String);

/// Stable identifier for one patient sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One timestep of charted features.
pub type Event = Vec<f32>;

/// Binary class label, `0` or `1`.
pub type Label = u8;

pub const NEGATIVE: Label = 0;
pub const POSITIVE: Label = 1;

#[must_use]
pub fn is_valid_label(label: Label) -> bool {
    label == NEGATIVE || label == POSITIVE
}

/// A single labelled event sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceRecord {
    pub id: RecordId,
    pub events: Vec<Event>,
    pub label: Label,
}

impl SequenceRecord {
    /// Number of timesteps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Where a dataset comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DatasetSource {
    /// One `SequenceRecord` per line.
    Jsonl { path: PathBuf },
    /// One `<id>.json` event matrix per record plus a JSON object of `id -> label`.
    Directory { root: PathBuf, labels: PathBuf },
}

/// Validated, id-addressable collection of sequence records.
#[derive(Debug, Clone)]
pub struct Dataset {
    id: DatasetId,
    records: Vec<SequenceRecord>,
    positions: HashMap<RecordId, usize>,
}

impl Dataset {
    pub fn new(records: Vec<SequenceRecord>) -> EnsembleResult<Self> {
        validate_records(&records)?;
        let id = compute_dataset_id(&records)?;
        let positions = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.id.clone(), idx))
            .collect();
        Ok(Self { id, records, positions })
    }

    #[must_use]
    pub fn id(&self) -> &DatasetId {
        &self.id
    }

    #[must_use]
    pub fn records(&self) -> &[SequenceRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &RecordId) -> Option<&SequenceRecord> {
        self.positions.get(id).map(|&idx| &self.records[idx])
    }

    pub fn record(&self, id: &RecordId) -> EnsembleResult<&SequenceRecord> {
        self.get(id)
            .ok_or_else(|| EnsembleError::Dataset(format!("unknown record id: {id}")))
    }

    #[must_use]
    pub fn contains(&self, id: &RecordId) -> bool {
        self.positions.contains_key(id)
    }

    /// Width of every event vector in the dataset.
    #[must_use]
    pub fn feature_width(&self) -> usize {
        self.records
            .first()
            .and_then(|r| r.events.first())
            .map_or(0, Vec::len)
    }

    pub fn ids(&self) -> impl Iterator<Item = &RecordId> {
        self.records.iter().map(|r| &r.id)
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.records.iter().map(|r| r.label)
    }
}

pub fn compute_dataset_id(records: &[SequenceRecord]) -> EnsembleResult<DatasetId> {
    let mut hasher = Sha256::new();

    for record in records {
        let bytes = serde_json::to_vec(record)?;
        hasher.update(bytes);
        hasher.update(b"\n");
    }

    Ok(DatasetId(hex::encode(hasher.finalize())))
}

pub fn validate_records(records: &[SequenceRecord]) -> EnsembleResult<()> {
    if records.is_empty() {
        return Err(EnsembleError::Dataset("dataset must not be empty".to_string()));
    }

    let width = records[0].events.first().map_or(0, Vec::len);
    let mut seen = std::collections::HashSet::with_capacity(records.len());

    for (idx, record) in records.iter().enumerate() {
        if record.id.0.trim().is_empty() {
            return Err(EnsembleError::Dataset(format!("record[{idx}] id is empty")));
        }
        if !seen.insert(&record.id) {
            return Err(EnsembleError::Dataset(format!("duplicate record id: {}", record.id)));
        }
        if !is_valid_label(record.label) {
            return Err(EnsembleError::Dataset(format!(
                "record {} has label {} (expected 0 or 1)",
                record.id, record.label
            )));
        }
        if record.is_empty() {
            return Err(EnsembleError::Dataset(format!("record {} has no events", record.id)));
        }
        if let Some(step) = record.events.iter().position(|e| e.len() != width) {
            return Err(EnsembleError::Dataset(format!(
                "record {} step {step} has {} features (expected {width})",
                record.id,
                record.events[step].len()
            )));
        }
    }
    Ok(())
}
