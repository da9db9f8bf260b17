use crate::dataset::{Dataset, DatasetSource, Event, Label, RecordId, SequenceRecord};
use crate::error::{EnsembleError, EnsembleResult};
use std::collections::HashMap;
use std::path::Path;
use walkdir::WalkDir;

/// Load and validate a dataset from a `DatasetSource`.
pub fn load_dataset(source: &DatasetSource) -> EnsembleResult<Dataset> {
    let records = match source {
        DatasetSource::Jsonl { path } => read_jsonl_records(path)?,
        DatasetSource::Directory { root, labels } => read_directory_records(root, labels)?,
    };
    Dataset::new(records)
}

pub fn write_jsonl_dataset(path: &Path, records: &[SequenceRecord]) -> EnsembleResult<()> {
    let mut out = String::new();
    for record in records {
        out.push_str(&serde_json::to_string(record)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

pub fn read_jsonl_records(path: &Path) -> EnsembleResult<Vec<SequenceRecord>> {
    let contents = std::fs::read_to_string(path)?;
    let mut records = Vec::new();

    for (idx, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: SequenceRecord = serde_json::from_str(line).map_err(|e| {
            EnsembleError::Dataset(format!("failed to parse jsonl line {}: {}", idx + 1, e))
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Read `<id>.json` event matrices under `root`, labelled through `labels_path`.
///
/// Records are returned sorted by id so the resulting dataset hash does not
/// depend on directory iteration order. Files without a label entry are skipped.
pub fn read_directory_records(root: &Path, labels_path: &Path) -> EnsembleResult<Vec<SequenceRecord>> {
    if !root.is_dir() {
        return Err(EnsembleError::Dataset(format!(
            "dataset directory does not exist: {}",
            root.display()
        )));
    }

    let labels: HashMap<String, Label> = serde_json::from_slice(&std::fs::read(labels_path)?)
        .map_err(|e| {
            EnsembleError::Dataset(format!("failed to parse labels {}: {}", labels_path.display(), e))
        })?;

    let mut records = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|e| EnsembleError::Dataset(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path == labels_path {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some(&label) = labels.get(stem) else {
            tracing::debug!(path = %path.display(), "skipping unlabelled record file");
            continue;
        };

        let events: Vec<Event> = serde_json::from_slice(&std::fs::read(path)?).map_err(|e| {
            EnsembleError::Dataset(format!("failed to parse events {}: {}", path.display(), e))
        })?;
        records.push(SequenceRecord { id: RecordId::from(stem), events, label });
    }

    records.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_dataset_survives_write_and_read() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.jsonl");
        let records = vec![
            SequenceRecord { id: RecordId::from("p1"), events: vec![vec![1.0]; 3], label: 1 },
            SequenceRecord { id: RecordId::from("p2"), events: vec![vec![0.0]; 5], label: 0 },
        ];
        write_jsonl_dataset(&path, &records).unwrap();

        let dataset = load_dataset(&DatasetSource::Jsonl { path }).unwrap();
        assert_eq!(dataset.records(), records.as_slice());
    }

    #[test]
    fn test_jsonl_reports_line_number() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.jsonl");
        std::fs::write(&path, "{\"id\":\"a\",\"events\":[[1.0]],\"label\":0}\nnot json\n").unwrap();

        let err = read_jsonl_records(&path).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_directory_source_reads_labelled_files() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("events");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("b.json"), "[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        std::fs::write(root.join("a.json"), "[[0.0, 0.0]]").unwrap();
        std::fs::write(root.join("orphan.json"), "[[0.0, 0.0]]").unwrap();
        let labels = temp.path().join("labels.json");
        std::fs::write(&labels, r#"{"a": 0, "b": 1}"#).unwrap();

        let dataset = load_dataset(&DatasetSource::Directory { root, labels }).unwrap();
        let ids: Vec<_> = dataset.ids().map(|id| id.0.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(dataset.record(&RecordId::from("b")).unwrap().len(), 2);
    }
}
