use crate::dataset::{DatasetId, Label, RecordId};
use crate::error::{EnsembleError, EnsembleResult};
use crate::job::{EnsembleRunId, EnsembleSpec};
use crate::registry::EstimatorState;
use crate::resampler::Sample;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Ids and labels one estimator was trained on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleManifest {
    pub ordinal: usize,
    pub ids: Vec<RecordId>,
    pub labels: Vec<Label>,
}

impl SampleManifest {
    #[must_use]
    pub fn new(ordinal: usize, sample: &Sample) -> Self {
        Self { ordinal, ids: sample.ids.clone(), labels: sample.labels.clone() }
    }

    pub fn into_sample(self) -> EnsembleResult<Sample> {
        Sample::new(self.ids, self.labels)
    }
}

/// Written next to a persisted artifact once it is in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorManifest {
    pub ordinal: usize,
    pub artifact: PathBuf,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub fit_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorRecord {
    pub ordinal: usize,
    pub state: EstimatorState,
    pub artifact: PathBuf,
    #[serde(default)]
    pub sha256: Option<String>,
}

/// Summary of an ensemble on disk; enough to reload it in another process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleManifest {
    pub run_id: EnsembleRunId,
    pub created_at: DateTime<Utc>,
    pub dataset_id: DatasetId,
    pub spec: EnsembleSpec,
    pub adapter: String,
    #[serde(default)]
    pub adapter_config: serde_json::Value,
    pub estimators: Vec<EstimatorRecord>,
}

pub fn sha256_file(path: &Path) -> EnsembleResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> EnsembleResult<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a JSON manifest, mapping a missing file and bad content to artifact errors.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> EnsembleResult<T> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(EnsembleError::ArtifactNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    serde_json::from_slice(&bytes).map_err(|e| EnsembleError::corrupt(path, e))
}

/// Verify `path` against a recorded digest.
pub fn verify_sha256(path: &Path, expected: &str) -> EnsembleResult<()> {
    if !path.exists() {
        return Err(EnsembleError::ArtifactNotFound(path.to_path_buf()));
    }
    let actual = sha256_file(path)?;
    if actual != expected {
        return Err(EnsembleError::corrupt(
            path,
            format!("sha256 mismatch (expected {expected}, found {actual})"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_json_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let err = read_json::<SampleManifest>(&temp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, EnsembleError::ArtifactNotFound(_)));
    }

    #[test]
    fn test_read_json_garbage_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = read_json::<SampleManifest>(&path).unwrap_err();
        assert!(matches!(err, EnsembleError::CorruptArtifact { .. }));
    }

    #[test]
    fn test_verify_sha256_detects_tampering() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("model.bin");
        std::fs::write(&path, b"weights").unwrap();
        let digest = sha256_file(&path).unwrap();
        verify_sha256(&path, &digest).unwrap();

        std::fs::write(&path, b"tampered").unwrap();
        assert!(matches!(verify_sha256(&path, &digest), Err(EnsembleError::CorruptArtifact { .. })));
    }

    #[test]
    fn test_sample_manifest_rebuilds_sample() {
        let sample = Sample::new(vec![RecordId::from("a"), RecordId::from("b")], vec![0, 1]).unwrap();
        let manifest = SampleManifest::new(2, &sample);
        assert_eq!(manifest.into_sample().unwrap(), sample);
    }
}
