use crate::artifacts::{read_json, EnsembleManifest, EstimatorRecord};
use crate::error::EnsembleResult;
use crate::layout::{EnsembleLayout, ENSEMBLE_MANIFEST_FILE};
use crate::resampler::Sample;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifecycle of one estimator.
///
/// `Pending -> Sampled -> Scheduled -> Training -> Persisted | Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorState {
    Pending,
    Sampled,
    Scheduled,
    Training,
    Persisted,
    Failed(String),
}

impl EstimatorState {
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted)
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for EstimatorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Sampled => f.write_str("sampled"),
            Self::Scheduled => f.write_str("scheduled"),
            Self::Training => f.write_str("training"),
            Self::Persisted => f.write_str("persisted"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EstimatorEntry {
    pub ordinal: usize,
    pub state: EstimatorState,
    /// `None` until sampled, or when resumed from an artifact with no sample manifest.
    pub sample: Option<Sample>,
    pub artifact: PathBuf,
    pub sha256: Option<String>,
    /// Persisted by an earlier run.
    pub resumed: bool,
}

/// Per-ensemble record of estimators, owned by one trainer instance.
#[derive(Debug, Clone, Default)]
pub struct EnsembleRegistry {
    entries: Vec<EstimatorEntry>,
}

impl EnsembleRegistry {
    #[must_use]
    pub fn new(layout: &EnsembleLayout, n_estimators: usize) -> Self {
        let entries = (0..n_estimators)
            .map(|ordinal| EstimatorEntry {
                ordinal,
                state: EstimatorState::Pending,
                sample: None,
                artifact: layout.artifact_path(ordinal),
                sha256: None,
                resumed: false,
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn from_manifest(manifest: &EnsembleManifest) -> Self {
        let entries = manifest
            .estimators
            .iter()
            .map(|record| EstimatorEntry {
                ordinal: record.ordinal,
                state: record.state.clone(),
                sample: None,
                artifact: record.artifact.clone(),
                sha256: record.sha256.clone(),
                resumed: record.state.is_persisted(),
            })
            .collect();
        Self { entries }
    }

    #[must_use]
    pub fn entries(&self) -> &[EstimatorEntry] {
        &self.entries
    }

    #[must_use]
    pub fn get(&self, ordinal: usize) -> Option<&EstimatorEntry> {
        self.entries.get(ordinal)
    }

    pub fn get_mut(&mut self, ordinal: usize) -> Option<&mut EstimatorEntry> {
        self.entries.get_mut(ordinal)
    }

    pub fn set_state(&mut self, ordinal: usize, state: EstimatorState) {
        if let Some(entry) = self.entries.get_mut(ordinal) {
            entry.state = state;
        }
    }

    pub fn persisted(&self) -> impl Iterator<Item = &EstimatorEntry> {
        self.entries.iter().filter(|e| e.state.is_persisted())
    }

    pub fn failed(&self) -> impl Iterator<Item = &EstimatorEntry> {
        self.entries.iter().filter(|e| e.state.is_failed())
    }

    #[must_use]
    pub fn records(&self) -> Vec<EstimatorRecord> {
        self.entries
            .iter()
            .map(|e| EstimatorRecord {
                ordinal: e.ordinal,
                state: e.state.clone(),
                artifact: e.artifact.clone(),
                sha256: e.sha256.clone(),
            })
            .collect()
    }
}

/// Read `<root>/ensemble_manifest.json`.
pub fn read_ensemble_manifest(root: &Path) -> EnsembleResult<EnsembleManifest> {
    read_json(&root.join(ENSEMBLE_MANIFEST_FILE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_new_registry_is_pending() {
        let temp = TempDir::new().unwrap();
        let layout = EnsembleLayout::new(temp.path().to_path_buf(), "m_{n}.bin").unwrap();
        let mut registry = EnsembleRegistry::new(&layout, 3);

        assert!(registry.entries().iter().all(|e| e.state == EstimatorState::Pending));
        registry.set_state(1, EstimatorState::Persisted);
        registry.set_state(2, EstimatorState::Failed("boom".to_string()));

        assert_eq!(registry.persisted().map(|e| e.ordinal).collect::<Vec<_>>(), vec![1]);
        assert_eq!(registry.failed().map(|e| e.ordinal).collect::<Vec<_>>(), vec![2]);
        assert_eq!(registry.get(2).unwrap().artifact, temp.path().join("m_2.bin"));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        let json = serde_json::to_string(&EstimatorState::Persisted).unwrap();
        assert_eq!(json, "\"persisted\"");
        let failed: EstimatorState = serde_json::from_str(r#"{"failed":"nan loss"}"#).unwrap();
        assert_eq!(failed, EstimatorState::Failed("nan loss".to_string()));
    }
}
