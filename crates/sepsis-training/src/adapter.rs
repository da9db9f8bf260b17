//! Capability interface over trainable, persistable sequence classifiers.

use crate::dataset::Label;
use crate::error::EnsembleResult;
use crate::scheduler::{LabeledBatch, SequenceBatch};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Predicted label and positive-class score for one sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: Label,
    pub score: f32,
}

/// A classifier the ensemble can train, query and persist.
///
/// `fit` is treated as an expensive, opaque blocking call: failures are
/// returned as `EnsembleError::Training` and never retried.
pub trait ClassifierAdapter: Send {
    fn id(&self) -> &'static str;

    fn fit(&mut self, batches: &[LabeledBatch<'_>], epochs: u32) -> EnsembleResult<()>;

    /// One prediction per sequence, in batch order then position within the batch.
    fn predict(&self, batches: &[SequenceBatch<'_>]) -> EnsembleResult<Vec<Prediction>>;

    fn save(&self, path: &Path) -> EnsembleResult<()>;

    /// Restore trained state. Missing files are `ArtifactNotFound`,
    /// unreadable ones `CorruptArtifact`.
    fn load(&mut self, path: &Path) -> EnsembleResult<()>;
}

/// Builds fresh adapters for each estimator.
pub trait AdapterFactory: Send + Sync {
    fn id(&self) -> &'static str;

    fn create(&self) -> Box<dyn ClassifierAdapter>;

    /// Configuration recorded in the ensemble manifest so inference can
    /// rebuild an equivalent factory.
    fn config(&self) -> EnsembleResult<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    /// A fresh adapter restored from `path`.
    fn load(&self, path: &Path) -> EnsembleResult<Box<dyn ClassifierAdapter>> {
        let mut adapter = self.create();
        adapter.load(path)?;
        Ok(adapter)
    }
}
