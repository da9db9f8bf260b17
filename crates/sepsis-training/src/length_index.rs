//! Groups sequences by timestep count so batches never need padding.

use crate::dataset::{Dataset, DatasetId, RecordId, SequenceRecord};
use crate::error::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Mapping of sequence length to the ids sharing that length.
///
/// Buckets iterate in ascending length order; ids keep the order in which
/// they were indexed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LengthIndex {
    buckets: BTreeMap<usize, Vec<RecordId>>,
}

impl LengthIndex {
    pub fn build<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a SequenceRecord>,
    {
        let mut buckets: BTreeMap<usize, Vec<RecordId>> = BTreeMap::new();
        for record in records {
            buckets.entry(record.len()).or_default().push(record.id.clone());
        }
        Self { buckets }
    }

    /// Index a subset of a dataset, e.g. one estimator's sample.
    pub fn from_sample(dataset: &Dataset, ids: &[RecordId]) -> EnsembleResult<Self> {
        let records = ids
            .iter()
            .map(|id| dataset.record(id))
            .collect::<EnsembleResult<Vec<_>>>()?;
        Ok(Self::build(records))
    }

    /// Load a cached index for `dataset` from `path`, or build and write it.
    ///
    /// A cache written for a different dataset is rebuilt.
    pub fn load_or_build(path: &Path, dataset: &Dataset) -> EnsembleResult<Self> {
        if path.exists() {
            match read_cache(path) {
                Ok(cache) if &cache.dataset_id == dataset.id() => {
                    tracing::debug!(path = %path.display(), "using cached length index");
                    return Ok(cache.index);
                }
                Ok(_) => tracing::info!(path = %path.display(), "length index cache is stale, rebuilding"),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable length index cache, rebuilding"),
            }
        }

        let index = Self::build(dataset.records());
        let cache = LengthIndexCache { dataset_id: dataset.id().clone(), index };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec(&cache)?)?;
        Ok(cache.index)
    }

    pub fn buckets(&self) -> impl Iterator<Item = (usize, &[RecordId])> {
        self.buckets.iter().map(|(len, ids)| (*len, ids.as_slice()))
    }

    #[must_use]
    pub fn bucket(&self, length: usize) -> Option<&[RecordId]> {
        self.buckets.get(&length).map(Vec::as_slice)
    }

    pub fn lengths(&self) -> impl Iterator<Item = usize> + '_ {
        self.buckets.keys().copied()
    }

    /// Total number of indexed ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LengthIndexCache {
    dataset_id: DatasetId,
    index: LengthIndex,
}

fn read_cache(path: &Path) -> EnsembleResult<LengthIndexCache> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| EnsembleError::corrupt(path, e))
}
