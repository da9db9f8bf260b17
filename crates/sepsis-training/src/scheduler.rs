//! Length-stratified batch scheduling.
//!
//! Every batch holds sequences of a single length, so a trainer can consume
//! each batch as one fixed-shape tensor without padding or masking.

use crate::dataset::{Dataset, Event, Label, RecordId};
use crate::error::{EnsembleError, EnsembleResult};
use crate::length_index::LengthIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ids of same-length sequences trained together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub length: usize,
    pub ids: Vec<RecordId>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Split one bucket into batches of `max_batch_size`, the last one holding the remainder.
pub fn schedule(bucket: &[RecordId], length: usize, max_batch_size: usize) -> EnsembleResult<Vec<Batch>> {
    if max_batch_size == 0 {
        return Err(EnsembleError::Configuration("max_batch_size must be >= 1".to_string()));
    }
    Ok(bucket
        .chunks(max_batch_size)
        .map(|chunk| Batch { length, ids: chunk.to_vec() })
        .collect())
}

/// Schedule every bucket of `index` in ascending length order.
pub fn schedule_index(index: &LengthIndex, max_batch_size: usize) -> EnsembleResult<Vec<Batch>> {
    if max_batch_size == 0 {
        return Err(EnsembleError::Configuration("max_batch_size must be >= 1".to_string()));
    }
    let mut batches = Vec::new();
    for (length, ids) in index.buckets() {
        batches.extend(schedule(ids, length, max_batch_size)?);
    }
    Ok(batches)
}

/// Event sequences of one batch, all of the same length.
#[derive(Debug, Clone)]
pub struct SequenceBatch<'a> {
    pub length: usize,
    pub sequences: Vec<&'a [Event]>,
}

impl SequenceBatch<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }
}

/// A sequence batch with aligned training labels.
#[derive(Debug, Clone)]
pub struct LabeledBatch<'a> {
    pub inputs: SequenceBatch<'a>,
    pub labels: Vec<Label>,
}

/// Resolve batch ids into event sequences.
pub fn materialize<'a>(dataset: &'a Dataset, batches: &[Batch]) -> EnsembleResult<Vec<SequenceBatch<'a>>> {
    batches
        .iter()
        .map(|batch| {
            let sequences = batch
                .ids
                .iter()
                .map(|id| dataset.record(id).map(|r| r.events.as_slice()))
                .collect::<EnsembleResult<Vec<_>>>()?;
            Ok(SequenceBatch { length: batch.length, sequences })
        })
        .collect()
}

/// Resolve batch ids into event sequences labelled from `labels`.
///
/// Labels come from the estimator's sample rather than the dataset so that
/// supplied samples train exactly on what was logged.
pub fn materialize_labeled<'a>(
    dataset: &'a Dataset,
    batches: &[Batch],
    labels: &HashMap<&RecordId, Label>,
) -> EnsembleResult<Vec<LabeledBatch<'a>>> {
    let inputs = materialize(dataset, batches)?;
    inputs
        .into_iter()
        .zip(batches)
        .map(|(inputs, batch)| {
            let labels = batch
                .ids
                .iter()
                .map(|id| {
                    labels
                        .get(id)
                        .copied()
                        .ok_or_else(|| EnsembleError::Dataset(format!("no label for record {id}")))
                })
                .collect::<EnsembleResult<Vec<_>>>()?;
            Ok(LabeledBatch { inputs, labels })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::SequenceRecord;

    fn ids(n: usize) -> Vec<RecordId> {
        (0..n).map(|i| RecordId(format!("r{i}"))).collect()
    }

    #[test]
    fn test_schedule_splits_with_remainder() {
        let bucket = ids(5);
        let batches = schedule(&bucket, 4, 2).unwrap();
        let sizes: Vec<_> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let flat: Vec<_> = batches.iter().flat_map(|b| b.ids.clone()).collect();
        assert_eq!(flat, bucket);
    }

    #[test]
    fn test_schedule_small_bucket_is_one_batch() {
        let batches = schedule(&ids(3), 1, 10).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_schedule_empty_bucket_yields_nothing() {
        assert!(schedule(&[], 3, 4).unwrap().is_empty());
    }

    #[test]
    fn test_schedule_rejects_zero_batch_size() {
        let err = schedule(&ids(3), 1, 0).unwrap_err();
        assert!(matches!(err, EnsembleError::Configuration(_)));
        assert!(schedule_index(&LengthIndex::default(), 0).is_err());
    }

    #[test]
    fn test_schedule_index_concrete_scenario() {
        let lengths = [3, 3, 3, 5, 5, 5, 5, 7, 7, 7];
        let records: Vec<_> = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| SequenceRecord {
                id: RecordId(format!("r{i}")),
                events: vec![vec![0.0]; len],
                label: 0,
            })
            .collect();
        let dataset = Dataset::new(records).unwrap();
        let index = LengthIndex::build(dataset.records());

        let batches = schedule_index(&index, 2).unwrap();
        let shape: Vec<_> = batches.iter().map(|b| (b.length, b.len())).collect();
        assert_eq!(shape, vec![(3, 2), (3, 1), (5, 2), (5, 2), (7, 2), (7, 1)]);

        let total: usize = batches.iter().map(Batch::len).sum();
        assert_eq!(total, dataset.len());

        let materialized = materialize(&dataset, &batches).unwrap();
        for (batch, seqs) in batches.iter().zip(&materialized) {
            assert!(seqs.sequences.iter().all(|s| s.len() == batch.length));
        }
    }

    #[test]
    fn test_materialize_labeled_uses_supplied_labels() {
        let dataset = Dataset::new(vec![SequenceRecord {
            id: RecordId::from("a"),
            events: vec![vec![1.0]],
            label: 0,
        }])
        .unwrap();
        let batches = vec![Batch { length: 1, ids: vec![RecordId::from("a")] }];
        let id = RecordId::from("a");
        let labels = HashMap::from([(&id, 1)]);

        let labeled = materialize_labeled(&dataset, &batches, &labels).unwrap();
        assert_eq!(labeled[0].labels, vec![1]);

        let empty = HashMap::new();
        assert!(materialize_labeled(&dataset, &batches, &empty).is_err());
    }
}
