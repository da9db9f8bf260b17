//! Class-imbalance resampling for bagging estimators.

use crate::dataset::{is_valid_label, Dataset, Label, RecordId, NEGATIVE, POSITIVE};
use crate::error::{EnsembleError, EnsembleResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Record ids and their labels used to train one estimator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub ids: Vec<RecordId>,
    pub labels: Vec<Label>,
}

impl Sample {
    pub fn new(ids: Vec<RecordId>, labels: Vec<Label>) -> EnsembleResult<Self> {
        if ids.len() != labels.len() {
            return Err(EnsembleError::Configuration(format!(
                "sample has {} ids but {} labels",
                ids.len(),
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|&&l| !is_valid_label(l)) {
            return Err(EnsembleError::Configuration(format!(
                "sample label {bad} is not binary"
            )));
        }
        Ok(Self { ids, labels })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == POSITIVE).count()
    }

    /// Lookup table from id to its label within this sample.
    #[must_use]
    pub fn label_map(&self) -> HashMap<&RecordId, Label> {
        self.ids.iter().zip(self.labels.iter().copied()).collect()
    }
}

/// Dataset ids split by class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassPartition {
    pub positive: Vec<RecordId>,
    pub negative: Vec<RecordId>,
}

impl ClassPartition {
    #[must_use]
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let mut partition = Self::default();
        for record in dataset.records() {
            if record.label == NEGATIVE {
                partition.negative.push(record.id.clone());
            } else {
                partition.positive.push(record.id.clone());
            }
        }
        partition
    }
}

/// Number of negatives drawn for `positives` positives at `split_rate`.
pub fn negatives_for(positives: usize, split_rate: f64) -> EnsembleResult<usize> {
    if !split_rate.is_finite() || split_rate <= 0.0 {
        return Err(EnsembleError::Configuration(format!(
            "split_rate must be > 0 (got {split_rate})"
        )));
    }
    Ok((positives as f64 * split_rate).floor() as usize)
}

/// Fail fast when `partition` cannot satisfy a resample at `split_rate`.
pub fn check_sufficient(partition: &ClassPartition, split_rate: f64) -> EnsembleResult<usize> {
    if partition.positive.is_empty() {
        return Err(EnsembleError::NoPositives);
    }
    let requested = negatives_for(partition.positive.len(), split_rate)?;
    if requested > partition.negative.len() {
        return Err(EnsembleError::InsufficientData {
            requested,
            available: partition.negative.len(),
        });
    }
    Ok(requested)
}

/// Draw `floor(|positive| * split_rate)` negatives without replacement and
/// append every positive.
///
/// Identical seed and inputs always produce the identical sample.
pub fn resample(partition: &ClassPartition, split_rate: f64, seed: u64) -> EnsembleResult<Sample> {
    let requested = check_sufficient(partition, split_rate)?;

    let mut rng = StdRng::seed_from_u64(seed);
    let drawn = rand::seq::index::sample(&mut rng, partition.negative.len(), requested);

    let mut ids = Vec::with_capacity(requested + partition.positive.len());
    ids.extend(drawn.into_iter().map(|idx| partition.negative[idx].clone()));
    ids.extend(partition.positive.iter().cloned());

    let mut labels = vec![NEGATIVE; requested];
    labels.resize(ids.len(), POSITIVE);

    Ok(Sample { ids, labels })
}

/// Pair externally supplied per-estimator id and label lists.
///
/// Returns `None` when neither is given (the resampler is used), or one
/// `Sample` per estimator when both are. Any partial combination is a
/// configuration error.
pub fn pair_supplied_samples(
    ids: Option<Vec<Vec<RecordId>>>,
    labels: Option<Vec<Vec<Label>>>,
    n_estimators: usize,
) -> EnsembleResult<Option<Vec<Sample>>> {
    match (ids, labels) {
        (None, None) => Ok(None),
        (Some(_), None) => Err(EnsembleError::Configuration(
            "training samples were supplied without their labels".to_string(),
        )),
        (None, Some(_)) => Err(EnsembleError::Configuration(
            "training labels were supplied without their samples".to_string(),
        )),
        (Some(ids), Some(labels)) => {
            if ids.len() != n_estimators || labels.len() != n_estimators {
                return Err(EnsembleError::Configuration(format!(
                    "expected {n_estimators} supplied samples, got {} id lists and {} label lists",
                    ids.len(),
                    labels.len()
                )));
            }
            ids.into_iter()
                .zip(labels)
                .map(|(ids, labels)| Sample::new(ids, labels))
                .collect::<EnsembleResult<Vec<_>>>()
                .map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn partition(pos: usize, neg: usize) -> ClassPartition {
        ClassPartition {
            positive: (0..pos).map(|i| RecordId(format!("p{i}"))).collect(),
            negative: (0..neg).map(|i| RecordId(format!("n{i}"))).collect(),
        }
    }

    #[test]
    fn test_resample_concrete_scenario() {
        let part = partition(8, 40);
        let sample = resample(&part, 0.25, 1).unwrap();

        assert_eq!(sample.len(), 10);
        assert_eq!(sample.positives(), 8);
        for p in &part.positive {
            assert!(sample.ids.contains(p));
        }

        let again = resample(&part, 0.25, 1).unwrap();
        assert_eq!(sample, again);
    }

    #[test]
    fn test_resample_draws_distinct_negatives() {
        let part = partition(20, 30);
        for rate in [0.05, 0.5, 1.0, 1.5] {
            let sample = resample(&part, rate, 7).unwrap();
            let negatives: Vec<_> = sample
                .ids
                .iter()
                .zip(&sample.labels)
                .filter(|(_, l)| **l == NEGATIVE)
                .map(|(id, _)| id.clone())
                .collect();
            assert_eq!(negatives.len(), (20.0 * rate) as usize);
            let unique: HashSet<_> = negatives.iter().collect();
            assert_eq!(unique.len(), negatives.len());
            assert!(negatives.iter().all(|id| part.negative.contains(id)));
        }
    }

    #[test]
    fn test_resample_rejects_too_many_negatives() {
        let err = resample(&partition(10, 3), 0.5, 0).unwrap_err();
        assert!(matches!(err, EnsembleError::InsufficientData { requested: 5, available: 3 }));
    }

    #[test]
    fn test_resample_rejects_bad_split_rate() {
        assert!(matches!(resample(&partition(4, 4), 0.0, 0), Err(EnsembleError::Configuration(_))));
        assert!(matches!(resample(&partition(4, 4), f64::NAN, 0), Err(EnsembleError::Configuration(_))));
    }

    #[test]
    fn test_resample_requires_positives() {
        assert!(matches!(resample(&partition(0, 4), 0.5, 0), Err(EnsembleError::NoPositives)));
    }

    #[test]
    fn test_supplied_samples_must_come_with_labels() {
        let ids = vec![vec![RecordId::from("a")]];
        let err = pair_supplied_samples(Some(ids.clone()), None, 1).unwrap_err();
        assert!(matches!(err, EnsembleError::Configuration(_)));

        assert!(pair_supplied_samples(None, Some(vec![vec![1]]), 1).is_err());
        assert!(pair_supplied_samples(None, None, 3).unwrap().is_none());

        let paired = pair_supplied_samples(Some(ids), Some(vec![vec![1]]), 1).unwrap().unwrap();
        assert_eq!(paired[0].labels, vec![1]);
    }

    #[test]
    fn test_supplied_samples_must_match_estimator_count() {
        let ids = vec![vec![RecordId::from("a")]];
        assert!(pair_supplied_samples(Some(ids.clone()), Some(vec![vec![1]]), 2).is_err());
        assert!(pair_supplied_samples(Some(ids), Some(vec![vec![1, 0]]), 1).is_err());
    }
}
