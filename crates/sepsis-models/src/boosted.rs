//! Discrete AdaBoost over logistic weak learners.

use crate::features::{summarize_batches, SummaryTable};
use crate::logistic::{check_width, read_model, train_logistic, write_model, LogisticModel, LogisticOptions};
use sepsis_training::{
    ClassifierAdapter, EnsembleError, EnsembleResult, LabeledBatch, Prediction, SequenceBatch, POSITIVE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const BOOSTED_FORMAT_VERSION: u32 = 1;

const MIN_ERROR: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedOptions {
    pub learners: usize,
    /// Options for each weak learner; learner `m` is seeded with `seed + m`.
    pub learner: LogisticOptions,
}

impl Default for BoostedOptions {
    fn default() -> Self {
        Self { learners: 10, learner: LogisticOptions::default() }
    }
}

impl BoostedOptions {
    pub fn validate(&self) -> EnsembleResult<()> {
        if self.learners == 0 {
            return Err(EnsembleError::Configuration("learners must be > 0".to_string()));
        }
        self.learner.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedLearner {
    pub alpha: f32,
    pub model: LogisticModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedModel {
    pub format_version: u32,
    pub learners: Vec<WeightedLearner>,
}

impl BoostedModel {
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != BOOSTED_FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {} (expected {BOOSTED_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.learners.is_empty() {
            return Err("no learners".to_string());
        }
        let width = self.width();
        for (m, learner) in self.learners.iter().enumerate() {
            if learner.model.width != width {
                return Err(format!("learner {m} has width {} but learner 0 has {width}", learner.model.width));
            }
            if !learner.alpha.is_finite() || learner.alpha < 0.0 {
                return Err(format!("learner {m} has invalid alpha {}", learner.alpha));
            }
            learner.model.validate().map_err(|e| format!("learner {m}: {e}"))?;
        }
        Ok(())
    }

    /// Summary width shared by every learner.
    #[must_use]
    pub fn width(&self) -> usize {
        self.learners.first().map_or(0, |l| l.model.width)
    }

    /// Alpha-weighted vote mapped to `[0, 1]`. When every learner was
    /// discarded the mean learner probability is used instead.
    #[must_use]
    pub fn score(&self, row: &[f32]) -> f32 {
        let total: f32 = self.learners.iter().map(|l| l.alpha).sum();
        if total <= 0.0 {
            let sum: f32 = self.learners.iter().map(|l| l.model.predict_proba(row)).sum();
            return sum / self.learners.len().max(1) as f32;
        }
        let vote: f32 = self
            .learners
            .iter()
            .map(|l| if l.model.predict_label(row) == POSITIVE { l.alpha } else { -l.alpha })
            .sum();
        (vote / total + 1.0) / 2.0
    }
}

pub fn train_boosted(table: &SummaryTable, options: &BoostedOptions, epochs: u32) -> EnsembleResult<BoostedModel> {
    options.validate()?;
    let n = table.len();
    let uniform = 1.0 / n as f32;
    let mut weights = vec![uniform; n];
    let mut learners = Vec::with_capacity(options.learners);

    for m in 0..options.learners {
        let learner_options = LogisticOptions {
            seed: options.learner.seed.wrapping_add(m as u64),
            ..options.learner.clone()
        };
        // Row weights are rescaled to mean 1 so the learning rate keeps its meaning.
        let scaled: Vec<f32> = weights.iter().map(|w| w * n as f32).collect();
        let model = train_logistic(table, Some(&scaled), &learner_options, epochs)?;

        let missed: Vec<bool> = table
            .rows
            .iter()
            .zip(&table.labels)
            .map(|(row, &y)| model.predict_label(row) != y)
            .collect();
        let total: f32 = weights.iter().sum();
        let err = (weights.iter().zip(&missed).filter(|(_, m)| **m).map(|(w, _)| w).sum::<f32>() / total)
            .clamp(MIN_ERROR, 1.0 - MIN_ERROR);

        let alpha = if err >= 0.5 {
            weights.fill(uniform);
            0.0
        } else {
            let alpha = ((1.0 - err) / err).ln();
            for (w, miss) in weights.iter_mut().zip(&missed) {
                if *miss {
                    *w *= alpha.exp();
                }
            }
            let sum: f32 = weights.iter().sum();
            for w in &mut weights {
                *w /= sum;
            }
            alpha
        };
        tracing::debug!(learner = m, err, alpha, "boosting round");
        learners.push(WeightedLearner { alpha, model });
    }

    let model = BoostedModel { format_version: BOOSTED_FORMAT_VERSION, learners };
    model
        .validate()
        .map_err(|e| EnsembleError::Training(format!("boosting produced an invalid model: {e}")))?;
    Ok(model)
}

#[derive(Debug, Default)]
pub struct BoostedSequenceClassifier {
    options: BoostedOptions,
    model: Option<BoostedModel>,
}

impl BoostedSequenceClassifier {
    #[must_use]
    pub fn new(options: BoostedOptions) -> Self {
        Self { options, model: None }
    }

    #[must_use]
    pub fn model(&self) -> Option<&BoostedModel> {
        self.model.as_ref()
    }

    fn fitted(&self) -> EnsembleResult<&BoostedModel> {
        self.model
            .as_ref()
            .ok_or_else(|| EnsembleError::Training("boosted classifier has not been fitted".to_string()))
    }
}

impl ClassifierAdapter for BoostedSequenceClassifier {
    fn id(&self) -> &'static str {
        "boosted"
    }

    fn fit(&mut self, batches: &[LabeledBatch<'_>], epochs: u32) -> EnsembleResult<()> {
        let table = SummaryTable::from_labeled(batches)?;
        self.model = Some(train_boosted(&table, &self.options, epochs)?);
        Ok(())
    }

    fn predict(&self, batches: &[SequenceBatch<'_>]) -> EnsembleResult<Vec<Prediction>> {
        let model = self.fitted()?;
        let rows = summarize_batches(batches)?;
        check_width(&rows, model.width())?;
        Ok(rows
            .iter()
            .map(|row| {
                let score = model.score(row);
                Prediction { label: u8::from(score >= 0.5), score }
            })
            .collect())
    }

    fn save(&self, path: &Path) -> EnsembleResult<()> {
        write_model(path, self.fitted()?)
    }

    fn load(&mut self, path: &Path) -> EnsembleResult<()> {
        self.model = Some(read_model(path, BoostedModel::validate)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepsis_training::Event;
    use tempfile::TempDir;

    fn learner(alpha: f32, bias: f32) -> WeightedLearner {
        WeightedLearner {
            alpha,
            model: LogisticModel {
                format_version: 1,
                width: 1,
                mean: vec![0.0],
                scale: vec![1.0],
                weights: vec![0.0],
                bias,
                threshold: 0.5,
            },
        }
    }

    #[test]
    fn test_score_is_weighted_vote() {
        let model = BoostedModel {
            format_version: BOOSTED_FORMAT_VERSION,
            learners: vec![learner(3.0, 2.0), learner(1.0, -2.0)],
        };
        // (3 - 1) / 4 mapped from [-1, 1] to [0, 1]
        assert!((model.score(&[0.0]) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_score_falls_back_to_mean_probability() {
        let model = BoostedModel {
            format_version: BOOSTED_FORMAT_VERSION,
            learners: vec![learner(0.0, 0.0), learner(0.0, 0.0)],
        };
        assert!((model.score(&[0.0]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_fit_predict_and_reload() {
        let data: Vec<(Vec<Event>, u8)> = (0..24)
            .map(|i| {
                let label = u8::from(i % 3 == 0);
                (vec![vec![if label == 1 { 2.0 } else { -2.0 }]; 2 + i % 2], label)
            })
            .collect();
        let batches: Vec<_> = data
            .chunks(5)
            .map(|c| LabeledBatch {
                inputs: SequenceBatch { length: 0, sequences: c.iter().map(|(s, _)| s.as_slice()).collect() },
                labels: c.iter().map(|(_, l)| *l).collect(),
            })
            .collect();

        let mut clf = BoostedSequenceClassifier::new(BoostedOptions { learners: 3, ..BoostedOptions::default() });
        clf.fit(&batches, 10).unwrap();
        assert_eq!(clf.model().unwrap().learners.len(), 3);

        let inputs: Vec<_> = batches.iter().map(|b| b.inputs.clone()).collect();
        let predictions = clf.predict(&inputs).unwrap();
        assert!(predictions.iter().zip(&data).all(|(p, (_, y))| p.label == *y));

        let temp = TempDir::new().unwrap();
        let path = temp.path().join("boosted.json");
        clf.save(&path).unwrap();
        let mut restored = BoostedSequenceClassifier::default();
        restored.load(&path).unwrap();
        assert_eq!(restored.model(), clf.model());
    }

    #[test]
    fn test_predict_rejects_different_feature_width() {
        let model = BoostedModel {
            format_version: BOOSTED_FORMAT_VERSION,
            learners: vec![learner(1.0, 2.0)],
        };
        let clf = BoostedSequenceClassifier { options: BoostedOptions::default(), model: Some(model) };

        let events = vec![vec![1.0, 2.0, 3.0]; 2];
        let inputs = [SequenceBatch { length: 2, sequences: vec![events.as_slice()] }];
        assert!(matches!(clf.predict(&inputs), Err(EnsembleError::Configuration(_))));
    }

    #[test]
    fn test_mixed_learner_widths_are_invalid() {
        let mut wide = learner(1.0, 0.0);
        wide.model.width = 2;
        wide.model.mean = vec![0.0; 2];
        wide.model.scale = vec![1.0; 2];
        wide.model.weights = vec![0.0; 2];
        let model = BoostedModel { format_version: BOOSTED_FORMAT_VERSION, learners: vec![learner(1.0, 0.0), wide] };
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_zero_learners_rejected() {
        let options = BoostedOptions { learners: 0, ..BoostedOptions::default() };
        assert!(matches!(options.validate(), Err(EnsembleError::Configuration(_))));
    }
}
