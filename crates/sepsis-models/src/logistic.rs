//! Logistic regression over sequence summaries.

use crate::features::{summarize_batches, SummaryTable};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use sepsis_training::artifacts::read_json;
use sepsis_training::{
    ClassifierAdapter, EnsembleError, EnsembleResult, LabeledBatch, Prediction, SequenceBatch, POSITIVE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const LOGISTIC_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticOptions {
    pub learning_rate: f32,
    pub l2: f32,
    /// Seeds weight initialization and per-epoch batch order.
    pub seed: u64,
    /// Reweight rows so both classes contribute equally.
    pub balance_classes: bool,
    pub threshold: f32,
}

impl Default for LogisticOptions {
    fn default() -> Self {
        Self { learning_rate: 0.1, l2: 1e-4, seed: 42, balance_classes: true, threshold: 0.5 }
    }
}

impl LogisticOptions {
    pub fn validate(&self) -> EnsembleResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(EnsembleError::Configuration("learning_rate must be > 0".to_string()));
        }
        if !self.l2.is_finite() || self.l2 < 0.0 {
            return Err(EnsembleError::Configuration("l2 must be >= 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(EnsembleError::Configuration("threshold must be within [0, 1]".to_string()));
        }
        Ok(())
    }
}

/// Versioned, standardized binary logistic regression model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub format_version: u32,
    pub width: usize,
    pub mean: Vec<f32>,
    pub scale: Vec<f32>,
    pub weights: Vec<f32>,
    pub bias: f32,
    pub threshold: f32,
}

impl LogisticModel {
    pub fn validate(&self) -> Result<(), String> {
        if self.format_version != LOGISTIC_FORMAT_VERSION {
            return Err(format!(
                "unsupported format_version {} (expected {LOGISTIC_FORMAT_VERSION})",
                self.format_version
            ));
        }
        if self.width == 0 {
            return Err("width must be > 0".to_string());
        }
        if self.weights.len() != self.width || self.mean.len() != self.width || self.scale.len() != self.width {
            return Err("parameter length mismatch".to_string());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scale must be finite and > 0".to_string());
        }
        if self.weights.iter().chain(&self.mean).any(|w| !w.is_finite()) || !self.bias.is_finite() {
            return Err("non-finite parameters".to_string());
        }
        Ok(())
    }

    /// Positive-class probability for one summary row. Callers check the
    /// row width with `check_width` first; a mismatched row scores 0.5.
    #[must_use]
    pub fn predict_proba(&self, row: &[f32]) -> f32 {
        if row.len() != self.width {
            return 0.5;
        }
        let z = row
            .iter()
            .zip(&self.mean)
            .zip(&self.scale)
            .zip(&self.weights)
            .fold(self.bias, |acc, (((x, m), s), w)| acc + w * (x - m) / s);
        sigmoid(z)
    }

    #[must_use]
    pub fn predict_label(&self, row: &[f32]) -> u8 {
        u8::from(self.predict_proba(row) >= self.threshold)
    }
}

/// Fail when summary rows are not `width` wide, which happens when inference
/// events carry a different number of features than the training events.
pub fn check_width(rows: &[Vec<f32>], width: usize) -> EnsembleResult<()> {
    match rows.iter().find(|row| row.len() != width) {
        Some(row) => Err(EnsembleError::Configuration(format!(
            "model expects {width} summary features but the input produces {}",
            row.len()
        ))),
        None => Ok(()),
    }
}

pub(crate) fn sigmoid(z: f32) -> f32 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Fit a model with one gradient step per scheduled batch.
///
/// `row_weights`, when given, scales each row's contribution on top of class
/// balancing.
pub fn train_logistic(
    table: &SummaryTable,
    row_weights: Option<&[f32]>,
    options: &LogisticOptions,
    epochs: u32,
) -> EnsembleResult<LogisticModel> {
    options.validate()?;
    if table.is_empty() {
        return Err(EnsembleError::Training("empty training set".to_string()));
    }
    if let Some(w) = row_weights {
        if w.len() != table.len() {
            return Err(EnsembleError::Training(format!(
                "{} row weights for {} rows",
                w.len(),
                table.len()
            )));
        }
    }

    let width = table.width();
    let (mean, scale) = standardization(&table.rows, width);
    let x: Vec<Vec<f32>> = table
        .rows
        .iter()
        .map(|row| row.iter().zip(&mean).zip(&scale).map(|((v, m), s)| (v - m) / s).collect())
        .collect();

    let class_weight = class_weights(table, options.balance_classes);
    let mut rng = StdRng::seed_from_u64(options.seed);
    let mut weights: Vec<f32> = (0..width).map(|_| (rng.r#gen::<f32>() - 0.5) * 0.01).collect();
    let mut bias = 0.0f32;
    let mut order: Vec<usize> = (0..table.batches.len()).collect();
    let lr = options.learning_rate;

    for epoch in 0..epochs {
        order.shuffle(&mut rng);
        let mut loss = 0.0f32;
        let mut seen = 0.0f32;
        for &b in &order {
            let mut grad_w = vec![0.0f32; width];
            let mut grad_b = 0.0f32;
            let mut batch_weight = 0.0f32;
            for i in table.batches[b].clone() {
                let y = table.labels[i];
                let weight = class_weight[usize::from(y == POSITIVE)] * row_weights.map_or(1.0, |w| w[i]);
                if weight == 0.0 {
                    continue;
                }
                let z = x[i].iter().zip(&weights).fold(bias, |acc, (v, w)| acc + v * w);
                let p = sigmoid(z);
                let target = if y == POSITIVE { 1.0 } else { 0.0 };
                let diff = p - target;
                for (g, v) in grad_w.iter_mut().zip(&x[i]) {
                    *g += diff * v * weight;
                }
                grad_b += diff * weight;
                batch_weight += weight;
                loss -= weight * if y == POSITIVE { p.max(1e-7).ln() } else { (1.0 - p).max(1e-7).ln() };
                seen += weight;
            }
            if batch_weight == 0.0 {
                continue;
            }
            let inv = 1.0 / batch_weight;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * (g * inv + options.l2 * *w);
            }
            bias -= lr * grad_b * inv;
        }
        if seen > 0.0 {
            tracing::trace!(epoch, loss = loss / seen, "logistic epoch");
        }
    }

    let model = LogisticModel {
        format_version: LOGISTIC_FORMAT_VERSION,
        width,
        mean,
        scale,
        weights,
        bias,
        threshold: options.threshold,
    };
    model
        .validate()
        .map_err(|e| EnsembleError::Training(format!("training diverged: {e}")))?;
    Ok(model)
}

fn standardization(rows: &[Vec<f32>], width: usize) -> (Vec<f32>, Vec<f32>) {
    let n = rows.len() as f32;
    let mut mean = vec![0.0f32; width];
    for row in rows {
        for (m, v) in mean.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let mut var = vec![0.0f32; width];
    for row in rows {
        for ((acc, v), m) in var.iter_mut().zip(row).zip(&mean) {
            *acc += (v - m) * (v - m) / n;
        }
    }
    let scale = var.into_iter().map(|v| if v.sqrt() > 1e-6 { v.sqrt() } else { 1.0 }).collect();
    (mean, scale)
}

/// `[negative, positive]` weights.
fn class_weights(table: &SummaryTable, balance: bool) -> [f32; 2] {
    if !balance {
        return [1.0, 1.0];
    }
    let positives = table.labels.iter().filter(|&&l| l == POSITIVE).count() as f32;
    let negatives = table.len() as f32 - positives;
    let total = table.len() as f32;
    let weight = |count: f32| if count == 0.0 { 0.0 } else { total / (2.0 * count) };
    [weight(negatives), weight(positives)]
}

pub(crate) fn write_model<T: Serialize>(path: &Path, model: &T) -> EnsembleResult<()> {
    std::fs::write(path, serde_json::to_vec_pretty(model)?)?;
    Ok(())
}

pub(crate) fn read_model<T, F>(path: &Path, validate: F) -> EnsembleResult<T>
where
    T: serde::de::DeserializeOwned,
    F: FnOnce(&T) -> Result<(), String>,
{
    let model: T = read_json(path)?;
    validate(&model).map_err(|reason| EnsembleError::corrupt(path, reason))?;
    Ok(model)
}

#[derive(Debug, Default)]
pub struct LogisticSequenceClassifier {
    options: LogisticOptions,
    model: Option<LogisticModel>,
}

impl LogisticSequenceClassifier {
    #[must_use]
    pub fn new(options: LogisticOptions) -> Self {
        Self { options, model: None }
    }

    #[must_use]
    pub fn model(&self) -> Option<&LogisticModel> {
        self.model.as_ref()
    }

    fn fitted(&self) -> EnsembleResult<&LogisticModel> {
        self.model
            .as_ref()
            .ok_or_else(|| EnsembleError::Training("logistic classifier has not been fitted".to_string()))
    }
}

impl ClassifierAdapter for LogisticSequenceClassifier {
    fn id(&self) -> &'static str {
        "logistic"
    }

    fn fit(&mut self, batches: &[LabeledBatch<'_>], epochs: u32) -> EnsembleResult<()> {
        let table = SummaryTable::from_labeled(batches)?;
        self.model = Some(train_logistic(&table, None, &self.options, epochs)?);
        Ok(())
    }

    fn predict(&self, batches: &[SequenceBatch<'_>]) -> EnsembleResult<Vec<Prediction>> {
        let model = self.fitted()?;
        let rows = summarize_batches(batches)?;
        check_width(&rows, model.width)?;
        Ok(rows
            .iter()
            .map(|row| {
                let score = model.predict_proba(row);
                Prediction { label: u8::from(score >= model.threshold), score }
            })
            .collect())
    }

    fn save(&self, path: &Path) -> EnsembleResult<()> {
        write_model(path, self.fitted()?)
    }

    fn load(&mut self, path: &Path) -> EnsembleResult<()> {
        self.model = Some(read_model(path, LogisticModel::validate)?);
        Ok(())
    }
}
