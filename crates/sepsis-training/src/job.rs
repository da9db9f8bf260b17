use crate::error::{EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier for one `fit_ensemble` run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnsembleRunId(pub String);

impl EnsembleRunId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for EnsembleRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EnsembleRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Placeholders substituted with the estimator ordinal in artifact templates.
pub const ORDINAL_PLACEHOLDERS: [&str; 2] = ["{n}", "{}"];

/// Training configuration shared by every estimator of an ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleSpec {
    pub n_estimators: usize,
    /// Negatives drawn per positive.
    pub split_rate: f64,
    pub epochs: u32,
    pub max_batch_size: usize,
    pub seed: u64,
    /// Maximum concurrent trainings on the parallel path.
    pub workers: usize,
    /// Artifact file name with `{n}` (or `{}`) standing for the ordinal.
    pub artifact_template: String,
}

impl Default for EnsembleSpec {
    fn default() -> Self {
        Self {
            n_estimators: 10,
            split_rate: 0.2,
            epochs: 10,
            max_batch_size: 30,
            seed: 42,
            workers: 1,
            artifact_template: "bagging_{n}.model".to_string(),
        }
    }
}

impl EnsembleSpec {
    pub fn validate(&self) -> EnsembleResult<()> {
        if self.n_estimators == 0 {
            return Err(EnsembleError::Configuration("n_estimators must be >= 1".to_string()));
        }
        if !self.split_rate.is_finite() || self.split_rate <= 0.0 {
            return Err(EnsembleError::Configuration("split_rate must be > 0".to_string()));
        }
        if self.epochs == 0 {
            return Err(EnsembleError::Configuration("epochs must be >= 1".to_string()));
        }
        if self.max_batch_size == 0 {
            return Err(EnsembleError::Configuration("max_batch_size must be >= 1".to_string()));
        }
        if self.workers == 0 {
            return Err(EnsembleError::Configuration("workers must be >= 1".to_string()));
        }
        validate_artifact_template(&self.artifact_template)
    }

    /// Resampling seed for estimator `ordinal`.
    ///
    /// Each ordinal owns its seed so skipping resumed ordinals never changes
    /// the samples drawn for the others.
    #[must_use]
    pub fn estimator_seed(&self, ordinal: usize) -> u64 {
        self.seed.wrapping_add(ordinal as u64)
    }
}

pub fn validate_artifact_template(template: &str) -> EnsembleResult<()> {
    if template.trim().is_empty() {
        return Err(EnsembleError::Configuration("artifact_template is required".to_string()));
    }
    if !ORDINAL_PLACEHOLDERS.iter().any(|p| template.contains(p)) {
        return Err(EnsembleError::Configuration(format!(
            "artifact_template {template:?} has no {{n}} placeholder; every estimator would share one file"
        )));
    }
    if template.contains('/') || template.contains('\\') {
        return Err(EnsembleError::Configuration(
            "artifact_template must be a file name, not a path".to_string(),
        ));
    }
    Ok(())
}

/// Substitute `ordinal` into an artifact template.
#[must_use]
pub fn render_artifact_name(template: &str, ordinal: usize) -> String {
    let ordinal = ordinal.to_string();
    ORDINAL_PLACEHOLDERS
        .iter()
        .fold(template.to_string(), |name, p| name.replace(p, &ordinal))
}
