//! CLI configuration file support.
//!
//! Configuration precedence:
//! 1. CLI arguments (handled by clap)
//! 2. Config file (`--config <path>` or ./sepsis.toml)
//! 3. Defaults

use sepsis_models::ClassifierKind;
use sepsis_training::EnsembleSpec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// `[ensemble]` table. Every key is optional and falls back to `EnsembleSpec` defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnsembleSection {
    pub estimators: Option<usize>,
    pub split_rate: Option<f64>,
    pub epochs: Option<u32>,
    pub max_batch_size: Option<usize>,
    pub seed: Option<u64>,
    pub workers: Option<usize>,
    pub artifact_template: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SepsisConfig {
    #[serde(default)]
    pub ensemble: EnsembleSection,

    /// `[classifier]` table, e.g. `kind = "boosted"`, `learners = 20`.
    #[serde(default)]
    pub classifier: Option<ClassifierKind>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

impl SepsisConfig {
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    pub fn default_local_path() -> PathBuf {
        PathBuf::from("sepsis.toml")
    }

    /// Load `explicit` if given (it must exist), otherwise ./sepsis.toml when present.
    pub fn discover_and_load(explicit: Option<&Path>) -> ConfigResult<Self> {
        let mut config = Self::default();
        match explicit {
            Some(path) => config.merge(&Self::load_from_file(path)?),
            None => {
                let local = Self::default_local_path();
                if local.exists() {
                    config.merge(&Self::load_from_file(&local)?);
                }
            }
        }
        Ok(config)
    }

    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &Self) {
        let (mine, theirs) = (&mut self.ensemble, &other.ensemble);
        if theirs.estimators.is_some() {
            mine.estimators = theirs.estimators;
        }
        if theirs.split_rate.is_some() {
            mine.split_rate = theirs.split_rate;
        }
        if theirs.epochs.is_some() {
            mine.epochs = theirs.epochs;
        }
        if theirs.max_batch_size.is_some() {
            mine.max_batch_size = theirs.max_batch_size;
        }
        if theirs.seed.is_some() {
            mine.seed = theirs.seed;
        }
        if theirs.workers.is_some() {
            mine.workers = theirs.workers;
        }
        if let Some(ref template) = theirs.artifact_template {
            mine.artifact_template = Some(template.clone());
        }
        if let Some(ref classifier) = other.classifier {
            self.classifier = Some(classifier.clone());
        }
    }

    /// File values layered over `EnsembleSpec::default()`.
    pub fn ensemble_spec(&self) -> EnsembleSpec {
        let defaults = EnsembleSpec::default();
        let section = &self.ensemble;
        EnsembleSpec {
            n_estimators: section.estimators.unwrap_or(defaults.n_estimators),
            split_rate: section.split_rate.unwrap_or(defaults.split_rate),
            epochs: section.epochs.unwrap_or(defaults.epochs),
            max_batch_size: section.max_batch_size.unwrap_or(defaults.max_batch_size),
            seed: section.seed.unwrap_or(defaults.seed),
            workers: section.workers.unwrap_or(defaults.workers),
            artifact_template: section.artifact_template.clone().unwrap_or(defaults.artifact_template),
        }
    }

    /// The configured classifier, replaced by defaults for `name` when the
    /// CLI asks for a different kind.
    pub fn classifier_kind(&self, name: Option<&str>) -> anyhow::Result<ClassifierKind> {
        let configured = self.classifier.clone().unwrap_or_default();
        match name {
            None => Ok(configured),
            Some(name) if name == configured.name() => Ok(configured),
            Some("logistic") => Ok(ClassifierKind::Logistic(Default::default())),
            Some("boosted") => Ok(ClassifierKind::Boosted(Default::default())),
            Some(other) => anyhow::bail!("Unknown classifier: {other} (expected logistic or boosted)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sepsis_models::BoostedOptions;
    use tempfile::TempDir;

    #[test]
    fn test_load_sections_from_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sepsis.toml");
        std::fs::write(
            &path,
            r#"
[ensemble]
estimators = 4
split_rate = 0.5

[classifier]
kind = "boosted"
learners = 6
"#,
        )
        .unwrap();

        let config = SepsisConfig::load_from_file(&path).unwrap();
        let spec = config.ensemble_spec();
        assert_eq!(spec.n_estimators, 4);
        assert!((spec.split_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(spec.epochs, EnsembleSpec::default().epochs);
        assert_eq!(
            config.classifier,
            Some(ClassifierKind::Boosted(BoostedOptions { learners: 6, ..BoostedOptions::default() }))
        );
    }

    #[test]
    fn test_merge_prefers_other() {
        let mut base = SepsisConfig::default();
        base.ensemble.seed = Some(1);
        base.ensemble.epochs = Some(3);
        let mut other = SepsisConfig::default();
        other.ensemble.seed = Some(9);

        base.merge(&other);
        assert_eq!(base.ensemble.seed, Some(9));
        assert_eq!(base.ensemble.epochs, Some(3));
    }

    #[test]
    fn test_classifier_flag_overrides_kind() {
        let config = SepsisConfig {
            classifier: Some(ClassifierKind::Boosted(BoostedOptions { learners: 6, ..BoostedOptions::default() })),
            ..SepsisConfig::default()
        };
        assert_eq!(config.classifier_kind(Some("boosted")).unwrap(), config.classifier.clone().unwrap());
        assert_eq!(config.classifier_kind(Some("logistic")).unwrap().name(), "logistic");
        assert!(config.classifier_kind(Some("forest")).is_err());
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let temp = TempDir::new().unwrap();
        let result = SepsisConfig::discover_and_load(Some(&temp.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }
}
