use crate::boosted::{BoostedOptions, BoostedSequenceClassifier};
use crate::logistic::{LogisticOptions, LogisticSequenceClassifier};
use sepsis_training::{AdapterFactory, ClassifierAdapter, EnsembleError, EnsembleResult};
use serde::{Deserialize, Serialize};

/// Which reference classifier to train, with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierKind {
    Logistic(LogisticOptions),
    Boosted(BoostedOptions),
}

impl Default for ClassifierKind {
    fn default() -> Self {
        Self::Logistic(LogisticOptions::default())
    }
}

impl ClassifierKind {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Logistic(_) => "logistic",
            Self::Boosted(_) => "boosted",
        }
    }

    pub fn validate(&self) -> EnsembleResult<()> {
        match self {
            Self::Logistic(options) => options.validate(),
            Self::Boosted(options) => options.validate(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClassifierFactory {
    kind: ClassifierKind,
}

impl ClassifierFactory {
    pub fn new(kind: ClassifierKind) -> EnsembleResult<Self> {
        kind.validate()?;
        Ok(Self { kind })
    }

    /// Rebuild a factory from the config recorded in an ensemble manifest.
    pub fn from_config(config: &serde_json::Value) -> EnsembleResult<Self> {
        if config.is_null() {
            return Ok(Self::default());
        }
        let kind = serde_json::from_value(config.clone())
            .map_err(|e| EnsembleError::Configuration(format!("invalid classifier config: {e}")))?;
        Self::new(kind)
    }

    #[must_use]
    pub fn kind(&self) -> &ClassifierKind {
        &self.kind
    }
}

impl AdapterFactory for ClassifierFactory {
    fn id(&self) -> &'static str {
        self.kind.name()
    }

    fn create(&self) -> Box<dyn ClassifierAdapter> {
        match &self.kind {
            ClassifierKind::Logistic(options) => Box::new(LogisticSequenceClassifier::new(options.clone())),
            ClassifierKind::Boosted(options) => Box::new(BoostedSequenceClassifier::new(options.clone())),
        }
    }

    fn config(&self) -> EnsembleResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.kind)?)
    }
}
