//! Sepsis Models
//!
//! Reference `ClassifierAdapter` implementations for the ensemble trainer.
//! Sequences are reduced to fixed-width summaries (`features`) and fed to a
//! logistic regression or an AdaBoost ensemble of logistic learners.

pub mod boosted;
pub mod factory;
pub mod features;
pub mod logistic;

pub use boosted::{BoostedModel, BoostedOptions, BoostedSequenceClassifier};
pub use factory::{ClassifierFactory, ClassifierKind};
pub use features::{summarize, summary_width, SummaryTable};
pub use logistic::{check_width, LogisticModel, LogisticOptions, LogisticSequenceClassifier};
