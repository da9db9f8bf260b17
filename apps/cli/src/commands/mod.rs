//! Command implementations for the sepsis CLI.

pub mod buckets;
pub mod list;
pub mod predict;
pub mod train;
pub mod types;

pub use types::{BucketsArgs, DatasetArgs, ListArgs, PredictArgs, TrainArgs};

use anyhow::{Context, Result};
use sepsis_training::{load_dataset, Dataset, DatasetSource};

/// Load records from a JSONL file or a labelled directory.
pub fn load(args: &DatasetArgs) -> Result<Dataset> {
    let source = if args.dataset.is_dir() {
        let labels = args
            .labels
            .clone()
            .context("--labels is required when --dataset is a directory")?;
        DatasetSource::Directory { root: args.dataset.clone(), labels }
    } else {
        DatasetSource::Jsonl { path: args.dataset.clone() }
    };
    load_dataset(&source).with_context(|| format!("Failed to load dataset from {}", args.dataset.display()))
}
