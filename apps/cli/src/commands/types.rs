//! Argument types for CLI subcommands.

use clap::Args;
use std::path::PathBuf;

/// Dataset location shared by commands that read records.
#[derive(Args, Debug, Clone)]
pub struct DatasetArgs {
    /// JSONL dataset file, or a directory of `<id>.json` event matrices
    #[arg(short, long)]
    pub dataset: PathBuf,

    /// JSON object of `id -> label` (required when --dataset is a directory)
    #[arg(long)]
    pub labels: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Directory receiving estimator artifacts and manifests
    #[arg(short, long)]
    pub output: PathBuf,

    /// Configuration file (defaults to ./sepsis.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Number of estimators to train
    #[arg(long)]
    pub estimators: Option<usize>,

    /// Negatives drawn per positive record
    #[arg(long)]
    pub split_rate: Option<f64>,

    /// Training epochs per estimator
    #[arg(long)]
    pub epochs: Option<u32>,

    /// Maximum sequences per same-length batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Base resampling seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Estimators trained concurrently
    #[arg(long)]
    pub workers: Option<usize>,

    /// Classifier to train (logistic, boosted)
    #[arg(long)]
    pub classifier: Option<String>,

    /// Output the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Directory holding a trained ensemble
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output predictions as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Directory holding a trained ensemble
    #[arg(short, long)]
    pub output: PathBuf,

    /// Output the manifest as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BucketsArgs {
    #[command(flatten)]
    pub dataset: DatasetArgs,

    /// Maximum sequences per batch
    #[arg(long, default_value_t = 30)]
    pub batch_size: usize,

    /// Length index cache file, rebuilt when stale
    #[arg(long)]
    pub cache: Option<PathBuf>,

    /// Output the histogram as JSON
    #[arg(long)]
    pub json: bool,
}
