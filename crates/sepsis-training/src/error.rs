use std::path::PathBuf;
use thiserror::Error;

pub type EnsembleResult<T> = std::result::Result<T, EnsembleError>;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("insufficient data: requested {requested} negative records but only {available} are available")]
    InsufficientData { requested: usize, available: usize },

    #[error("insufficient data: dataset has no positive records")]
    NoPositives,

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    #[error("corrupt artifact {}: {reason}", .path.display())]
    CorruptArtifact { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EnsembleError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptArtifact { path: path.into(), reason: reason.to_string() }
    }
}
