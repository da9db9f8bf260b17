use crate::job::EnsembleRunId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { run_id: EnsembleRunId, n_estimators: usize },
    Sampled { run_id: EnsembleRunId, ordinal: usize, size: usize, positives: usize, reused: bool },
    Scheduled { run_id: EnsembleRunId, ordinal: usize, batches: usize },
    Persisted { run_id: EnsembleRunId, ordinal: usize, seconds: f64 },
    Resumed { run_id: EnsembleRunId, ordinal: usize },
    Failed { run_id: EnsembleRunId, ordinal: usize, reason: String },
    Finished { run_id: EnsembleRunId, persisted: usize, failed: usize },
}

pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Emits progress as structured `tracing` events.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { run_id, n_estimators } => {
                tracing::info!(%run_id, n_estimators, "ensemble training started");
            }
            ProgressEvent::Sampled { run_id, ordinal, size, positives, reused } => {
                tracing::info!(%run_id, ordinal, size, positives, reused, "estimator sampled");
            }
            ProgressEvent::Scheduled { run_id, ordinal, batches } => {
                tracing::debug!(%run_id, ordinal, batches, "estimator batches scheduled");
            }
            ProgressEvent::Persisted { run_id, ordinal, seconds } => {
                tracing::info!(%run_id, ordinal, seconds, "estimator persisted");
            }
            ProgressEvent::Resumed { run_id, ordinal } => {
                tracing::info!(%run_id, ordinal, "estimator already persisted, skipping");
            }
            ProgressEvent::Failed { run_id, ordinal, reason } => {
                tracing::warn!(%run_id, ordinal, %reason, "estimator failed");
            }
            ProgressEvent::Finished { run_id, persisted, failed } => {
                tracing::info!(%run_id, persisted, failed, "ensemble training finished");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct StdoutProgressSink;

impl ProgressSink for StdoutProgressSink {
    fn on_event(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { run_id, n_estimators } => {
                println!("[ensemble:{run_id}] training {n_estimators} estimators");
            }
            ProgressEvent::Sampled { run_id, ordinal, size, positives, reused } => {
                let origin = if reused { "reused" } else { "drawn" };
                println!("[ensemble:{run_id}] estimator {ordinal}: {origin} sample of {size} ({positives} positive)");
            }
            ProgressEvent::Scheduled { .. } => {}
            ProgressEvent::Persisted { run_id, ordinal, seconds } => {
                println!("[ensemble:{run_id}] estimator {ordinal}: persisted in {seconds:.1}s");
            }
            ProgressEvent::Resumed { run_id, ordinal } => {
                println!("[ensemble:{run_id}] estimator {ordinal}: already trained");
            }
            ProgressEvent::Failed { run_id, ordinal, reason } => {
                println!("[ensemble:{run_id}] estimator {ordinal}: failed: {reason}");
            }
            ProgressEvent::Finished { run_id, persisted, failed } => {
                println!("[ensemble:{run_id}] finished ({persisted} persisted, {failed} failed)");
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct NullProgressSink;

impl ProgressSink for NullProgressSink {
    fn on_event(&self, _event: ProgressEvent) {}
}
