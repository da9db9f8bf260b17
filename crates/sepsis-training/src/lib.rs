//! Sepsis Training
//!
//! Bagging ensemble training over variable-length patient event sequences:
//! - Indexing and batching sequences by length (`LengthIndex`, `schedule`)
//! - Class-balanced resampling per estimator (`resample`)
//! - A pluggable classifier interface (`ClassifierAdapter`, `AdapterFactory`)
//! - Orchestrating, persisting and resuming ensembles (`EnsembleTrainer`)

pub mod adapter;
pub mod artifacts;
pub mod builders;
pub mod dataset;
pub mod ensemble;
pub mod error;
pub mod job;
pub mod layout;
pub mod length_index;
pub mod parallel;
pub mod progress;
pub mod registry;
pub mod resampler;
pub mod scheduler;

pub use adapter::{AdapterFactory, ClassifierAdapter, Prediction};
pub use artifacts::{EnsembleManifest, EstimatorManifest, EstimatorRecord, SampleManifest};
pub use builders::{load_dataset, read_directory_records, read_jsonl_records, write_jsonl_dataset};
pub use dataset::{Dataset, DatasetId, DatasetSource, Event, Label, RecordId, SequenceRecord, NEGATIVE, POSITIVE};
pub use ensemble::{
    CancellationFlag, EnsemblePrediction, EnsembleReport, EnsembleTrainer, FailedEstimator, LoadedClassifiers,
};
pub use error::{EnsembleError, EnsembleResult};
pub use job::{EnsembleRunId, EnsembleSpec};
pub use layout::EnsembleLayout;
pub use length_index::LengthIndex;
pub use progress::{NullProgressSink, ProgressEvent, ProgressSink, StdoutProgressSink, TracingProgressSink};
pub use registry::{read_ensemble_manifest, EnsembleRegistry, EstimatorEntry, EstimatorState};
pub use resampler::{resample, ClassPartition, Sample};
pub use scheduler::{materialize, materialize_labeled, schedule, schedule_index, Batch, LabeledBatch, SequenceBatch};
