//! Bagging ensemble orchestration.
//!
//! For each estimator ordinal the trainer obtains a sample, batches it by
//! sequence length, fits a fresh adapter and persists it. Per-estimator
//! failures are recorded and the run continues; configuration and data
//! sufficiency problems abort before anything is written.

use crate::adapter::{AdapterFactory, ClassifierAdapter};
use crate::artifacts::{
    read_json, sha256_file, verify_sha256, write_json, EnsembleManifest, EstimatorManifest,
    SampleManifest,
};
use crate::dataset::{Dataset, DatasetId, Label, RecordId, POSITIVE};
use crate::error::{EnsembleError, EnsembleResult};
use crate::job::{EnsembleRunId, EnsembleSpec};
use crate::layout::EnsembleLayout;
use crate::length_index::LengthIndex;
use crate::progress::{ProgressEvent, ProgressSink, TracingProgressSink};
use crate::registry::{read_ensemble_manifest, EnsembleRegistry, EstimatorEntry, EstimatorState};
use crate::resampler::{check_sufficient, pair_supplied_samples, resample, ClassPartition, Sample};
use crate::scheduler::{materialize_labeled, schedule_index, SequenceBatch};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared flag checked before each estimator starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEstimator {
    pub ordinal: usize,
    pub reason: String,
}

/// Outcome of one `fit_ensemble` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleReport {
    pub run_id: EnsembleRunId,
    /// Every persisted ordinal, including resumed ones.
    pub persisted: Vec<usize>,
    /// Ordinals found already persisted and skipped.
    pub resumed: Vec<usize>,
    pub failed: Vec<FailedEstimator>,
    /// `fit` calls made by this run.
    pub fit_calls: usize,
    pub cancelled: bool,
}

impl EnsembleReport {
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// Soft-voting result across the loaded estimators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub label: Label,
    /// Mean positive-class score.
    pub score: f32,
    pub positive_votes: usize,
    pub voters: usize,
}

/// Classifiers resolved by `EnsembleTrainer::get_classifiers`.
pub struct LoadedClassifiers<'a> {
    pub classifiers: Vec<(usize, &'a dyn ClassifierAdapter)>,
    /// Persisted estimators whose artifact could not be loaded.
    pub errors: Vec<(usize, EnsembleError)>,
}

/// Validated inputs shared by every estimator of a run.
pub(crate) struct RunPlan {
    pub(crate) partition: ClassPartition,
    pub(crate) supplied: Option<Vec<Sample>>,
}

impl RunPlan {
    pub(crate) fn supplied_for(&self, ordinal: usize) -> Option<&Sample> {
        self.supplied.as_ref().and_then(|s| s.get(ordinal))
    }
}

/// Borrowed view of what one estimator needs; shared with the parallel path.
pub(crate) struct EstimatorContext<'a> {
    pub(crate) run_id: &'a EnsembleRunId,
    pub(crate) spec: &'a EnsembleSpec,
    pub(crate) layout: &'a EnsembleLayout,
    pub(crate) factory: &'a dyn AdapterFactory,
    pub(crate) progress: &'a dyn ProgressSink,
    pub(crate) fit_calls: &'a AtomicUsize,
}

pub(crate) struct EstimatorOutcome {
    pub(crate) ordinal: usize,
    pub(crate) state: EstimatorState,
    pub(crate) sample: Option<Sample>,
    pub(crate) sha256: Option<String>,
    pub(crate) resumed: bool,
}

impl EnsembleRegistry {
    pub(crate) fn apply(&mut self, outcome: EstimatorOutcome) {
        if let Some(entry) = self.get_mut(outcome.ordinal) {
            entry.state = outcome.state;
            entry.sample = outcome.sample;
            entry.sha256 = outcome.sha256;
            entry.resumed = outcome.resumed;
        }
    }
}

pub struct EnsembleTrainer {
    run_id: EnsembleRunId,
    spec: EnsembleSpec,
    layout: EnsembleLayout,
    factory: Arc<dyn AdapterFactory>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationFlag,
    registry: EnsembleRegistry,
    classifiers: BTreeMap<usize, Box<dyn ClassifierAdapter>>,
    dataset_id: Option<DatasetId>,
    adapter_config: serde_json::Value,
}

impl EnsembleTrainer {
    pub fn new(spec: EnsembleSpec, root: PathBuf, factory: Arc<dyn AdapterFactory>) -> EnsembleResult<Self> {
        spec.validate()?;
        let layout = EnsembleLayout::new(root, spec.artifact_template.clone())?;
        let registry = EnsembleRegistry::new(&layout, spec.n_estimators);
        Ok(Self {
            run_id: EnsembleRunId::new(),
            spec,
            layout,
            factory,
            progress: Arc::new(TracingProgressSink),
            cancel: CancellationFlag::default(),
            registry,
            classifiers: BTreeMap::new(),
            dataset_id: None,
            adapter_config: serde_json::Value::Null,
        })
    }

    /// Reopen a trained ensemble from its manifest for inference.
    pub fn open(root: &Path, factory: Arc<dyn AdapterFactory>) -> EnsembleResult<Self> {
        let manifest = read_ensemble_manifest(root)?;
        if manifest.adapter != factory.id() {
            return Err(EnsembleError::Configuration(format!(
                "ensemble was trained with adapter {:?} but {:?} was supplied",
                manifest.adapter,
                factory.id()
            )));
        }

        let layout = EnsembleLayout::new(root.to_path_buf(), manifest.spec.artifact_template.clone())?;
        let mut registry = EnsembleRegistry::from_manifest(&manifest);
        for ordinal in 0..registry.entries().len() {
            let path = layout.sample_manifest_path(ordinal);
            if !path.exists() {
                continue;
            }
            match read_json::<SampleManifest>(&path).and_then(SampleManifest::into_sample) {
                Ok(sample) => {
                    if let Some(entry) = registry.get_mut(ordinal) {
                        entry.sample = Some(sample);
                    }
                }
                Err(e) => tracing::warn!(ordinal, error = %e, "ignoring unreadable sample manifest"),
            }
        }

        Ok(Self {
            run_id: manifest.run_id,
            spec: manifest.spec,
            layout,
            factory,
            progress: Arc::new(TracingProgressSink),
            cancel: CancellationFlag::default(),
            registry,
            classifiers: BTreeMap::new(),
            dataset_id: Some(manifest.dataset_id),
            adapter_config: manifest.adapter_config,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Handle that stops the run before the next estimator starts.
    #[must_use]
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    #[must_use]
    pub fn spec(&self) -> &EnsembleSpec {
        &self.spec
    }

    #[must_use]
    pub fn layout(&self) -> &EnsembleLayout {
        &self.layout
    }

    #[must_use]
    pub fn registry(&self) -> &EnsembleRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut EnsembleRegistry {
        &mut self.registry
    }

    pub(crate) fn run_id(&self) -> &EnsembleRunId {
        &self.run_id
    }

    pub(crate) fn factory(&self) -> Arc<dyn AdapterFactory> {
        Arc::clone(&self.factory)
    }

    pub(crate) fn progress(&self) -> Arc<dyn ProgressSink> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn dataset_id(&self) -> Option<&DatasetId> {
        self.dataset_id.as_ref()
    }

    /// Artifact paths of persisted estimators, in ordinal order.
    #[must_use]
    pub fn artifact_paths(&self) -> Vec<PathBuf> {
        self.registry.persisted().map(|e| e.artifact.clone()).collect()
    }

    /// Record ids each estimator was trained on, indexed by ordinal. `None`
    /// for estimators never sampled or resumed without a sample manifest.
    #[must_use]
    pub fn training_samples(&self) -> Vec<Option<Vec<RecordId>>> {
        self.registry
            .entries()
            .iter()
            .map(|e| e.sample.as_ref().map(|s| s.ids.clone()))
            .collect()
    }

    /// Labels matching `training_samples`, indexed by ordinal.
    #[must_use]
    pub fn training_labels(&self) -> Vec<Option<Vec<Label>>> {
        self.registry
            .entries()
            .iter()
            .map(|e| e.sample.as_ref().map(|s| s.labels.clone()))
            .collect()
    }

    /// Every estimator's sample in the shape `fit_ensemble` accepts as
    /// supplied samples. `None` unless every ordinal has a known sample.
    #[must_use]
    pub fn supplied_samples(&self) -> Option<(Vec<Vec<RecordId>>, Vec<Vec<Label>>)> {
        self.registry
            .entries()
            .iter()
            .map(|e| e.sample.as_ref().map(|s| (s.ids.clone(), s.labels.clone())))
            .collect::<Option<Vec<_>>>()
            .map(|pairs| pairs.into_iter().unzip())
    }

    /// Train every estimator that is not already persisted.
    ///
    /// `supplied_ids` / `supplied_labels` replace resampling with fixed
    /// per-estimator samples; both or neither must be given.
    pub fn fit_ensemble(
        &mut self,
        dataset: &Dataset,
        supplied_ids: Option<Vec<Vec<RecordId>>>,
        supplied_labels: Option<Vec<Vec<Label>>>,
    ) -> EnsembleResult<EnsembleReport> {
        let plan = self.prepare(dataset, supplied_ids, supplied_labels)?;
        let fit_calls = AtomicUsize::new(0);

        for ordinal in 0..self.spec.n_estimators {
            if self.cancel.is_cancelled() {
                tracing::warn!(ordinal, "ensemble training cancelled");
                break;
            }

            let ctx = EstimatorContext {
                run_id: &self.run_id,
                spec: &self.spec,
                layout: &self.layout,
                factory: self.factory.as_ref(),
                progress: self.progress.as_ref(),
                fit_calls: &fit_calls,
            };
            let registry = &mut self.registry;
            let outcome = run_estimator(&ctx, dataset, &plan, ordinal, &mut |state| {
                registry.set_state(ordinal, state);
            });
            self.registry.apply(outcome);
        }

        self.finish(fit_calls.load(Ordering::SeqCst))
    }

    /// Validate inputs and create the layout. Nothing is written on error.
    pub(crate) fn prepare(
        &mut self,
        dataset: &Dataset,
        supplied_ids: Option<Vec<Vec<RecordId>>>,
        supplied_labels: Option<Vec<Vec<Label>>>,
    ) -> EnsembleResult<RunPlan> {
        self.spec.validate()?;
        let supplied = pair_supplied_samples(supplied_ids, supplied_labels, self.spec.n_estimators)?;
        if let Some(samples) = &supplied {
            for (ordinal, sample) in samples.iter().enumerate() {
                if let Some(id) = sample.ids.iter().find(|id| !dataset.contains(id)) {
                    return Err(EnsembleError::Configuration(format!(
                        "supplied sample {ordinal} references unknown record {id}"
                    )));
                }
            }
        }

        let adapter_config = self.factory.config()?;

        let partition = ClassPartition::from_dataset(dataset);
        if supplied.is_none() {
            check_sufficient(&partition, self.spec.split_rate)?;
        }

        if let Ok(previous) = read_ensemble_manifest(self.layout.root()) {
            if &previous.dataset_id != dataset.id() {
                tracing::warn!(
                    root = %self.layout.root().display(),
                    "existing ensemble was trained on a different dataset; persisted estimators will be reused"
                );
            }
        }

        self.layout.ensure_dirs()?;
        self.run_id = EnsembleRunId::new();
        self.registry = EnsembleRegistry::new(&self.layout, self.spec.n_estimators);
        self.classifiers.clear();
        self.dataset_id = Some(dataset.id().clone());
        self.adapter_config = adapter_config;

        self.progress.on_event(ProgressEvent::Started {
            run_id: self.run_id.clone(),
            n_estimators: self.spec.n_estimators,
        });

        Ok(RunPlan { partition, supplied })
    }

    /// Write the ensemble manifest and summarize the run.
    pub(crate) fn finish(&mut self, fit_calls: usize) -> EnsembleResult<EnsembleReport> {
        let manifest = EnsembleManifest {
            run_id: self.run_id.clone(),
            created_at: Utc::now(),
            dataset_id: self.dataset_id.clone().unwrap_or_else(|| DatasetId(String::new())),
            spec: self.spec.clone(),
            adapter: self.factory.id().to_string(),
            adapter_config: self.adapter_config.clone(),
            estimators: self.registry.records(),
        };
        write_json(self.layout.ensemble_manifest_path(), &manifest)?;

        let report = EnsembleReport {
            run_id: self.run_id.clone(),
            persisted: self.registry.persisted().map(|e| e.ordinal).collect(),
            resumed: self.registry.persisted().filter(|e| e.resumed).map(|e| e.ordinal).collect(),
            failed: self
                .registry
                .failed()
                .map(|e| FailedEstimator {
                    ordinal: e.ordinal,
                    reason: match &e.state {
                        EstimatorState::Failed(reason) => reason.clone(),
                        other => other.to_string(),
                    },
                })
                .collect(),
            fit_calls,
            cancelled: self.cancel.is_cancelled(),
        };

        self.progress.on_event(ProgressEvent::Finished {
            run_id: self.run_id.clone(),
            persisted: report.persisted.len(),
            failed: report.failed.len(),
        });
        Ok(report)
    }

    /// Load each persisted estimator on first access and cache it.
    ///
    /// Failed estimators are skipped. Estimators whose artifact is missing or
    /// corrupt are reported in `errors` and left out of `classifiers`.
    pub fn get_classifiers(&mut self) -> LoadedClassifiers<'_> {
        let registry = &self.registry;
        let cache = &mut self.classifiers;
        let mut errors = Vec::new();

        for entry in registry.persisted() {
            if cache.contains_key(&entry.ordinal) {
                continue;
            }
            match load_estimator(self.factory.as_ref(), &self.layout, entry) {
                Ok(adapter) => {
                    cache.insert(entry.ordinal, adapter);
                }
                Err(e) => {
                    tracing::warn!(ordinal = entry.ordinal, error = %e, "failed to load estimator");
                    errors.push((entry.ordinal, e));
                }
            }
        }

        let cache = &self.classifiers;
        let classifiers = registry
            .persisted()
            .filter_map(move |e| cache.get(&e.ordinal).map(|a| (e.ordinal, &**a)))
            .collect();
        LoadedClassifiers { classifiers, errors }
    }

    /// Soft-vote every loadable estimator over `batches`.
    pub fn predict(&mut self, batches: &[SequenceBatch<'_>]) -> EnsembleResult<Vec<EnsemblePrediction>> {
        let expected: usize = batches.iter().map(SequenceBatch::len).sum();
        let loaded = self.get_classifiers();
        if loaded.classifiers.is_empty() {
            return Err(EnsembleError::Configuration(
                "ensemble has no loadable estimators".to_string(),
            ));
        }

        let mut score_sums = vec![0.0f32; expected];
        let mut votes = vec![0usize; expected];
        for (ordinal, classifier) in &loaded.classifiers {
            let predictions = classifier.predict(batches)?;
            if predictions.len() != expected {
                return Err(EnsembleError::Training(format!(
                    "estimator {ordinal} returned {} predictions for {expected} sequences",
                    predictions.len()
                )));
            }
            for (i, p) in predictions.iter().enumerate() {
                score_sums[i] += p.score;
                votes[i] += usize::from(p.label == POSITIVE);
            }
        }

        let voters = loaded.classifiers.len();
        Ok(score_sums
            .into_iter()
            .zip(votes)
            .map(|(sum, positive_votes)| {
                let score = sum / voters as f32;
                EnsemblePrediction {
                    label: u8::from(score >= 0.5),
                    score,
                    positive_votes,
                    voters,
                }
            })
            .collect())
    }
}

fn load_estimator(
    factory: &dyn AdapterFactory,
    layout: &EnsembleLayout,
    entry: &EstimatorEntry,
) -> EnsembleResult<Box<dyn ClassifierAdapter>> {
    if !entry.artifact.exists() {
        return Err(EnsembleError::ArtifactNotFound(entry.artifact.clone()));
    }
    let expected = match &entry.sha256 {
        Some(sha) => Some(sha.clone()),
        None => read_json::<EstimatorManifest>(&layout.estimator_manifest_path(entry.ordinal))
            .ok()
            .map(|m| m.sha256),
    };
    if let Some(sha) = expected {
        verify_sha256(&entry.artifact, &sha)?;
    }
    factory.load(&entry.artifact)
}

/// Drive one estimator through its lifecycle. Never returns an error: any
/// failure becomes a `Failed` outcome so sibling estimators keep going.
pub(crate) fn run_estimator(
    ctx: &EstimatorContext<'_>,
    dataset: &Dataset,
    plan: &RunPlan,
    ordinal: usize,
    on_state: &mut dyn FnMut(EstimatorState),
) -> EstimatorOutcome {
    let artifact = ctx.layout.artifact_path(ordinal);
    if artifact.exists() {
        return resume_estimator(ctx, plan, ordinal);
    }

    let sample = match obtain_sample(ctx, plan, ordinal) {
        Ok(sample) => sample,
        Err(e) => return failed(ctx, ordinal, None, &e),
    };
    on_state(EstimatorState::Sampled);

    match train_and_persist(ctx, dataset, &sample, ordinal, on_state) {
        Ok(sha256) => EstimatorOutcome {
            ordinal,
            state: EstimatorState::Persisted,
            sample: Some(sample),
            sha256: Some(sha256),
            resumed: false,
        },
        Err(e) => failed(ctx, ordinal, Some(sample), &e),
    }
}

fn resume_estimator(ctx: &EstimatorContext<'_>, plan: &RunPlan, ordinal: usize) -> EstimatorOutcome {
    let sample_path = ctx.layout.sample_manifest_path(ordinal);
    let sample = if sample_path.exists() {
        read_json::<SampleManifest>(&sample_path)
            .and_then(SampleManifest::into_sample)
            .map_err(|e| tracing::warn!(ordinal, error = %e, "unreadable sample manifest for persisted estimator"))
            .ok()
    } else {
        None
    };
    if let Some(supplied) = plan.supplied_for(ordinal) {
        if sample.as_ref() != Some(supplied) {
            tracing::warn!(ordinal, "estimator already persisted; supplied sample ignored");
        }
    }
    let sha256 = read_json::<EstimatorManifest>(&ctx.layout.estimator_manifest_path(ordinal))
        .ok()
        .map(|m| m.sha256);

    ctx.progress.on_event(ProgressEvent::Resumed { run_id: ctx.run_id.clone(), ordinal });
    EstimatorOutcome { ordinal, state: EstimatorState::Persisted, sample, sha256, resumed: true }
}

fn obtain_sample(ctx: &EstimatorContext<'_>, plan: &RunPlan, ordinal: usize) -> EnsembleResult<Sample> {
    let manifest_path = ctx.layout.sample_manifest_path(ordinal);
    let (sample, reused) = if let Some(supplied) = plan.supplied_for(ordinal) {
        (supplied.clone(), false)
    } else if manifest_path.exists() {
        (read_json::<SampleManifest>(&manifest_path)?.into_sample()?, true)
    } else {
        (resample(&plan.partition, ctx.spec.split_rate, ctx.spec.estimator_seed(ordinal))?, false)
    };

    if !reused {
        write_json(&manifest_path, &SampleManifest::new(ordinal, &sample))?;
    }

    ctx.progress.on_event(ProgressEvent::Sampled {
        run_id: ctx.run_id.clone(),
        ordinal,
        size: sample.len(),
        positives: sample.positives(),
        reused,
    });
    Ok(sample)
}

fn train_and_persist(
    ctx: &EstimatorContext<'_>,
    dataset: &Dataset,
    sample: &Sample,
    ordinal: usize,
    on_state: &mut dyn FnMut(EstimatorState),
) -> EnsembleResult<String> {
    let index = LengthIndex::from_sample(dataset, &sample.ids)?;
    let batches = schedule_index(&index, ctx.spec.max_batch_size)?;
    let labels = sample.label_map();
    let labeled = materialize_labeled(dataset, &batches, &labels)?;
    tracing::debug!(ordinal, buckets = index.lengths().count(), batches = batches.len(), "scheduled sample");
    ctx.progress.on_event(ProgressEvent::Scheduled {
        run_id: ctx.run_id.clone(),
        ordinal,
        batches: batches.len(),
    });
    on_state(EstimatorState::Scheduled);

    on_state(EstimatorState::Training);
    let started = Instant::now();
    let mut adapter = ctx.factory.create();
    ctx.fit_calls.fetch_add(1, Ordering::SeqCst);
    adapter.fit(&labeled, ctx.spec.epochs)?;
    drop(labeled);

    let staging = ctx.layout.staging_path(ordinal);
    let artifact = ctx.layout.artifact_path(ordinal);
    let seconds = started.elapsed().as_secs_f64();
    let sha256 = match stage_artifact(ctx, adapter.as_ref(), &staging, &artifact, ordinal, seconds) {
        Ok(sha256) => sha256,
        Err(e) => {
            let _ = std::fs::remove_file(&staging);
            return Err(e);
        }
    };

    ctx.progress.on_event(ProgressEvent::Persisted { run_id: ctx.run_id.clone(), ordinal, seconds });
    Ok(sha256)
}

/// Save to the staging path, record its digest, then rename into place.
/// The rename is the last fallible step, so an artifact at its final path
/// always has a matching estimator manifest.
fn stage_artifact(
    ctx: &EstimatorContext<'_>,
    adapter: &dyn ClassifierAdapter,
    staging: &Path,
    artifact: &Path,
    ordinal: usize,
    fit_seconds: f64,
) -> EnsembleResult<String> {
    adapter.save(staging)?;
    let sha256 = sha256_file(staging)?;
    write_json(
        ctx.layout.estimator_manifest_path(ordinal),
        &EstimatorManifest {
            ordinal,
            artifact: artifact.to_path_buf(),
            sha256: sha256.clone(),
            created_at: Utc::now(),
            fit_seconds,
        },
    )?;
    std::fs::rename(staging, artifact)?;
    Ok(sha256)
}

fn failed(
    ctx: &EstimatorContext<'_>,
    ordinal: usize,
    sample: Option<Sample>,
    error: &EnsembleError,
) -> EstimatorOutcome {
    let reason = error.to_string();
    ctx.progress.on_event(ProgressEvent::Failed {
        run_id: ctx.run_id.clone(),
        ordinal,
        reason: reason.clone(),
    });
    EstimatorOutcome {
        ordinal,
        state: EstimatorState::Failed(reason),
        sample,
        sha256: None,
        resumed: false,
    }
}
