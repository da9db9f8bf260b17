//! Bounded-concurrency variant of `fit_ensemble`.

use crate::dataset::{Dataset, Label, RecordId};
use crate::ensemble::{run_estimator, EnsembleReport, EnsembleTrainer, EstimatorContext};
use crate::error::{EnsembleError, EnsembleResult};
use crate::registry::EstimatorState;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

impl EnsembleTrainer {
    /// Train up to `spec.workers` estimators at once on blocking threads.
    ///
    /// Each estimator still gets a fresh adapter and its own seed, so the
    /// persisted ensemble matches what `fit_ensemble` would produce.
    pub async fn fit_ensemble_parallel(
        &mut self,
        dataset: Arc<Dataset>,
        supplied_ids: Option<Vec<Vec<RecordId>>>,
        supplied_labels: Option<Vec<Vec<Label>>>,
    ) -> EnsembleResult<EnsembleReport> {
        let plan = Arc::new(self.prepare(&dataset, supplied_ids, supplied_labels)?);
        let n_estimators = self.spec().n_estimators;
        let workers = self.spec().workers.clamp(1, n_estimators.max(1));
        tracing::debug!(workers, n_estimators, "training estimators in parallel");

        let registry = Arc::new(Mutex::new(std::mem::take(self.registry_mut())));
        let semaphore = Arc::new(Semaphore::new(workers));
        let fit_calls = Arc::new(AtomicUsize::new(0));
        let cancel = self.cancellation_flag();
        let mut tasks = JoinSet::new();
        let mut spawned = Vec::with_capacity(n_estimators);

        for ordinal in 0..n_estimators {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| EnsembleError::Other(e.into()))?;
            if cancel.is_cancelled() {
                tracing::warn!(ordinal, "ensemble training cancelled");
                break;
            }

            let run_id = self.run_id().clone();
            let spec = self.spec().clone();
            let layout = self.layout().clone();
            let factory = self.factory();
            let progress = self.progress();
            let dataset = Arc::clone(&dataset);
            let plan = Arc::clone(&plan);
            let registry = Arc::clone(&registry);
            let fit_calls = Arc::clone(&fit_calls);

            tasks.spawn_blocking(move || {
                let _permit = permit;
                let ctx = EstimatorContext {
                    run_id: &run_id,
                    spec: &spec,
                    layout: &layout,
                    factory: factory.as_ref(),
                    progress: progress.as_ref(),
                    fit_calls: &fit_calls,
                };
                let outcome = run_estimator(&ctx, &dataset, &plan, ordinal, &mut |state| {
                    if let Ok(mut registry) = registry.lock() {
                        registry.set_state(ordinal, state);
                    }
                });
                if let Ok(mut registry) = registry.lock() {
                    registry.apply(outcome);
                }
            });
            spawned.push(ordinal);
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "estimator task panicked");
            }
        }

        let mut registry = match Arc::try_unwrap(registry) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(std::sync::PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .map(|r| r.clone())
                .unwrap_or_else(|poisoned| poisoned.into_inner().clone()),
        };
        // A spawned ordinal that never reached a final state lost its task.
        for ordinal in spawned {
            let finished = registry
                .get(ordinal)
                .is_some_and(|e| e.state.is_persisted() || e.state.is_failed());
            if !finished {
                registry.set_state(ordinal, EstimatorState::Failed("estimator task panicked".to_string()));
            }
        }
        *self.registry_mut() = registry;

        self.finish(fit_calls.load(Ordering::SeqCst))
    }
}
