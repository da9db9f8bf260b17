//! Ensemble training command.

use crate::commands::{load, TrainArgs};
use crate::config::SepsisConfig;
use anyhow::{Context, Result};
use colored::Colorize;
use sepsis_models::ClassifierFactory;
use sepsis_training::{
    EnsembleReport, EnsembleSpec, EnsembleTrainer, ProgressSink, StdoutProgressSink, TracingProgressSink,
};
use std::sync::Arc;

pub async fn execute(args: TrainArgs) -> Result<()> {
    let config = SepsisConfig::discover_and_load(args.config.as_deref())?;
    let spec = apply_overrides(config.ensemble_spec(), &args);
    spec.validate()?;
    let kind = config.classifier_kind(args.classifier.as_deref())?;
    let factory = Arc::new(ClassifierFactory::new(kind)?);

    let dataset = Arc::new(load(&args.dataset)?);
    tracing::info!(
        dataset = %args.dataset.dataset.display(),
        records = dataset.len(),
        estimators = spec.n_estimators,
        "loaded dataset"
    );

    let progress: Arc<dyn ProgressSink> =
        if args.json { Arc::new(TracingProgressSink) } else { Arc::new(StdoutProgressSink) };
    let workers = spec.workers;
    let mut trainer = EnsembleTrainer::new(spec, args.output.clone(), factory)
        .context("Failed to set up ensemble output")?
        .with_progress(progress);

    let cancel = trainer.cancellation_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current estimator");
            cancel.cancel();
        }
    });

    let report = if workers > 1 {
        trainer.fit_ensemble_parallel(Arc::clone(&dataset), None, None).await?
    } else {
        trainer.fit_ensemble(&dataset, None, None)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, &args);
    }

    if report.persisted.is_empty() && !report.failed.is_empty() {
        anyhow::bail!("All {} estimators failed", report.failed.len());
    }
    Ok(())
}

fn apply_overrides(mut spec: EnsembleSpec, args: &TrainArgs) -> EnsembleSpec {
    if let Some(n) = args.estimators {
        spec.n_estimators = n;
    }
    if let Some(rate) = args.split_rate {
        spec.split_rate = rate;
    }
    if let Some(epochs) = args.epochs {
        spec.epochs = epochs;
    }
    if let Some(size) = args.batch_size {
        spec.max_batch_size = size;
    }
    if let Some(seed) = args.seed {
        spec.seed = seed;
    }
    if let Some(workers) = args.workers {
        spec.workers = workers;
    }
    spec
}

fn print_report(report: &EnsembleReport, args: &TrainArgs) {
    println!();
    let title = if report.failed.is_empty() { "Ensemble training complete".green() } else { "Ensemble training finished with failures".yellow() };
    println!("{}", title.bold());
    println!("  Run:       {}", report.run_id.to_string().cyan());
    println!("  Output:    {}", args.output.display().to_string().dimmed());
    println!("  Persisted: {}", report.persisted.len());
    if !report.resumed.is_empty() {
        println!("  Resumed:   {} (already trained)", report.resumed.len());
    }
    println!("  Fit calls: {}", report.fit_calls);
    for failed in &report.failed {
        println!("  {} estimator {}: {}", "✗".red(), failed.ordinal, failed.reason);
    }
    if report.cancelled {
        println!("  {}", "Cancelled before all estimators ran; rerun to resume.".yellow());
    }
    println!();
}
