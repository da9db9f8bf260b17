//! List the estimators of a trained ensemble.

use crate::commands::ListArgs;
use anyhow::{Context, Result};
use colored::Colorize;
use sepsis_training::{read_ensemble_manifest, EstimatorState};

pub async fn execute(args: ListArgs) -> Result<()> {
    let manifest = read_ensemble_manifest(&args.output)
        .with_context(|| format!("No trained ensemble found in {}", args.output.display()))?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    let persisted = manifest.estimators.iter().filter(|e| e.state.is_persisted()).count();
    println!();
    println!("{}", format!("Ensemble ({persisted}/{} persisted)", manifest.estimators.len()).bold().cyan());
    println!("  Run:        {}", manifest.run_id);
    println!("  Created:    {}", manifest.created_at.to_rfc3339());
    println!("  Dataset:    {}", manifest.dataset_id.0.dimmed());
    println!("  Classifier: {}", manifest.adapter);
    println!();

    println!("{:<4} {:<28} {}", "#", "State", "Artifact");
    println!("{}", "─".repeat(80));
    for estimator in &manifest.estimators {
        let state = match &estimator.state {
            EstimatorState::Persisted => estimator.state.to_string().green(),
            EstimatorState::Failed(_) => estimator.state.to_string().red(),
            other => other.to_string().yellow(),
        };
        println!("{:<4} {:<28} {}", estimator.ordinal, state, estimator.artifact.display().to_string().dimmed());
    }
    println!();
    Ok(())
}
