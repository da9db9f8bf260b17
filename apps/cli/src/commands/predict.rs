//! Soft-voting inference with a trained ensemble.

use crate::commands::{load, PredictArgs};
use anyhow::{Context, Result};
use colored::Colorize;
use sepsis_models::ClassifierFactory;
use sepsis_training::{materialize, read_ensemble_manifest, schedule_index, EnsembleTrainer, LengthIndex};
use serde_json::json;
use std::sync::Arc;

pub async fn execute(args: PredictArgs) -> Result<()> {
    let manifest = read_ensemble_manifest(&args.output)
        .with_context(|| format!("No trained ensemble found in {}", args.output.display()))?;
    let factory = ClassifierFactory::from_config(&manifest.adapter_config)?;
    let batch_size = manifest.spec.max_batch_size;
    let mut ensemble = EnsembleTrainer::open(&args.output, Arc::new(factory))?;

    let dataset = load(&args.dataset)?;
    let index = LengthIndex::build(dataset.records());
    let batches = schedule_index(&index, batch_size)?;
    let inputs = materialize(&dataset, &batches)?;
    let predictions = ensemble.predict(&inputs)?;

    let ids = batches.iter().flat_map(|b| b.ids.iter());
    let mut rows: Vec<_> = ids
        .zip(&predictions)
        .filter_map(|(id, p)| dataset.get(id).map(|record| (id, record.label, p)))
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));
    let correct = rows.iter().filter(|(_, label, p)| *label == p.label).count();

    if args.json {
        let out: Vec<_> = rows
            .iter()
            .map(|(id, label, p)| {
                json!({
                    "id": id,
                    "label": label,
                    "predicted": p.label,
                    "score": p.score,
                    "positive_votes": p.positive_votes,
                    "voters": p.voters,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{:<24} {:>6} {:>9} {:>7}", "ID", "Label", "Score", "Votes");
    println!("{}", "─".repeat(50));
    for (id, label, p) in &rows {
        let predicted = if p.label == 1 { "sepsis".red() } else { "-".dimmed() };
        println!(
            "{:<24} {:>6} {:>9.4} {:>3}/{:<3} {}",
            id.to_string().cyan(),
            label,
            p.score,
            p.positive_votes,
            p.voters,
            predicted
        );
    }
    println!();
    println!(
        "  Accuracy: {}/{} ({:.1}%)",
        correct,
        rows.len(),
        100.0 * correct as f64 / rows.len().max(1) as f64
    );
    Ok(())
}
