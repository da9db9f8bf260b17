//! Sequence-length histogram and batch plan for a dataset.

use crate::commands::{load, BucketsArgs};
use anyhow::Result;
use colored::Colorize;
use sepsis_training::{schedule, LengthIndex};
use serde_json::json;

pub async fn execute(args: BucketsArgs) -> Result<()> {
    let dataset = load(&args.dataset)?;
    let index = match &args.cache {
        Some(path) => LengthIndex::load_or_build(path, &dataset)?,
        None => LengthIndex::build(dataset.records()),
    };

    let mut rows = Vec::with_capacity(index.len());
    for (length, ids) in index.buckets() {
        let batches = schedule(ids, length, args.batch_size)?;
        rows.push((length, ids.len(), batches.len()));
    }

    if args.json {
        let out: Vec<_> = rows
            .iter()
            .map(|(length, records, batches)| json!({ "length": length, "records": records, "batches": batches }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Length buckets ({} records, {} lengths)", dataset.len(), rows.len()).bold().cyan());
    println!();
    println!("{:<8} {:>8} {:>8}", "Length", "Records", "Batches");
    println!("{}", "─".repeat(26));
    for (length, records, batches) in &rows {
        println!("{:<8} {:>8} {:>8}", length, records, batches);
    }
    let total: usize = rows.iter().map(|(_, _, b)| b).sum();
    println!();
    println!("  {} batches of at most {}", total, args.batch_size);
    Ok(())
}
