//! Fixed-width summaries of variable-length event sequences.

use sepsis_training::{EnsembleError, EnsembleResult, Event, LabeledBatch, Label, SequenceBatch};
use std::ops::Range;

/// Statistics kept per event feature: mean, min, max, last.
pub const STATS_PER_FEATURE: usize = 4;

/// Width of a summary for events of `feature_width` values.
#[must_use]
pub fn summary_width(feature_width: usize) -> usize {
    feature_width * STATS_PER_FEATURE + 1
}

/// Summarize one sequence as per-feature mean, min, max and last value,
/// followed by `ln(1 + length)`.
pub fn summarize(sequence: &[Event]) -> EnsembleResult<Vec<f32>> {
    let Some(first) = sequence.first() else {
        return Err(EnsembleError::Training("cannot summarize an empty sequence".to_string()));
    };
    let width = first.len();
    if let Some(bad) = sequence.iter().find(|e| e.len() != width) {
        return Err(EnsembleError::Training(format!(
            "ragged sequence: expected {width} features per event, found {}",
            bad.len()
        )));
    }

    let mut sum = vec![0.0f32; width];
    let mut min = vec![f32::INFINITY; width];
    let mut max = vec![f32::NEG_INFINITY; width];
    for event in sequence {
        for (i, &v) in event.iter().enumerate() {
            sum[i] += v;
            min[i] = min[i].min(v);
            max[i] = max[i].max(v);
        }
    }

    let len = sequence.len() as f32;
    let mut out = Vec::with_capacity(summary_width(width));
    out.extend(sum.iter().map(|s| s / len));
    out.extend(min);
    out.extend(max);
    out.extend(sequence[sequence.len() - 1].iter().copied());
    out.push(len.ln_1p());
    Ok(out)
}

/// Summaries of every sequence in `batches`, in batch order.
pub fn summarize_batches(batches: &[SequenceBatch<'_>]) -> EnsembleResult<Vec<Vec<f32>>> {
    batches
        .iter()
        .flat_map(|b| b.sequences.iter())
        .map(|s| summarize(s))
        .collect()
}

/// Flattened training rows that remember which scheduled batch they came from.
#[derive(Debug, Clone, Default)]
pub struct SummaryTable {
    pub rows: Vec<Vec<f32>>,
    pub labels: Vec<Label>,
    pub batches: Vec<Range<usize>>,
}

impl SummaryTable {
    pub fn from_labeled(batches: &[LabeledBatch<'_>]) -> EnsembleResult<Self> {
        let mut table = Self::default();
        for batch in batches {
            if batch.labels.len() != batch.inputs.len() {
                return Err(EnsembleError::Training(format!(
                    "batch of {} sequences carries {} labels",
                    batch.inputs.len(),
                    batch.labels.len()
                )));
            }
            let start = table.rows.len();
            for sequence in &batch.inputs.sequences {
                table.rows.push(summarize(sequence)?);
            }
            table.labels.extend(batch.labels.iter().copied());
            table.batches.push(start..table.rows.len());
        }

        if table.rows.is_empty() {
            return Err(EnsembleError::Training("no training rows".to_string()));
        }
        let width = table.rows[0].len();
        if table.rows.iter().any(|r| r.len() != width) {
            return Err(EnsembleError::Training("sequences have different feature widths".to_string()));
        }
        Ok(table)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_stats() {
        let seq = vec![vec![1.0, 10.0], vec![3.0, 20.0], vec![2.0, 0.0]];
        let s = summarize(&seq).unwrap();

        assert_eq!(s.len(), summary_width(2));
        assert_eq!(&s[0..2], &[2.0, 10.0]);
        assert_eq!(&s[2..4], &[1.0, 0.0]);
        assert_eq!(&s[4..6], &[3.0, 20.0]);
        assert_eq!(&s[6..8], &[2.0, 0.0]);
        assert!((s[8] - 4.0f32.ln()).abs() < 1e-6);
    }

    #[test]
    fn test_summarize_rejects_ragged_and_empty() {
        assert!(summarize(&[]).is_err());
        assert!(summarize(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn test_table_tracks_batch_ranges() {
        let a = vec![vec![1.0]; 2];
        let b = vec![vec![2.0]; 3];
        let batches = vec![
            LabeledBatch {
                inputs: SequenceBatch { length: 2, sequences: vec![a.as_slice(), a.as_slice()] },
                labels: vec![0, 1],
            },
            LabeledBatch {
                inputs: SequenceBatch { length: 3, sequences: vec![b.as_slice()] },
                labels: vec![1],
            },
        ];

        let table = SummaryTable::from_labeled(&batches).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.batches, vec![0..2, 2..3]);
        assert_eq!(table.labels, vec![0, 1, 1]);
        assert_eq!(table.width(), summary_width(1));
    }
}
