// src/models/stats.rs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::core::MatchType;

/// How many error samples a batch summary retains for the caller.
pub const MAX_ERROR_SAMPLES: usize = 10;

/// Structured outcome of one batch-style operation.
///
/// Partial success is the expected common case at this data volume, so
/// callers get counters plus the first few error samples rather than a
/// single pass/fail flag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Records excluded on purpose (no classification rule matched)
    pub skipped: usize,
    /// First `MAX_ERROR_SAMPLES` failure descriptions, with record context
    pub error_samples: Vec<String>,
}

impl BatchSummary {
    pub fn record_failure(&mut self, context: String) {
        self.failed += 1;
        if self.error_samples.len() < MAX_ERROR_SAMPLES {
            self.error_samples.push(context);
        }
    }

    pub fn merge(&mut self, other: BatchSummary) {
        self.processed += other.processed;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped += other.skipped;
        for sample in other.error_samples {
            if self.error_samples.len() >= MAX_ERROR_SAMPLES {
                break;
            }
            self.error_samples.push(sample);
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.processed as f64
        }
    }
}

/// Per-strategy matching statistics for the run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTypeStats {
    pub match_type: MatchType,
    pub entities_matched: usize,
    pub avg_confidence: f64,
}

/// Aggregate statistics for one full pipeline run, persisted alongside the
/// run record and printed in the end-of-run summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineStats {
    /// Nil until a run record is created
    pub run_id: Uuid,

    pub total_raw_entities: usize,
    pub total_classified: usize,
    pub total_skipped: usize,
    pub total_matched: usize,
    pub total_unmatched: usize,
    pub match_stats: Vec<MatchTypeStats>,

    pub cells_aggregated: usize,
    pub cells_binned: usize,
    pub candidates_discovered: usize,

    pub classification_time: f64,
    pub aggregation_time: f64,
    pub binning_time: f64,
    pub discovery_time: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_samples_are_capped() {
        let mut summary = BatchSummary::default();
        for i in 0..25 {
            summary.record_failure(format!("entity {} exploded", i));
        }
        assert_eq!(summary.failed, 25);
        assert_eq!(summary.error_samples.len(), MAX_ERROR_SAMPLES);
        assert_eq!(summary.error_samples[0], "entity 0 exploded");
    }

    #[test]
    fn test_merge_accumulates_counters() {
        let mut a = BatchSummary {
            processed: 10,
            succeeded: 8,
            failed: 1,
            skipped: 1,
            error_samples: vec!["boom".to_string()],
        };
        let b = BatchSummary {
            processed: 5,
            succeeded: 5,
            failed: 0,
            skipped: 0,
            error_samples: vec![],
        };
        a.merge(b);
        assert_eq!(a.processed, 15);
        assert_eq!(a.succeeded, 13);
        assert_eq!(a.failed, 1);
        assert_eq!(a.skipped, 1);
    }

    #[test]
    fn test_failure_rate() {
        let summary = BatchSummary {
            processed: 100,
            succeeded: 90,
            failed: 10,
            skipped: 0,
            error_samples: vec![],
        };
        assert!((summary.failure_rate() - 0.1).abs() < 1e-9);
        assert_eq!(BatchSummary::default().failure_rate(), 0.0);
    }
}
