use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{DropReason, ScoreResult};

/// Records seen and kept by one phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseStats {
    pub name: String,
    pub processed: u64,
    pub kept: u64,
}

/// Running min / max / mean of the perplexities computed in a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ScoreSummary {
    fn first(value: f64) -> Self {
        Self {
            count: 1,
            min: value,
            max: value,
            mean: value,
        }
    }

    fn push(&mut self, value: f64) {
        self.count += 1;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        self.mean += (value - self.mean) / self.count as f64;
    }
}

/// Run-wide counters.
///
/// Only the thread driving the run writes here. Every non-blank input line
/// ends up either in `records_out` or under exactly one drop reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub records_in: u64,
    pub records_out: u64,
    pub drops: BTreeMap<DropReason, u64>,
    pub phases: Vec<PhaseStats>,
    /// Scored records per bucket label, including those dropped for their score
    pub buckets: BTreeMap<String, u64>,
    pub score: Option<ScoreSummary>,
    pub annotation_conflicts: u64,
}

impl PipelineStats {
    pub fn new<'a>(phase_names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            phases: phase_names
                .into_iter()
                .map(|name| PhaseStats {
                    name: name.to_string(),
                    ..PhaseStats::default()
                })
                .collect(),
            ..Self::default()
        }
    }

    pub fn record_in(&mut self) {
        self.records_in += 1;
    }

    pub fn record_out(&mut self) {
        self.records_out += 1;
    }

    pub fn record_drop(&mut self, reason: DropReason) {
        *self.drops.entry(reason).or_insert(0) += 1;
    }

    pub fn record_phase(&mut self, index: usize, kept: bool) {
        if let Some(phase) = self.phases.get_mut(index) {
            phase.processed += 1;
            if kept {
                phase.kept += 1;
            }
        }
    }

    pub fn record_score(&mut self, score: &ScoreResult) {
        *self.buckets.entry(score.bucket.clone()).or_insert(0) += 1;
        self.annotation_conflicts += u64::from(score.annotation_conflicts);
        match self.score.as_mut() {
            Some(summary) => summary.push(score.perplexity),
            None => self.score = Some(ScoreSummary::first(score.perplexity)),
        }
    }

    pub fn dropped(&self, reason: DropReason) -> u64 {
        self.drops.get(&reason).copied().unwrap_or(0)
    }

    pub fn total_dropped(&self) -> u64 {
        self.drops.values().sum()
    }

    /// Every record read is accounted for exactly once
    pub fn is_balanced(&self) -> bool {
        self.records_in == self.records_out + self.total_dropped()
    }
}
