use std::io;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info, warn};

use super::phase::Phase;
use super::stats::PipelineStats;
use crate::app::ports::RecordSink;
use crate::domain::{DropReason, Outcome, Record};
use crate::observability::metrics;

/// How a streaming run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub interrupted: bool,
    pub elapsed: Duration,
}

/// A phase result together with how many phases saw the record
struct Traced {
    outcome: Outcome,
    reached: usize,
}

fn run_phases(phases: &[Box<dyn Phase>], mut record: Record) -> Traced {
    for (index, phase) in phases.iter().enumerate() {
        match phase.apply(record) {
            Outcome::Kept(next) => record = next,
            dropped => {
                return Traced {
                    outcome: dropped,
                    reached: index + 1,
                }
            }
        }
    }
    Traced {
        outcome: Outcome::Kept(record),
        reached: phases.len(),
    }
}

/// Drives records through the enabled phases in order and routes the
/// survivors to a sink.
///
/// With more than one worker, the trailing run of phases that tolerate
/// reordering is evaluated in batches on a rayon pool. Results are still
/// accounted and written in input order by the calling thread, so the
/// output is identical to a single-worker run.
pub struct PipelineOrchestrator {
    phases: Vec<Box<dyn Phase>>,
    text_field: String,
    workers: usize,
    batch_size: usize,
    stats: PipelineStats,
}

impl PipelineOrchestrator {
    pub fn new(phases: Vec<Box<dyn Phase>>, text_field: impl Into<String>) -> Self {
        let stats = PipelineStats::new(phases.iter().map(|p| p.name()));
        Self {
            phases,
            text_field: text_field.into(),
            workers: 1,
            batch_size: 256,
            stats,
        }
    }

    pub fn with_parallelism(mut self, workers: usize, batch_size: usize) -> Self {
        self.workers = workers.max(1);
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn phase_names(&self) -> Vec<&'static str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn into_stats(self) -> PipelineStats {
        self.stats
    }

    /// Run one parsed record through every phase
    pub fn process(&mut self, record: Record) -> Outcome {
        self.stats.record_in();
        metrics::pipeline::record_in();
        self.advance(record)
    }

    /// Parse and process one raw input line. Blank lines are not records
    /// and yield `None`.
    pub fn process_line(&mut self, line: &[u8]) -> Option<Outcome> {
        match self.admit(line)? {
            Outcome::Kept(record) => Some(self.advance(record)),
            dropped => Some(dropped),
        }
    }

    /// Stream every input line through the pipeline into `sink`.
    ///
    /// `cancel` is checked between records. Once it is set, records already
    /// read are finished, the sink is flushed and the run reports itself as
    /// interrupted. Read and write failures are fatal.
    pub fn run<I>(
        &mut self,
        lines: I,
        sink: &mut dyn RecordSink,
        cancel: &AtomicBool,
    ) -> Result<RunOutcome>
    where
        I: IntoIterator<Item = io::Result<Vec<u8>>>,
    {
        let started = Instant::now();
        info!("🚀 Running phases: {}", self.phase_names().join(" → "));

        let split = self.parallel_split();
        let pool = if self.workers > 1 && split < self.phases.len() {
            info!(
                "Scoring on {} workers in batches of {}",
                self.workers, self.batch_size
            );
            Some(
                ThreadPoolBuilder::new()
                    .num_threads(self.workers)
                    .build()
                    .context("building worker pool")?,
            )
        } else {
            None
        };

        let mut interrupted = false;
        let mut pending: Vec<Record> = Vec::new();

        for (line_no, line) in lines.into_iter().enumerate() {
            if cancel.load(Ordering::Relaxed) {
                interrupted = true;
                break;
            }
            let line = line.with_context(|| format!("reading input line {}", line_no + 1))?;

            let Some(pool) = pool.as_ref() else {
                if let Some(Outcome::Kept(record)) = self.process_line(&line) {
                    self.write(record, sink)?;
                }
                continue;
            };

            let Some(Outcome::Kept(record)) = self.admit(&line) else {
                continue;
            };
            if let Outcome::Kept(record) = self.run_range(0..split, record) {
                pending.push(record);
            }
            if pending.len() >= self.batch_size {
                self.flush_batch(pool, split, &mut pending, sink)?;
            }
        }

        if let Some(pool) = pool.as_ref() {
            self.flush_batch(pool, split, &mut pending, sink)?;
        }
        sink.flush()?;

        let elapsed = started.elapsed();
        metrics::pipeline::run_duration(elapsed.as_secs_f64());
        if interrupted {
            warn!("⏹️ Run interrupted after {} records", self.stats.records_in);
        }
        self.log_summary(elapsed);
        debug_assert!(self.stats.is_balanced());

        Ok(RunOutcome {
            interrupted,
            elapsed,
        })
    }

    /// Index of the first phase from which every remaining phase may run
    /// out of order
    fn parallel_split(&self) -> usize {
        self.phases
            .iter()
            .rposition(|p| !p.can_run_parallel())
            .map_or(0, |index| index + 1)
    }

    fn flush_batch(
        &mut self,
        pool: &ThreadPool,
        split: usize,
        pending: &mut Vec<Record>,
        sink: &mut dyn RecordSink,
    ) -> Result<()> {
        if pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(pending);
        let phases = &self.phases[split..];
        let results: Vec<Traced> =
            pool.install(|| batch.into_par_iter().map(|r| run_phases(phases, r)).collect());

        for traced in results {
            if let Outcome::Kept(record) = self.account(split, traced) {
                self.finish(&record);
                self.write(record, sink)?;
            }
        }
        Ok(())
    }

    /// Count an input line and parse it
    fn admit(&mut self, line: &[u8]) -> Option<Outcome> {
        if line.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        self.stats.record_in();
        metrics::pipeline::record_in();

        let parsed = std::str::from_utf8(line)
            .map_err(|_| DropReason::MalformedInput)
            .and_then(|text| Record::parse(text, &self.text_field));
        match parsed {
            Ok(record) => Some(Outcome::Kept(record)),
            Err(reason) => {
                debug!(record = self.stats.records_in, "dropping malformed input line");
                self.stats.record_drop(reason);
                metrics::pipeline::malformed();
                Some(Outcome::dropped(reason))
            }
        }
    }

    fn advance(&mut self, record: Record) -> Outcome {
        let outcome = self.run_range(0..self.phases.len(), record);
        if let Outcome::Kept(record) = &outcome {
            self.finish(record);
        }
        outcome
    }

    fn run_range(&mut self, range: Range<usize>, record: Record) -> Outcome {
        let offset = range.start;
        let traced = run_phases(&self.phases[range], record);
        self.account(offset, traced)
    }

    /// Update phase and drop counters for a record that went through the
    /// phases starting at `offset`
    fn account(&mut self, offset: usize, traced: Traced) -> Outcome {
        let Traced { outcome, reached } = traced;
        let dropped = matches!(outcome, Outcome::Dropped { .. });

        for step in 0..reached {
            let kept = !(dropped && step + 1 == reached);
            self.stats.record_phase(offset + step, kept);
            metrics::pipeline::phase_processed(self.phases[offset + step].name());
        }

        if let Outcome::Dropped { reason, score } = &outcome {
            let phase = self.phases[offset + reached - 1].name();
            debug!(phase, reason = reason.as_str(), "record dropped");
            self.stats.record_drop(*reason);
            metrics::pipeline::phase_dropped(phase, *reason);
            if let Some(score) = score {
                self.stats.record_score(score);
                metrics::quality_gate::score_recorded(score.perplexity);
                metrics::quality_gate::bucket_assigned(&score.bucket);
            }
        }
        outcome
    }

    /// Bookkeeping for a record that survived every phase
    fn finish(&mut self, record: &Record) {
        if let Some(score) = &record.score {
            self.stats.record_score(score);
            metrics::quality_gate::score_recorded(score.perplexity);
            metrics::quality_gate::bucket_assigned(&score.bucket);
            if score.annotation_conflicts > 0 {
                metrics::quality_gate::annotation_conflicts(score.annotation_conflicts);
            }
        }
        self.stats.record_out();
        metrics::pipeline::record_out();
    }

    fn write(&self, record: Record, sink: &mut dyn RecordSink) -> Result<()> {
        let bucket = record.score.as_ref().map(|s| s.bucket.clone());
        let line = record
            .into_json_line(&self.text_field)
            .context("serializing output record")?;
        sink.write_line(&line, bucket.as_deref())
    }

    fn log_summary(&self, elapsed: Duration) {
        let stats = &self.stats;
        info!(
            "✅ Processed {} records in {:.2}s: {} kept, {} dropped",
            stats.records_in,
            elapsed.as_secs_f64(),
            stats.records_out,
            stats.total_dropped()
        );
        for (reason, count) in &stats.drops {
            info!("   dropped {:>8} × {}", count, reason);
        }
        for (bucket, count) in &stats.buckets {
            info!("   bucket  {:>8} × {}", count, bucket);
        }
        if stats.annotation_conflicts > 0 {
            warn!(
                "{} score fields were not written because the key already existed",
                stats.annotation_conflicts
            );
        }
    }
}
