//! Metrics for the corpus cleaner.
//!
//! Recording functions are grouped by area and are no-ops until [`init`]
//! installs the Prometheus recorder. Rendered exposition text is available
//! through [`render`] for writing to a file at the end of a run.

use std::fmt;
use std::sync::OnceLock;

use anyhow::anyhow;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Enum representing all metric names used in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Pipeline metrics
    RecordsIn,
    RecordsOut,
    RecordsMalformed,
    PhaseProcessed,
    PhaseDropped,
    RunDuration,

    // Quality gate metrics
    QualityPerplexity,
    QualityBucketAssigned,
    QualityAnnotationConflicts,

    // Model metrics
    ModelLoadDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RecordsIn => "jcc_records_in_total",
            MetricName::RecordsOut => "jcc_records_out_total",
            MetricName::RecordsMalformed => "jcc_records_malformed_total",
            MetricName::PhaseProcessed => "jcc_phase_records_processed_total",
            MetricName::PhaseDropped => "jcc_phase_records_dropped_total",
            MetricName::RunDuration => "jcc_run_duration_seconds",
            MetricName::QualityPerplexity => "jcc_quality_perplexity",
            MetricName::QualityBucketAssigned => "jcc_quality_bucket_assigned_total",
            MetricName::QualityAnnotationConflicts => "jcc_quality_annotation_conflicts_total",
            MetricName::ModelLoadDuration => "jcc_model_load_duration_seconds",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        [
            MetricName::RecordsIn,
            MetricName::RecordsOut,
            MetricName::RecordsMalformed,
            MetricName::PhaseProcessed,
            MetricName::PhaseDropped,
            MetricName::RunDuration,
            MetricName::QualityPerplexity,
            MetricName::QualityBucketAssigned,
            MetricName::QualityAnnotationConflicts,
            MetricName::ModelLoadDuration,
        ]
        .into_iter()
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it twice is an error.
pub fn init() -> anyhow::Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow!("Failed to install Prometheus recorder: {}", e))?;
    METRICS_HANDLE
        .set(handle)
        .map_err(|_| anyhow!("metrics recorder already initialized"))?;
    info!("Metrics system initialized");
    Ok(())
}

/// Prometheus exposition text, when a recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;
    use crate::domain::DropReason;

    pub fn record_in() {
        ::metrics::counter!(MetricName::RecordsIn.as_str()).increment(1);
    }

    pub fn record_out() {
        ::metrics::counter!(MetricName::RecordsOut.as_str()).increment(1);
    }

    pub fn malformed() {
        ::metrics::counter!(MetricName::RecordsMalformed.as_str()).increment(1);
    }

    pub fn phase_processed(phase: &'static str) {
        ::metrics::counter!(MetricName::PhaseProcessed.as_str(), "phase" => phase).increment(1);
    }

    pub fn phase_dropped(phase: &'static str, reason: DropReason) {
        ::metrics::counter!(
            MetricName::PhaseDropped.as_str(),
            "phase" => phase,
            "reason" => reason.as_str()
        )
        .increment(1);
    }

    pub fn run_duration(secs: f64) {
        ::metrics::histogram!(MetricName::RunDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Quality Gate Metrics
// ============================================================================

pub mod quality_gate {
    use super::MetricName;

    /// Record the perplexity of a scored record, kept or not
    pub fn score_recorded(perplexity: f64) {
        ::metrics::histogram!(MetricName::QualityPerplexity.as_str()).record(perplexity);
    }

    pub fn bucket_assigned(bucket: &str) {
        ::metrics::counter!(
            MetricName::QualityBucketAssigned.as_str(),
            "bucket" => bucket.to_string()
        )
        .increment(1);
    }

    pub fn annotation_conflicts(count: u32) {
        ::metrics::counter!(MetricName::QualityAnnotationConflicts.as_str())
            .increment(u64::from(count));
    }
}

// ============================================================================
// Model Metrics
// ============================================================================

pub mod model {
    use super::MetricName;

    pub fn load_duration(secs: f64) {
        ::metrics::histogram!(MetricName::ModelLoadDuration.as_str()).record(secs);
    }
}
