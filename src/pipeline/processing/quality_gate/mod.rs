//! Phase 2: language-model perplexity scoring and bucketing.

use std::sync::Arc;

use serde_json::{Number, Value};
use tracing::{debug, warn};

use crate::app::ports::Tokenize;
use crate::constants::QUALITY_PHASE;
use crate::domain::{DropReason, Outcome, Record, ScoreResult};
use crate::error::{CleanerError, Result};
use crate::language_model::NgramModel;
use crate::pipeline::phase::Phase;
use crate::pipeline::pipeline_config::QualityConfig;

/// Ascending perplexity thresholds splitting scores into labelled buckets.
///
/// Bucket `i` holds scores in `(thresholds[i-1], thresholds[i]]`, so a score
/// equal to a boundary lands in the lower bucket. The last bucket carries the
/// highest perplexity.
#[derive(Debug, Clone, PartialEq)]
pub struct BucketScheme {
    thresholds: Vec<f64>,
    labels: Vec<String>,
}

impl BucketScheme {
    pub fn new(thresholds: Vec<f64>, labels: Vec<String>) -> Result<Self> {
        if labels.len() != thresholds.len() + 1 {
            return Err(CleanerError::Config(format!(
                "{} thresholds need {} labels, got {}",
                thresholds.len(),
                thresholds.len() + 1,
                labels.len()
            )));
        }
        if thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(CleanerError::Config(
                "bucket thresholds must be strictly ascending".to_string(),
            ));
        }
        Ok(Self { thresholds, labels })
    }

    pub fn from_config(config: &QualityConfig) -> Result<Self> {
        Self::new(config.thresholds.clone(), config.bucket_labels())
    }

    /// Number of thresholds strictly below `score`
    pub fn bucket_index(&self, score: f64) -> usize {
        self.thresholds.partition_point(|&t| t < score)
    }

    pub fn label(&self, index: usize) -> &str {
        &self.labels[index]
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The highest-perplexity bucket is the one filtered out
    pub fn is_drop(&self, index: usize) -> bool {
        index + 1 == self.labels.len()
    }
}

pub struct QualityScorer {
    model: Arc<NgramModel>,
    tokenizer: Arc<dyn Tokenize>,
    buckets: BucketScheme,
    annotate_only: bool,
    score_field: String,
    bucket_field: String,
    overwrite_fields: bool,
}

impl QualityScorer {
    pub fn new(
        config: &QualityConfig,
        model: Arc<NgramModel>,
        tokenizer: Arc<dyn Tokenize>,
    ) -> Result<Self> {
        Ok(Self {
            model,
            tokenizer,
            buckets: BucketScheme::from_config(config)?,
            annotate_only: config.annotate_only,
            score_field: config.score_field.clone(),
            bucket_field: config.bucket_field.clone(),
            overwrite_fields: config.overwrite_fields,
        })
    }

    pub fn buckets(&self) -> &BucketScheme {
        &self.buckets
    }

    /// Perplexity of `text` and the number of scored events.
    ///
    /// Each line is scored as its own sentence with `<s>` and `</s>`, and
    /// every `</s>` counts as one event next to the real tokens.
    pub fn score_text(&self, text: &str) -> std::result::Result<(f64, usize), DropReason> {
        let mut log10_sum = 0.0f64;
        let mut tokens_seen = 0usize;
        let mut events = 0usize;

        for line in text.lines() {
            let tokens = self.tokenizer.tokenize(line).map_err(|e| {
                warn!("tokenizer failed on a record: {e:#}");
                DropReason::ModelScoreError
            })?;
            if tokens.is_empty() {
                continue;
            }
            log10_sum += self.model.score_tokens(&tokens, true, true);
            tokens_seen += tokens.len();
            events += tokens.len() + 1;
        }

        if tokens_seen == 0 {
            return Err(DropReason::EmptyAfterTokenization);
        }
        let perplexity = (-(log10_sum * std::f64::consts::LN_10) / events as f64).exp();
        if !perplexity.is_finite() {
            return Err(DropReason::ModelScoreError);
        }
        Ok((perplexity, events))
    }

    /// Write the score fields into the record, returning how many keys were
    /// already taken and left untouched
    fn annotate(&self, record: &mut Record, result: &ScoreResult) -> u32 {
        let score = Number::from_f64(result.perplexity).map_or(Value::Null, Value::Number);
        let mut conflicts = 0;
        if !record.annotate(&self.score_field, score, self.overwrite_fields) {
            conflicts += 1;
        }
        let bucket = Value::String(result.bucket.clone());
        if !record.annotate(&self.bucket_field, bucket, self.overwrite_fields) {
            conflicts += 1;
        }
        conflicts
    }
}

impl Phase for QualityScorer {
    fn name(&self) -> &'static str {
        QUALITY_PHASE
    }

    fn apply(&self, mut record: Record) -> Outcome {
        let (perplexity, token_count) = match self.score_text(&record.text) {
            Ok(scored) => scored,
            Err(reason) => return Outcome::dropped(reason),
        };
        let bucket_index = self.buckets.bucket_index(perplexity);
        let mut result = ScoreResult {
            perplexity,
            token_count,
            bucket_index,
            bucket: self.buckets.label(bucket_index).to_string(),
            annotation_conflicts: 0,
        };

        if self.buckets.is_drop(bucket_index) && !self.annotate_only {
            debug!(perplexity, bucket = %result.bucket, "dropping low quality record");
            return Outcome::Dropped {
                reason: DropReason::LowQualityScore,
                score: Some(result),
            };
        }

        result.annotation_conflicts = self.annotate(&mut record, &result);
        record.score = Some(result);
        Outcome::Kept(record)
    }

    fn can_run_parallel(&self) -> bool {
        true
    }
}
