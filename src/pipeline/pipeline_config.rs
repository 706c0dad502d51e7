use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEDUP_PHASE, DEFAULT_BUCKET_FIELD, DEFAULT_SCORE_FIELD, DEFAULT_TEXT_FIELD, NORMALIZE_PHASE,
    QUALITY_PHASE,
};
use crate::error::{CleanerError, Result};

/// Configuration for a complete cleaning run, resolved once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// JSON field holding the text to clean
    pub text_field: String,
    /// Scoring threads; 1 keeps the run strictly sequential
    pub workers: usize,
    /// Records buffered per parallel scoring batch
    pub batch_size: usize,
    pub normalize: NormalizeConfig,
    pub dedup: DedupConfig,
    pub quality: QualityConfig,
    pub output: OutputConfig,
}

/// Phase 1 rule parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizeConfig {
    pub enabled: bool,
    /// Minimum length in characters
    pub min_length: usize,
    /// Maximum length in characters
    pub max_length: usize,
    pub min_sentences: usize,
    /// Upper bound on characters outside Japanese scripts
    pub max_non_japanese_ratio: f64,
    pub max_special_char_ratio: f64,
    pub max_html_ratio: f64,
    pub max_code_ratio: f64,
    /// Runs of one character longer than this are shortened; 0 disables
    pub max_repeat_chars: usize,
    pub max_sentence_length: usize,
    pub min_hiragana_ratio: Option<f64>,
    pub max_hiragana_ratio: Option<f64>,
    pub min_kanji_ratio: Option<f64>,
    pub max_kanji_ratio: Option<f64>,
    /// Minimum share of lines ending in sentence-final punctuation
    pub min_sentence_end_ratio: Option<f64>,
    pub remove_boilerplate: bool,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_length: 10,
            max_length: 10_000,
            min_sentences: 1,
            max_non_japanese_ratio: 0.5,
            max_special_char_ratio: 0.3,
            max_html_ratio: 0.2,
            max_code_ratio: 0.2,
            max_repeat_chars: 3,
            max_sentence_length: 500,
            min_hiragana_ratio: None,
            max_hiragana_ratio: None,
            min_kanji_ratio: None,
            max_kanji_ratio: None,
            min_sentence_end_ratio: None,
            remove_boilerplate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DedupConfig {
    pub enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Phase 2 (perplexity scoring) parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub enabled: bool,
    /// ARPA or compiled n-gram model
    pub lm_model: Option<PathBuf>,
    /// `tokenizer.json` for subword tokenization
    pub tokenizer_model: Option<PathBuf>,
    /// Tokenize into characters instead of loading a tokenizer model
    pub char_tokens: bool,
    /// Probe well-known model locations when `lm_model` is unset
    pub auto_detect: bool,
    /// Ascending perplexity boundaries between buckets
    pub thresholds: Vec<f64>,
    /// One label per bucket; generated when empty
    pub labels: Vec<String>,
    /// Keep every record and only annotate the bucket
    pub annotate_only: bool,
    pub score_field: String,
    pub bucket_field: String,
    /// Replace pre-existing metadata keys with the score fields
    pub overwrite_fields: bool,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lm_model: None,
            tokenizer_model: None,
            char_tokens: false,
            auto_detect: true,
            thresholds: vec![100.0],
            labels: Vec::new(),
            annotate_only: false,
            score_field: DEFAULT_SCORE_FIELD.to_string(),
            bucket_field: DEFAULT_BUCKET_FIELD.to_string(),
            overwrite_fields: false,
        }
    }
}

impl QualityConfig {
    /// Bucket labels, lowest perplexity first
    pub fn bucket_labels(&self) -> Vec<String> {
        if !self.labels.is_empty() {
            return self.labels.clone();
        }
        match self.thresholds.len() {
            1 => vec!["high".to_string(), "low".to_string()],
            2 => vec!["high".to_string(), "medium".to_string(), "low".to_string()],
            n => (0..=n).map(|i| format!("bucket_{}", i)).collect(),
        }
    }
}

/// How emitted records are routed to files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputRouting {
    /// Every record goes to the output file
    Single,
    /// One file per quality bucket
    Bucketed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub routing: OutputRouting,
    /// Where the end-of-run report is written; `None` disables it
    pub stats_file: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            routing: OutputRouting::Single,
            stats_file: Some(PathBuf::from(crate::constants::DEFAULT_STATS_FILE)),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            text_field: DEFAULT_TEXT_FIELD.to_string(),
            workers: 1,
            batch_size: 256,
            normalize: NormalizeConfig::default(),
            dedup: DedupConfig::default(),
            quality: QualityConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

fn config_error(message: impl Into<String>) -> CleanerError {
    CleanerError::Config(message.into())
}

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(config_error(format!("{} must be within [0, 1], got {}", name, value)));
    }
    Ok(())
}

fn check_optional_bounds(name: &str, min: Option<f64>, max: Option<f64>) -> Result<()> {
    if let Some(min) = min {
        check_ratio(&format!("min_{}", name), min)?;
    }
    if let Some(max) = max {
        check_ratio(&format!("max_{}", name), max)?;
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(config_error(format!("min_{0} exceeds max_{0}", name)));
        }
    }
    Ok(())
}

impl PipelineConfig {
    /// Parse a TOML configuration file; unspecified keys keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Names of the enabled phases, in execution order
    pub fn enabled_phases(&self) -> Vec<&'static str> {
        let mut phases = Vec::new();
        if self.normalize.enabled {
            phases.push(NORMALIZE_PHASE);
        }
        if self.dedup.enabled {
            phases.push(DEDUP_PHASE);
        }
        if self.quality.enabled {
            phases.push(QUALITY_PHASE);
        }
        phases
    }

    /// Validate the configuration before any input is touched
    pub fn validate(&self) -> Result<()> {
        if self.text_field.trim().is_empty() {
            return Err(config_error("text_field must not be empty"));
        }
        if self.workers == 0 {
            return Err(config_error("workers must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(config_error("batch_size must be at least 1"));
        }

        let n = &self.normalize;
        if n.max_length == 0 || n.min_length > n.max_length {
            return Err(config_error(format!(
                "invalid length bounds: min_length={} max_length={}",
                n.min_length, n.max_length
            )));
        }
        check_ratio("max_non_japanese_ratio", n.max_non_japanese_ratio)?;
        check_ratio("max_special_char_ratio", n.max_special_char_ratio)?;
        check_ratio("max_html_ratio", n.max_html_ratio)?;
        check_ratio("max_code_ratio", n.max_code_ratio)?;
        check_optional_bounds("hiragana_ratio", n.min_hiragana_ratio, n.max_hiragana_ratio)?;
        check_optional_bounds("kanji_ratio", n.min_kanji_ratio, n.max_kanji_ratio)?;
        if let Some(ratio) = n.min_sentence_end_ratio {
            check_ratio("min_sentence_end_ratio", ratio)?;
        }
        if n.max_sentence_length == 0 {
            return Err(config_error("max_sentence_length must be at least 1"));
        }

        if self.output.routing == OutputRouting::Bucketed && !self.quality.enabled {
            return Err(config_error("bucketed output requires the quality phase"));
        }

        if self.quality.enabled {
            self.validate_quality()?;
        }
        Ok(())
    }

    fn validate_quality(&self) -> Result<()> {
        let q = &self.quality;
        if q.thresholds.is_empty() {
            return Err(config_error("at least one perplexity threshold is required"));
        }
        if q.thresholds.iter().any(|t| !t.is_finite() || *t <= 0.0) {
            return Err(config_error("perplexity thresholds must be finite and positive"));
        }
        if q.thresholds.windows(2).any(|w| w[0] >= w[1]) {
            return Err(config_error(format!(
                "perplexity thresholds must be strictly ascending: {:?}",
                q.thresholds
            )));
        }

        let labels = q.bucket_labels();
        if labels.len() != q.thresholds.len() + 1 {
            return Err(config_error(format!(
                "{} thresholds need {} bucket labels, got {}",
                q.thresholds.len(),
                q.thresholds.len() + 1,
                labels.len()
            )));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            if label.trim().is_empty() || label.contains(['/', '\\']) {
                return Err(config_error(format!("invalid bucket label '{}'", label)));
            }
            if !seen.insert(label.as_str()) {
                return Err(config_error(format!("duplicate bucket label '{}'", label)));
            }
        }

        if q.score_field.is_empty() || q.bucket_field.is_empty() {
            return Err(config_error("score and bucket field names must not be empty"));
        }
        if q.score_field == q.bucket_field
            || q.score_field == self.text_field
            || q.bucket_field == self.text_field
        {
            return Err(config_error(
                "text, score and bucket fields must all have different names",
            ));
        }

        if q.tokenizer_model.is_none() && !q.char_tokens {
            return Err(config_error(
                "the quality phase needs a tokenizer model or character tokens",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scoring_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.quality.char_tokens = true;
        config
    }

    #[test]
    fn defaults_validate_once_a_tokenizer_is_chosen() {
        assert!(PipelineConfig::default().validate().is_err());
        scoring_config().validate().unwrap();
    }

    #[test]
    fn rejects_non_ascending_thresholds() {
        let mut config = scoring_config();
        config.quality.thresholds = vec![50.0, 50.0];
        assert!(matches!(config.validate(), Err(CleanerError::Config(_))));
        config.quality.thresholds = vec![80.0, 20.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn label_count_must_match_thresholds() {
        let mut config = scoring_config();
        config.quality.thresholds = vec![10.0, 100.0];
        config.quality.labels = vec!["good".into(), "bad".into()];
        assert!(config.validate().is_err());
        config.quality.labels = vec!["good".into(), "ok".into(), "bad".into()];
        config.validate().unwrap();
    }

    #[test]
    fn generated_labels_follow_threshold_count() {
        let mut quality = QualityConfig::default();
        assert_eq!(quality.bucket_labels(), vec!["high", "low"]);
        quality.thresholds = vec![1.0, 2.0, 3.0];
        assert_eq!(quality.bucket_labels().len(), 4);
        assert_eq!(quality.bucket_labels()[3], "bucket_3");
    }

    #[test]
    fn bucketed_routing_needs_scoring() {
        let mut config = scoring_config();
        config.quality.enabled = false;
        config.output.routing = OutputRouting::Bucketed;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_overrides_only_what_it_names() {
        let config = PipelineConfig::from_toml_str(
            r#"
            text_field = "text"

            [normalize]
            min_length = 3

            [quality]
            thresholds = [30.0, 300.0]
            char_tokens = true

            [output]
            routing = "bucketed"
            "#,
        )
        .unwrap();
        assert_eq!(config.text_field, "text");
        assert_eq!(config.normalize.min_length, 3);
        assert_eq!(config.normalize.max_length, 10_000);
        assert_eq!(config.output.routing, OutputRouting::Bucketed);
        config.validate().unwrap();
        assert_eq!(config.enabled_phases(), vec!["normalize", "dedup", "quality"]);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PipelineConfig::from_toml_str("[quality]\nthreshold = 3.0\n").unwrap_err();
        assert!(matches!(err, CleanerError::Toml(_)));
    }
}
