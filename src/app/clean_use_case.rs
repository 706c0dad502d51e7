use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::app::ports::Tokenize;
use crate::constants::{model_search_paths, CLEANED_SUFFIX, JSONL_EXTENSION};
use crate::error::CleanerError;
use crate::infra::jsonl_input_adapter::JsonlLines;
use crate::infra::jsonl_output_adapter::{BucketedJsonlSink, JsonlFileSink};
use crate::infra::tokenizer_adapter::{CharTokenizer, SubwordTokenizer};
use crate::language_model::NgramModel;
use crate::observability::metrics;
use crate::pipeline::pipeline_config::{OutputRouting, QualityConfig};
use crate::pipeline::processing::{DedupPhase, Normalizer, QualityScorer};
use crate::pipeline::{Phase, PipelineConfig, PipelineOrchestrator, PipelineStats};

/// End-of-run summary, written as JSON next to the output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub input: PathBuf,
    pub outputs: Vec<PathBuf>,
    pub phases: Vec<String>,
    pub language_model: Option<PathBuf>,
    pub interrupted: bool,
    pub elapsed_secs: f64,
    pub config: PipelineConfig,
    pub stats: PipelineStats,
}

/// `<stem>_cleaned.jsonl` beside the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{}{}.{}", stem, CLEANED_SUFFIX, JSONL_EXTENSION))
}

/// Configured model path, or the first well-known location that exists
pub fn resolve_model_path(config: &QualityConfig) -> crate::error::Result<PathBuf> {
    if let Some(path) = &config.lm_model {
        return Ok(path.clone());
    }
    let candidates = model_search_paths();
    if config.auto_detect {
        if let Some(found) = candidates.iter().find(|p| p.is_file()) {
            info!("Auto-detected language model at {}", found.display());
            return Ok(found.clone());
        }
    }
    let searched: Vec<String> = candidates.iter().map(|p| p.display().to_string()).collect();
    Err(CleanerError::Config(format!(
        "no language model configured and none found (searched: {})",
        searched.join(", ")
    )))
}

/// Load the model and tokenizer that Phase 2 needs
pub fn load_scoring_resources(
    config: &QualityConfig,
) -> crate::error::Result<(PathBuf, Arc<NgramModel>, Arc<dyn Tokenize>)> {
    let model_path = resolve_model_path(config)?;
    let started = Instant::now();
    let model = NgramModel::load(&model_path)?;
    metrics::model::load_duration(started.elapsed().as_secs_f64());

    let tokenizer: Arc<dyn Tokenize> = match &config.tokenizer_model {
        Some(path) => Arc::new(SubwordTokenizer::from_file(path)?),
        None if config.char_tokens => Arc::new(CharTokenizer),
        None => {
            return Err(CleanerError::Config(
                "quality scoring needs a tokenizer model or character tokens".to_string(),
            ))
        }
    };
    Ok((model_path, Arc::new(model), tokenizer))
}

/// Use case for cleaning one JSONL file end to end
pub struct CleanUseCase {
    config: PipelineConfig,
}

impl CleanUseCase {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the configured phases over `input`.
    ///
    /// Everything that can fail at startup (configuration, input path,
    /// model files) is checked before the output file is created.
    pub fn execute(
        &self,
        input: &Path,
        output: Option<&Path>,
        cancel: &AtomicBool,
    ) -> Result<RunReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        self.config.validate()?;

        let lines = JsonlLines::open(input)?;
        let output = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_path(input));
        info!(%run_id, "Cleaning {} → {}", input.display(), output.display());

        let (phases, language_model) = self.build_phases()?;
        let mut orchestrator = PipelineOrchestrator::new(phases, self.config.text_field.clone())
            .with_parallelism(self.config.workers, self.config.batch_size);

        let (outcome, outputs) = match self.config.output.routing {
            OutputRouting::Single => {
                let mut sink = JsonlFileSink::create(&output)?;
                let outcome = orchestrator.run(lines, &mut sink, cancel)?;
                (outcome, vec![sink.path().to_path_buf()])
            }
            OutputRouting::Bucketed => {
                let mut sink = BucketedJsonlSink::new(&output);
                let outcome = orchestrator.run(lines, &mut sink, cancel)?;
                (outcome, sink.paths())
            }
        };

        let phases = orchestrator.phase_names().iter().map(|s| s.to_string()).collect();
        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            input: input.to_path_buf(),
            outputs,
            phases,
            language_model,
            interrupted: outcome.interrupted,
            elapsed_secs: outcome.elapsed.as_secs_f64(),
            config: self.config.clone(),
            stats: orchestrator.into_stats(),
        };

        if let Some(stats_file) = &self.config.output.stats_file {
            let path = report_path(&output, stats_file);
            write_report(&report, &path)?;
            info!("Statistics written to {}", path.display());
        }
        Ok(report)
    }

    fn build_phases(&self) -> Result<(Vec<Box<dyn Phase>>, Option<PathBuf>)> {
        let mut phases: Vec<Box<dyn Phase>> = Vec::new();
        let mut language_model = None;

        if self.config.normalize.enabled {
            phases.push(Box::new(Normalizer::new(self.config.normalize.clone())));
        }
        if self.config.dedup.enabled {
            phases.push(Box::new(DedupPhase::new()));
        }
        if self.config.quality.enabled {
            let (path, model, tokenizer) = load_scoring_resources(&self.config.quality)?;
            let scorer = QualityScorer::new(&self.config.quality, model, tokenizer)?;
            info!(
                "Quality buckets: {} (thresholds {:?}, annotate_only={})",
                scorer.buckets().labels().join(", "),
                self.config.quality.thresholds,
                self.config.quality.annotate_only
            );
            phases.push(Box::new(scorer));
            language_model = Some(path);
        }
        Ok((phases, language_model))
    }
}

/// Relative report paths are placed in the output directory
fn report_path(output: &Path, stats_file: &Path) -> PathBuf {
    if stats_file.is_absolute() {
        return stats_file.to_path_buf();
    }
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(stats_file),
        _ => stats_file.to_path_buf(),
    }
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("creating statistics file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, report)
        .with_context(|| format!("writing statistics file {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_output_sits_beside_the_input() {
        assert_eq!(
            default_output_path(Path::new("/data/corpus.jsonl")),
            PathBuf::from("/data/corpus_cleaned.jsonl")
        );
    }

    #[test]
    fn relative_reports_follow_the_output() {
        assert_eq!(
            report_path(Path::new("/out/clean.jsonl"), Path::new("statistics.json")),
            PathBuf::from("/out/statistics.json")
        );
        assert_eq!(
            report_path(Path::new("clean.jsonl"), Path::new("statistics.json")),
            PathBuf::from("statistics.json")
        );
        assert_eq!(
            report_path(Path::new("/out/clean.jsonl"), Path::new("/tmp/s.json")),
            PathBuf::from("/tmp/s.json")
        );
    }

    #[test]
    fn explicit_model_path_wins() {
        let config = QualityConfig {
            lm_model: Some(PathBuf::from("/models/ja.arpa")),
            ..QualityConfig::default()
        };
        assert_eq!(resolve_model_path(&config).unwrap(), PathBuf::from("/models/ja.arpa"));
    }

    #[test]
    fn missing_tokenizer_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let model = dir.path().join("tiny.arpa");
        std::fs::write(&model, crate::language_model::test_support::TINY_ARPA).unwrap();
        let config = QualityConfig {
            lm_model: Some(model),
            ..QualityConfig::default()
        };
        let err = load_scoring_resources(&config).err().unwrap();
        assert!(matches!(err, CleanerError::Config(_)));
    }
}
