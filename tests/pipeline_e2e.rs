use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use anyhow::Result;
use ja_corpus_cleaner::app::CleanUseCase;
use ja_corpus_cleaner::domain::DropReason;
use ja_corpus_cleaner::pipeline::pipeline_config::OutputRouting;
use ja_corpus_cleaner::pipeline::PipelineConfig;
use ja_corpus_cleaner::CleanerError;
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};

const TINY_ARPA: &str = include_str!("fixtures/tiny.arpa");

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Result<Self> {
        let dir = tempdir()?;
        fs::write(dir.path().join("tiny.arpa"), TINY_ARPA)?;
        Ok(Self { dir })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_input(&self, lines: &[String]) -> Result<PathBuf> {
        let path = self.path("corpus.jsonl");
        fs::write(&path, lines.join("\n") + "\n")?;
        Ok(path)
    }

    /// Short-text friendly settings with the tiny model and char tokens
    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.normalize.min_length = 1;
        config.quality.lm_model = Some(self.path("tiny.arpa"));
        config.quality.char_tokens = true;
        config.quality.thresholds = vec![5.0];
        config
    }
}

fn record(content: &str) -> String {
    json!({ "content": content }).to_string()
}

fn read_lines(path: &Path) -> Result<Vec<Value>> {
    let raw = fs::read_to_string(path)?;
    raw.lines()
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}

#[test]
fn low_quality_records_are_filtered() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。"), record("ははは。")])?;
    let output = fx.path("clean.jsonl");

    let report = CleanUseCase::new(fx.config()).execute(&input, Some(&output), &AtomicBool::new(false))?;

    let lines = read_lines(&output)?;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["content"], json!("こんに。"));
    assert_eq!(lines[0]["quality_bucket"], json!("high"));
    assert!(lines[0]["perplexity"].as_f64().unwrap() < 5.0);

    assert_eq!(report.stats.dropped(DropReason::LowQualityScore), 1);
    assert_eq!(report.stats.buckets.get("low"), Some(&1));
    assert!(report.stats.is_balanced());
    assert!(!report.interrupted);
    Ok(())
}

#[test]
fn annotate_only_keeps_every_scored_record() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。"), record("ははは。")])?;
    let output = fx.path("clean.jsonl");
    let mut config = fx.config();
    config.quality.annotate_only = true;

    let report = CleanUseCase::new(config).execute(&input, Some(&output), &AtomicBool::new(false))?;

    let buckets: Vec<Value> = read_lines(&output)?
        .into_iter()
        .map(|line| line["quality_bucket"].clone())
        .collect();
    assert_eq!(buckets, vec![json!("high"), json!("low")]);
    assert_eq!(report.stats.records_out, 2);
    assert_eq!(report.stats.total_dropped(), 0);
    Ok(())
}

#[test]
fn bad_records_never_stop_the_run() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[
        record("　　こんにちは。　"),
        "{not json".to_string(),
        String::new(),
        json!({ "content": 42 }).to_string(),
        json!({ "other": "x" }).to_string(),
        record(""),
        record("　　こんにちは。　"),
        json!({ "id": 3, "content": "ＡＢＣと日本語の文章です。" }).to_string(),
    ])?;
    let output = fx.path("clean.jsonl");
    let mut config = fx.config();
    config.quality.enabled = false;

    let report = CleanUseCase::new(config).execute(&input, Some(&output), &AtomicBool::new(false))?;

    let lines = read_lines(&output)?;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["content"], json!("こんにちは。"));
    assert_eq!(lines[1], json!({ "id": 3, "content": "ABCと日本語の文章です。" }));

    let stats = &report.stats;
    assert_eq!(stats.records_in, 7);
    assert_eq!(stats.dropped(DropReason::MalformedInput), 3);
    assert_eq!(stats.dropped(DropReason::EmptyAfterNormalization), 1);
    assert_eq!(stats.dropped(DropReason::DuplicateDocument), 1);
    assert!(stats.is_balanced());
    Ok(())
}

#[test]
fn statistics_report_is_written_beside_the_output() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。")])?;
    let out_dir = fx.path("out");
    let output = out_dir.join("clean.jsonl");

    let report = CleanUseCase::new(fx.config()).execute(&input, Some(&output), &AtomicBool::new(false))?;

    let written: Value = serde_json::from_str(&fs::read_to_string(out_dir.join("statistics.json"))?)?;
    assert_eq!(written["run_id"], json!(report.run_id.to_string()));
    assert_eq!(written["stats"]["records_in"], json!(1));
    assert_eq!(written["phases"], json!(["normalize", "dedup", "quality"]));
    assert_eq!(written["interrupted"], json!(false));
    Ok(())
}

#[test]
fn default_output_path_is_derived_from_the_input() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。")])?;
    let mut config = fx.config();
    config.output.stats_file = None;

    CleanUseCase::new(config).execute(&input, None, &AtomicBool::new(false))?;

    assert!(fx.path("corpus_cleaned.jsonl").is_file());
    assert!(!fx.path("statistics.json").exists());
    Ok(())
}

#[test]
fn bucketed_output_splits_files() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。"), record("ははは。"), record("こん。")])?;
    let output = fx.path("clean.jsonl");
    let mut config = fx.config();
    config.quality.annotate_only = true;
    config.output.routing = OutputRouting::Bucketed;

    let report = CleanUseCase::new(config).execute(&input, Some(&output), &AtomicBool::new(false))?;

    assert!(!output.exists());
    let low = read_lines(&fx.path("clean.low.jsonl"))?;
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["content"], json!("ははは。"));
    let high = read_lines(&fx.path("clean.high.jsonl"))?;
    assert_eq!(high.len(), 2);
    assert_eq!(report.outputs.len(), 2);
    Ok(())
}

#[test]
fn parallel_scoring_produces_identical_output() -> Result<()> {
    let fx = Fixture::new()?;
    let texts = ["こんに。", "ははは。", "こん。", "にこん。", "ここ。"];
    let lines: Vec<String> = (0..60)
        .map(|i| json!({ "id": i, "content": format!("{}{}", texts[i % texts.len()], i) }).to_string())
        .collect();
    let input = fx.write_input(&lines)?;

    let sequential = fx.path("seq.jsonl");
    CleanUseCase::new(fx.config()).execute(&input, Some(&sequential), &AtomicBool::new(false))?;

    let parallel = fx.path("par.jsonl");
    let mut config = fx.config();
    config.workers = 4;
    config.batch_size = 7;
    CleanUseCase::new(config).execute(&input, Some(&parallel), &AtomicBool::new(false))?;

    assert_eq!(fs::read(&sequential)?, fs::read(&parallel)?);
    Ok(())
}

#[test]
fn missing_model_is_fatal_and_writes_nothing() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。")])?;
    let output = fx.path("clean.jsonl");
    let mut config = fx.config();
    config.quality.lm_model = Some(fx.path("missing.bin"));

    let err = CleanUseCase::new(config)
        .execute(&input, Some(&output), &AtomicBool::new(false))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CleanerError>(),
        Some(CleanerError::ModelLoad { .. })
    ));
    assert!(!output.exists());
    assert!(!fx.path("statistics.json").exists());
    Ok(())
}

#[test]
fn missing_input_is_fatal() -> Result<()> {
    let fx = Fixture::new()?;
    let output = fx.path("clean.jsonl");
    let err = CleanUseCase::new(fx.config())
        .execute(&fx.path("nope.jsonl"), Some(&output), &AtomicBool::new(false))
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CleanerError>(),
        Some(CleanerError::InputNotFound(_))
    ));
    assert!(!output.exists());
    Ok(())
}

#[test]
fn invalid_thresholds_are_rejected_before_any_work() -> Result<()> {
    let fx = Fixture::new()?;
    let input = fx.write_input(&[record("こんに。")])?;
    let output = fx.path("clean.jsonl");
    let mut config = fx.config();
    config.quality.thresholds = vec![50.0, 10.0];

    let err = CleanUseCase::new(config)
        .execute(&input, Some(&output), &AtomicBool::new(false))
        .unwrap_err();

    assert!(matches!(err.downcast_ref::<CleanerError>(), Some(CleanerError::Config(_))));
    assert!(!output.exists());
    Ok(())
}
