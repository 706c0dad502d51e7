use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use ja_corpus_cleaner::app::clean_use_case::load_scoring_resources;
use ja_corpus_cleaner::app::{CleanUseCase, RunReport};
use ja_corpus_cleaner::language_model::{binary, NgramModel};
use ja_corpus_cleaner::observability::{init_logging, metrics};
use ja_corpus_cleaner::pipeline::pipeline_config::{NormalizeConfig, OutputRouting, QualityConfig};
use ja_corpus_cleaner::pipeline::processing::{Normalizer, QualityScorer};
use ja_corpus_cleaner::pipeline::PipelineConfig;

/// Exit status of a run stopped with Ctrl-C
const INTERRUPTED_EXIT: u8 = 130;

#[derive(Parser)]
#[command(name = "corpus-cleaner")]
#[command(about = "Clean Japanese JSONL corpora with rule-based normalization and n-gram perplexity filtering")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a JSONL file
    Clean(CleanArgs),
    /// Convert an ARPA model into the compact binary format
    CompileModel {
        /// ARPA model to read
        arpa: PathBuf,
        /// Where to write the binary model
        output: PathBuf,
    },
    /// Print the perplexity of a single text
    Score {
        /// Language model (ARPA or binary)
        #[arg(long)]
        lm: PathBuf,
        #[command(flatten)]
        tokenizer: TokenizerArgs,
        /// Score the text as given, without normalizing it first
        #[arg(long)]
        raw: bool,
        text: String,
    },
}

#[derive(Args)]
struct TokenizerArgs {
    /// tokenizer.json for subword tokenization
    #[arg(long)]
    tokenizer: Option<PathBuf>,
    /// Tokenize into characters instead of loading a tokenizer model
    #[arg(long)]
    char_tokens: bool,
}

#[derive(Args)]
struct CleanArgs {
    /// Input JSONL file
    input: PathBuf,
    /// Output file (default: <input-stem>_cleaned.jsonl)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// TOML configuration file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON field holding the text
    #[arg(long)]
    text_field: Option<String>,
    /// Skip Phase 1 normalization
    #[arg(long)]
    no_normalize: bool,
    /// Skip exact duplicate removal
    #[arg(long)]
    no_dedup: bool,
    /// Skip Phase 2 perplexity scoring
    #[arg(long)]
    no_quality: bool,
    /// Language model (ARPA or binary); auto-detected when omitted
    #[arg(long)]
    lm: Option<PathBuf>,
    #[command(flatten)]
    tokenizer: TokenizerArgs,
    /// Ascending perplexity thresholds, comma-separated
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f64>>,
    /// Bucket labels, comma-separated, one more than thresholds
    #[arg(long, value_delimiter = ',')]
    labels: Option<Vec<String>>,
    /// Keep every record and only annotate its bucket
    #[arg(long)]
    annotate_only: bool,
    /// Replace existing score fields instead of keeping them
    #[arg(long)]
    overwrite_fields: bool,
    /// Write one output file per quality bucket
    #[arg(long)]
    bucketed: bool,
    /// Scoring threads
    #[arg(long)]
    workers: Option<usize>,
    /// Records per parallel scoring batch
    #[arg(long)]
    batch_size: Option<usize>,
    /// Statistics report path, relative to the output directory
    #[arg(long)]
    stats_file: Option<PathBuf>,
    /// Do not write the statistics report
    #[arg(long)]
    no_stats: bool,
    /// Write Prometheus metrics to this file at the end of the run
    #[arg(long)]
    metrics_output: Option<PathBuf>,
}

impl CleanArgs {
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_toml_file(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(field) = &self.text_field {
            config.text_field = field.clone();
        }
        if self.no_normalize {
            config.normalize.enabled = false;
        }
        if self.no_dedup {
            config.dedup.enabled = false;
        }
        if self.no_quality {
            config.quality.enabled = false;
        }
        if let Some(lm) = &self.lm {
            config.quality.lm_model = Some(lm.clone());
        }
        if let Some(tokenizer) = &self.tokenizer.tokenizer {
            config.quality.tokenizer_model = Some(tokenizer.clone());
        }
        if self.tokenizer.char_tokens {
            config.quality.char_tokens = true;
        }
        if let Some(thresholds) = &self.thresholds {
            config.quality.thresholds = thresholds.clone();
        }
        if let Some(labels) = &self.labels {
            config.quality.labels = labels.clone();
        }
        if self.annotate_only {
            config.quality.annotate_only = true;
        }
        if self.overwrite_fields {
            config.quality.overwrite_fields = true;
        }
        if self.bucketed {
            config.output.routing = OutputRouting::Bucketed;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(stats_file) = &self.stats_file {
            config.output.stats_file = Some(stats_file.clone());
        }
        if self.no_stats {
            config.output.stats_file = None;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Clean(args) => run_clean(args).await,
        Commands::CompileModel { arpa, output } => compile_model(&arpa, &output),
        Commands::Score {
            lm,
            tokenizer,
            raw,
            text,
        } => score_text(lm, tokenizer, raw, &text),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!("Fatal: {:#}", e);
            eprintln!("❌ {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_clean(args: CleanArgs) -> Result<ExitCode> {
    let config = args.load_config()?;
    if args.metrics_output.is_some() {
        metrics::init()?;
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let signal_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current record");
            signal_flag.store(true, Ordering::Relaxed);
        }
    });

    let input = args.input.clone();
    let output = args.output.clone();
    let report = tokio::task::spawn_blocking(move || {
        CleanUseCase::new(config).execute(&input, output.as_deref(), &cancel)
    })
    .await
    .context("cleaning task panicked")??;

    if let Some(path) = &args.metrics_output {
        let rendered = metrics::render().unwrap_or_default();
        std::fs::write(path, rendered)
            .with_context(|| format!("writing metrics to {}", path.display()))?;
        info!("Metrics written to {}", path.display());
    }

    print_summary(&report);
    if report.interrupted {
        return Ok(ExitCode::from(INTERRUPTED_EXIT));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(report: &RunReport) {
    let stats = &report.stats;
    if report.interrupted {
        println!("\n⏹️ Run interrupted; output holds every record finished so far");
    }
    println!("\n📊 Cleaning results ({})", report.run_id);
    println!("   Input:   {}", report.input.display());
    for output in &report.outputs {
        println!("   Output:  {}", output.display());
    }
    println!("   Records: {} in, {} kept, {} dropped", stats.records_in, stats.records_out, stats.total_dropped());
    for (reason, count) in &stats.drops {
        println!("   - {}: {}", reason, count);
    }
    if !stats.buckets.is_empty() {
        println!("   Buckets:");
        for (bucket, count) in &stats.buckets {
            println!("   - {}: {}", bucket, count);
        }
    }
    if let Some(score) = &stats.score {
        println!(
            "   Perplexity: min {:.2}, mean {:.2}, max {:.2}",
            score.min, score.mean, score.max
        );
    }
}

fn compile_model(arpa: &Path, output: &Path) -> Result<ExitCode> {
    let model = NgramModel::load(arpa)?;
    binary::save(&model, output)?;
    println!(
        "✅ Wrote {}-gram model ({} words) to {}",
        model.order(),
        model.vocab_size(),
        output.display()
    );
    Ok(ExitCode::SUCCESS)
}

fn score_text(lm: PathBuf, tokenizer: TokenizerArgs, raw: bool, text: &str) -> Result<ExitCode> {
    let config = QualityConfig {
        lm_model: Some(lm),
        tokenizer_model: tokenizer.tokenizer,
        char_tokens: tokenizer.char_tokens,
        ..QualityConfig::default()
    };
    let (_, model, tokenizer) = load_scoring_resources(&config)?;
    let scorer = QualityScorer::new(&config, model, tokenizer)?;

    let text = if raw {
        text.to_string()
    } else {
        match Normalizer::new(NormalizeConfig::default()).normalize(text) {
            Ok(text) => text,
            Err(reason) => {
                println!("dropped during normalization: {}", reason);
                return Ok(ExitCode::SUCCESS);
            }
        }
    };

    match scorer.score_text(&text) {
        Ok((perplexity, events)) => {
            let index = scorer.buckets().bucket_index(perplexity);
            println!(
                "perplexity={:.4} tokens={} bucket={}",
                perplexity,
                events,
                scorer.buckets().label(index)
            );
        }
        Err(reason) => println!("not scorable: {}", reason),
    }
    Ok(ExitCode::SUCCESS)
}
