/// Field and file name constants shared across the pipeline and the CLI

// Record fields
pub const DEFAULT_TEXT_FIELD: &str = "content";
pub const DEFAULT_SCORE_FIELD: &str = "perplexity";
pub const DEFAULT_BUCKET_FIELD: &str = "quality_bucket";

// Output naming
pub const CLEANED_SUFFIX: &str = "_cleaned";
pub const JSONL_EXTENSION: &str = "jsonl";
pub const DEFAULT_STATS_FILE: &str = "statistics.json";

// Language model sentence markers
pub const BOS_TOKEN: &str = "<s>";
pub const EOS_TOKEN: &str = "</s>";
pub const UNK_TOKEN: &str = "<unk>";

// Phase names (used for stats and logging)
pub const NORMALIZE_PHASE: &str = "normalize";
pub const DEDUP_PHASE: &str = "dedup";
pub const QUALITY_PHASE: &str = "quality";

/// Files probed, in order, when no language model path is configured
pub fn model_search_paths() -> Vec<std::path::PathBuf> {
    let mut paths: Vec<std::path::PathBuf> = ["model.bin", "kenlm_model.bin", "lm.bin"]
        .iter()
        .map(std::path::PathBuf::from)
        .collect();
    if let Ok(home) = std::env::var("HOME") {
        paths.push(std::path::Path::new(&home).join("kenlm_model.bin"));
    }
    paths
}
