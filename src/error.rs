use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors. Anything in here aborts the run; per-record problems are
/// expressed as [`crate::domain::DropReason`] instead.
#[derive(Error, Debug)]
pub enum CleanerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input file not found: {0}")]
    InputNotFound(PathBuf),

    #[error("Failed to load language model {path}: {message}")]
    ModelLoad { path: PathBuf, message: String },

    #[error("Failed to load tokenizer model {path}: {message}")]
    TokenizerLoad { path: PathBuf, message: String },
}

impl CleanerError {
    pub fn model_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        CleanerError::ModelLoad {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanerError>;
