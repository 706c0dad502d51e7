use std::path::Path;

use anyhow::anyhow;
use tokenizers::Tokenizer;
use tracing::info;

use crate::app::ports::Tokenize;
use crate::error::{CleanerError, Result};

/// Subword tokenizer backed by a Hugging Face `tokenizer.json`
/// (SentencePiece unigram and BPE models export to this format)
pub struct SubwordTokenizer {
    inner: Tokenizer,
}

impl SubwordTokenizer {
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CleanerError::TokenizerLoad {
                path: path.to_path_buf(),
                message: "file does not exist".to_string(),
            });
        }
        let inner = Tokenizer::from_file(path).map_err(|e| CleanerError::TokenizerLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        info!("Loaded tokenizer from {}", path.display());
        Ok(Self { inner })
    }
}

impl Tokenize for SubwordTokenizer {
    fn tokenize(&self, text: &str) -> anyhow::Result<Vec<String>> {
        let encoding = self
            .inner
            .encode(text, false)
            .map_err(|e| anyhow!("tokenization failed: {}", e))?;
        Ok(encoding.get_tokens().to_vec())
    }
}

/// One token per non-whitespace character; needs no model file
#[derive(Debug, Default, Clone, Copy)]
pub struct CharTokenizer;

impl Tokenize for CharTokenizer {
    fn tokenize(&self, text: &str) -> anyhow::Result<Vec<String>> {
        Ok(text
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(String::from)
            .collect())
    }
}
