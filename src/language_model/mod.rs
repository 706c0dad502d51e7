//! Backoff n-gram language model.
//!
//! Models come either from an ARPA text file or from the compact binary
//! snapshot written by [`binary::save`]. Probabilities are stored and summed
//! in log10, matching the ARPA convention; callers convert to natural log.

pub mod arpa;
pub mod binary;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::constants::{BOS_TOKEN, EOS_TOKEN, UNK_TOKEN};
use crate::error::{CleanerError, Result};

pub type WordId = u32;

/// Log10 probability and backoff weight of one n-gram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NgramEntry {
    pub log_prob: f32,
    pub backoff: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NgramModel {
    order: usize,
    vocab: HashMap<String, WordId>,
    /// `tables[n - 1]` holds the n-grams, keyed by word ids
    tables: Vec<HashMap<Vec<WordId>, NgramEntry>>,
    bos: WordId,
    eos: WordId,
    unk: Option<WordId>,
}

impl NgramModel {
    /// Assemble a model from parsed tables. The vocabulary must contain the
    /// sentence markers.
    pub fn from_tables(
        vocab: HashMap<String, WordId>,
        tables: Vec<HashMap<Vec<WordId>, NgramEntry>>,
    ) -> std::result::Result<Self, String> {
        if tables.is_empty() {
            return Err("model has no n-gram tables".to_string());
        }
        let bos = *vocab
            .get(BOS_TOKEN)
            .ok_or_else(|| format!("vocabulary lacks {}", BOS_TOKEN))?;
        let eos = *vocab
            .get(EOS_TOKEN)
            .ok_or_else(|| format!("vocabulary lacks {}", EOS_TOKEN))?;
        let unk = vocab.get(UNK_TOKEN).copied();
        Ok(Self {
            order: tables.len(),
            vocab,
            tables,
            bos,
            eos,
            unk,
        })
    }

    /// Load a model, detecting the binary snapshot by its magic header and
    /// falling back to ARPA text otherwise.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CleanerError::model_load(path, "file does not exist"));
        }
        let mut file = File::open(path)
            .map_err(|e| CleanerError::model_load(path, e.to_string()))?;
        let mut magic = [0u8; binary::MAGIC.len()];
        let is_binary = match file.read_exact(&mut magic) {
            Ok(()) => magic == binary::MAGIC,
            Err(_) => false,
        };
        drop(file);

        let model = if is_binary {
            binary::load(path)?
        } else {
            let file = File::open(path)
                .map_err(|e| CleanerError::model_load(path, e.to_string()))?;
            arpa::parse(BufReader::new(file))
                .map_err(|message| CleanerError::model_load(path, message))?
        };

        info!(
            "Loaded {}-gram language model from {} ({} words, binary={})",
            model.order,
            path.display(),
            model.vocab.len(),
            is_binary
        );
        Ok(model)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn ngram_count(&self, n: usize) -> usize {
        self.tables.get(n.wrapping_sub(1)).map_or(0, HashMap::len)
    }

    fn word_id(&self, token: &str) -> Option<WordId> {
        self.vocab.get(token).copied().or(self.unk)
    }

    /// Log10 probability of `word` after `context` (oldest word first),
    /// backing off to shorter contexts as needed.
    fn conditional_log_prob(&self, context: &[WordId], word: WordId) -> f64 {
        let mut backoff = 0.0f64;
        let mut key = Vec::with_capacity(context.len() + 1);
        for start in 0..=context.len() {
            let ctx = &context[start..];
            key.clear();
            key.extend_from_slice(ctx);
            key.push(word);
            if let Some(entry) = self.tables[key.len() - 1].get(key.as_slice()) {
                return backoff + f64::from(entry.log_prob);
            }
            if !ctx.is_empty() {
                if let Some(entry) = self.tables[ctx.len() - 1].get(ctx) {
                    backoff += f64::from(entry.backoff);
                }
            }
        }
        f64::NEG_INFINITY
    }

    /// Total log10 probability of a token sequence.
    ///
    /// Tokens outside the vocabulary score as `<unk>`; without an `<unk>`
    /// entry they make the whole sum negative infinity.
    pub fn score_tokens<S: AsRef<str>>(&self, tokens: &[S], bos: bool, eos: bool) -> f64 {
        let history_len = self.order.saturating_sub(1);
        let mut history: Vec<WordId> = Vec::with_capacity(history_len + 1);
        if bos && history_len > 0 {
            history.push(self.bos);
        }

        let mut total = 0.0f64;
        let words = tokens
            .iter()
            .map(|t| self.word_id(t.as_ref()))
            .chain(eos.then_some(Some(self.eos)));

        for word in words {
            let Some(word) = word else {
                return f64::NEG_INFINITY;
            };
            total += self.conditional_log_prob(&history, word);
            if history_len == 0 {
                continue;
            }
            history.push(word);
            if history.len() > history_len {
                history.remove(0);
            }
        }
        total
    }
}
