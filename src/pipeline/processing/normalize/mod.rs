//! Phase 1: character-level rewriting followed by structural and content filters.
//!
//! Rewrite rules run in a fixed order and are idempotent, so feeding a
//! normalized record back through the phase leaves its text unchanged.

pub mod charset;
pub mod filters;

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;
use unicode_normalization::UnicodeNormalization;

use crate::constants::NORMALIZE_PHASE;
use crate::domain::{DropReason, Outcome, Record};
use crate::pipeline::phase::Phase;
use crate::pipeline::pipeline_config::NormalizeConfig;
use filters::ContentFilters;

/// Whole lines that carry site chrome rather than content
static BOILERPLATE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^(?:copyright\b|©|\(c\)\s*\d{4})",
        r"(?i)all rights reserved",
        r"^(?:ページ(?:の)?(?:トップ|先頭)へ(?:戻る)?|トップページ|ホーム|利用規約|プライバシーポリシー|サイトマップ|お問い合わせ|会社概要|ログイン|新規登録|シェアする|ツイート|次へ|前へ|もっと見る)$",
        r"^(?:TOP|HOME|MENU|PAGE TOP)$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

pub struct Normalizer {
    max_repeat_chars: usize,
    remove_boilerplate: bool,
    filters: ContentFilters,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self {
            max_repeat_chars: config.max_repeat_chars,
            remove_boilerplate: config.remove_boilerplate,
            filters: ContentFilters::new(config),
        }
    }

    /// Apply the rewrite rules only, without the content filters.
    ///
    /// Returns the drop reason when nothing survives rewriting.
    pub fn normalize(&self, text: &str) -> Result<String, DropReason> {
        let stripped = strip_control(text);
        let unified: String = stripped.nfkc().collect();
        let collapsed = collapse_whitespace(&unified);
        let squeezed = self.collapse_repeats(&collapsed);
        if squeezed.is_empty() {
            return Err(DropReason::EmptyAfterNormalization);
        }

        let cleaned = self.line_pass(&squeezed);
        if cleaned.is_empty() {
            return Err(DropReason::DuplicateLineCollapsedToEmpty);
        }
        Ok(cleaned)
    }

    fn collapse_repeats(&self, text: &str) -> String {
        if self.max_repeat_chars == 0 {
            return text.to_string();
        }
        let mut out = String::with_capacity(text.len());
        let mut prev: Option<char> = None;
        let mut run = 0usize;
        for c in text.chars() {
            if prev == Some(c) {
                run += 1;
            } else {
                prev = Some(c);
                run = 1;
            }
            let squeezable = !c.is_whitespace() && !c.is_ascii_digit();
            if squeezable && run > self.max_repeat_chars {
                continue;
            }
            out.push(c);
        }
        out
    }

    /// Drop boilerplate lines and keep only the first copy of repeated lines
    fn line_pass(&self, text: &str) -> String {
        let mut seen: HashSet<&str> = HashSet::new();
        let kept: Vec<&str> = text
            .lines()
            .filter(|line| !(self.remove_boilerplate && is_boilerplate(line)))
            .filter(|line| seen.insert(*line))
            .collect();
        kept.join("\n")
    }
}

fn is_boilerplate(line: &str) -> bool {
    BOILERPLATE.iter().any(|re| re.is_match(line))
}

fn strip_control(text: &str) -> String {
    text.chars()
        .filter(|&c| c == '\n' || c == '\t' || !c.is_control())
        .collect()
}

fn collapse_whitespace(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split(['\n', '\r'])
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

impl Phase for Normalizer {
    fn name(&self) -> &'static str {
        NORMALIZE_PHASE
    }

    fn apply(&self, mut record: Record) -> Outcome {
        let text = match self.normalize(&record.text) {
            Ok(text) => text,
            Err(reason) => return Outcome::dropped(reason),
        };
        if let Some(reason) = self.filters.check(&text) {
            trace!(reason = reason.as_str(), "record rejected by content filters");
            return Outcome::dropped(reason);
        }
        record.text = text;
        Outcome::Kept(record)
    }

    fn can_run_parallel(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_TEXT_FIELD;

    fn lenient() -> Normalizer {
        Normalizer::new(NormalizeConfig {
            min_length: 1,
            ..NormalizeConfig::default()
        })
    }

    fn kept_text(outcome: Outcome) -> String {
        match outcome {
            Outcome::Kept(record) => record.text,
            Outcome::Dropped { reason, .. } => panic!("unexpected drop: {reason}"),
        }
    }

    #[test]
    fn full_width_spaces_are_trimmed() {
        let record = Record::new("　　こんにちは。　", DEFAULT_TEXT_FIELD);
        assert_eq!(kept_text(lenient().apply(record)), "こんにちは。");
    }

    #[test]
    fn nfkc_unifies_width() {
        let n = lenient();
        assert_eq!(n.normalize("ＡＢＣ１２３").unwrap(), "ABC123");
        assert_eq!(n.normalize("ｶﾀｶﾅ").unwrap(), "カタカナ");
    }

    #[test]
    fn control_characters_and_blank_lines_go() {
        let n = lenient();
        let text = "一行目\u{0007}です。\r\n\r\n\t二行目   です。 ";
        assert_eq!(n.normalize(text).unwrap(), "一行目です。\n二行目 です。");
    }

    #[test]
    fn long_runs_are_squeezed_but_digits_survive() {
        let n = lenient();
        assert_eq!(n.normalize("すごーーーーーい!!!!!!").unwrap(), "すごーーーい!!!");
        assert_eq!(n.normalize("電話 0120000000").unwrap(), "電話 0120000000");
    }

    #[test]
    fn zero_repeat_limit_leaves_runs_alone() {
        let n = Normalizer::new(NormalizeConfig {
            min_length: 1,
            max_repeat_chars: 0,
            ..NormalizeConfig::default()
        });
        assert_eq!(n.normalize("すごーーい、ああ。").unwrap(), "すごーーい、ああ。");
        assert_eq!(n.normalize("わーーーーーーい").unwrap(), "わーーーーーーい");
    }

    #[test]
    fn repeated_lines_and_boilerplate_are_removed() {
        let n = lenient();
        let text = "本文の一行目。\nページトップへ\n本文の一行目。\nCopyright 2024 Example Inc.\n本文の二行目。";
        assert_eq!(n.normalize(text).unwrap(), "本文の一行目。\n本文の二行目。");
    }

    #[test]
    fn rewriting_is_idempotent() {
        let n = lenient();
        let inputs = [
            "　　こんにちは。　",
            "ａａａａａａ\r\n\r\nテスト　　テスト\nテスト　　テスト",
            "ｶﾞｷﾞｸﾞ!!!!!\u{0000}\n利用規約\nおわり",
            "e\u{0301}\u{0301}\u{0301}\u{0301}\u{0301}",
        ];
        for input in inputs {
            let once = n.normalize(input).unwrap();
            assert_eq!(n.normalize(&once).unwrap(), once, "input: {input:?}");
        }
    }

    #[test]
    fn empty_text_drops_before_filters() {
        let record = Record::new("", DEFAULT_TEXT_FIELD);
        match lenient().apply(record) {
            Outcome::Dropped { reason, .. } => {
                assert_eq!(reason, DropReason::EmptyAfterNormalization)
            }
            Outcome::Kept(_) => panic!("empty text must drop"),
        }
        assert_eq!(
            lenient().normalize(" \u{3000}\n\t "),
            Err(DropReason::EmptyAfterNormalization)
        );
    }

    #[test]
    fn pure_boilerplate_collapses_to_empty() {
        assert_eq!(
            lenient().normalize("ページトップへ\nAll rights reserved.\nプライバシーポリシー"),
            Err(DropReason::DuplicateLineCollapsedToEmpty)
        );
    }

    #[test]
    fn filters_run_on_the_rewritten_text() {
        let strict = Normalizer::new(NormalizeConfig::default());
        let record = Record::new("　　こんにちは。　", DEFAULT_TEXT_FIELD);
        match strict.apply(record) {
            Outcome::Dropped { reason, .. } => assert_eq!(reason, DropReason::TooShort),
            Outcome::Kept(_) => panic!("six characters is below the default minimum"),
        }
    }
}
