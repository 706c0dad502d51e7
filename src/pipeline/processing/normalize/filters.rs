use once_cell::sync::Lazy;
use regex::Regex;

use super::charset;
use crate::domain::DropReason;
use crate::pipeline::pipeline_config::NormalizeConfig;

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[A-Za-z][A-Za-z0-9]*(?:\s[^<>]*)?/?>").unwrap());

static CODE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(\bdef\s+\w+\s*\(|\bclass\s+\w+|\bimport\s+\w+|#include\s*<|\bfunction\s+\w+\s*\(|\b(?:const|let|var)\s+\w+\s*=|<\?php|<\?=|```)",
    )
    .unwrap()
});

static LOG_SIGNATURES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d{4}-\d{2}-\d{2}\s+\d{2}:\d{2}:\d{2}",
        r"\[(DEBUG|INFO|WARN|ERROR|FATAL)\]",
        r"ERROR:",
        r"Exception:",
        r"Traceback\s+\(most recent call last\)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});

/// Distinct log signatures needed before a text is treated as a log dump
const LOG_SIGNATURE_THRESHOLD: usize = 3;

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn outside(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_some_and(|min| value < min) || max.is_some_and(|max| value > max)
}

/// Character tallies gathered in a single pass
#[derive(Debug, Default)]
struct CharCounts {
    total: usize,
    non_whitespace: usize,
    foreign: usize,
    special: usize,
    hiragana: usize,
    kanji: usize,
}

impl CharCounts {
    fn of(text: &str) -> Self {
        let mut counts = Self::default();
        for c in text.chars() {
            counts.total += 1;
            if c.is_whitespace() {
                continue;
            }
            counts.non_whitespace += 1;
            if charset::is_foreign(c) {
                counts.foreign += 1;
            }
            if charset::is_special_symbol(c) {
                counts.special += 1;
            }
            if charset::is_hiragana(c) {
                counts.hiragana += 1;
            } else if charset::is_kanji(c) {
                counts.kanji += 1;
            }
        }
        counts
    }
}

/// Structural and content checks applied to already-normalized text
pub struct ContentFilters {
    config: NormalizeConfig,
}

impl ContentFilters {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    /// First failing check, in fixed order, or `None` when the text passes
    pub fn check(&self, text: &str) -> Option<DropReason> {
        let c = &self.config;
        let counts = CharCounts::of(text);
        let sentences: Vec<&str> = text
            .split(charset::is_sentence_delimiter)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if counts.total < c.min_length || sentences.len() < c.min_sentences {
            return Some(DropReason::TooShort);
        }
        if counts.total > c.max_length {
            return Some(DropReason::TooLong);
        }
        if ratio(counts.foreign, counts.non_whitespace) > c.max_non_japanese_ratio {
            return Some(DropReason::BadCharacterRatio);
        }
        if ratio(counts.special, counts.total) > c.max_special_char_ratio {
            return Some(DropReason::SpecialCharRatio);
        }
        if self.html_ratio(text, counts.total) > c.max_html_ratio {
            return Some(DropReason::HtmlContent);
        }
        if self.code_ratio(text, counts.total) > c.max_code_ratio {
            return Some(DropReason::CodeContent);
        }
        if self.looks_like_log(text) {
            return Some(DropReason::LogContent);
        }
        if sentences
            .iter()
            .any(|s| s.chars().count() > c.max_sentence_length)
        {
            return Some(DropReason::SentenceTooLong);
        }

        let hiragana = ratio(counts.hiragana, counts.non_whitespace);
        let kanji = ratio(counts.kanji, counts.non_whitespace);
        if outside(hiragana, c.min_hiragana_ratio, c.max_hiragana_ratio)
            || outside(kanji, c.min_kanji_ratio, c.max_kanji_ratio)
        {
            return Some(DropReason::ScriptRatio);
        }

        if let Some(min) = c.min_sentence_end_ratio {
            if self.sentence_end_ratio(text) < min {
                return Some(DropReason::MissingSentenceEnd);
            }
        }
        None
    }

    fn html_ratio(&self, text: &str, total: usize) -> f64 {
        let markup: usize = HTML_TAG
            .find_iter(text)
            .map(|m| m.as_str().chars().count())
            .sum();
        ratio(markup, total)
    }

    fn code_ratio(&self, text: &str, total: usize) -> f64 {
        let code: usize = text
            .lines()
            .filter(|line| CODE_LINE.is_match(line))
            .map(|line| line.chars().count())
            .sum();
        ratio(code, total)
    }

    fn looks_like_log(&self, text: &str) -> bool {
        LOG_SIGNATURES.iter().filter(|re| re.is_match(text)).count() >= LOG_SIGNATURE_THRESHOLD
    }

    fn sentence_end_ratio(&self, text: &str) -> f64 {
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let ended = lines
            .iter()
            .filter(|l| l.trim_end().chars().last().is_some_and(charset::is_sentence_end))
            .count();
        ratio(ended, lines.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters() -> ContentFilters {
        ContentFilters::new(NormalizeConfig::default())
    }

    const PROSE: &str = "今日は天気が良いので、公園まで散歩に出かけました。";

    #[test]
    fn accepts_ordinary_prose() {
        assert_eq!(filters().check(PROSE), None);
    }

    #[test]
    fn length_bounds() {
        assert_eq!(filters().check("短い。"), Some(DropReason::TooShort));
        let long = "あ".repeat(10_001);
        assert_eq!(filters().check(&long), Some(DropReason::TooLong));
    }

    #[test]
    fn sentence_count_counts_as_too_short() {
        let config = NormalizeConfig {
            min_sentences: 3,
            ..NormalizeConfig::default()
        };
        let filters = ContentFilters::new(config);
        assert_eq!(filters.check(PROSE), Some(DropReason::TooShort));
    }

    #[test]
    fn mostly_latin_text_is_rejected() {
        let text = "This sentence is written in English only.";
        assert_eq!(filters().check(text), Some(DropReason::BadCharacterRatio));
    }

    #[test]
    fn symbol_soup_is_rejected() {
        let text = "記号だらけ!!@@##$$%%^^&&**(())";
        assert_eq!(filters().check(text), Some(DropReason::SpecialCharRatio));
    }

    #[test]
    fn markup_heavy_text_is_rejected() {
        let text = "<p>本日は晴天なり、散歩日和です。</p><p>明日も晴れるでしょう。</p>";
        assert_eq!(filters().check(text), Some(DropReason::HtmlContent));
    }

    #[test]
    fn code_lines_are_rejected() {
        let text = "次のコードを実行します。\nconst 値 = 1\nlet 結果 = 値\n実行しました。";
        assert_eq!(filters().check(text), Some(DropReason::CodeContent));
    }

    #[test]
    fn log_dumps_are_rejected() {
        let text = "2024-01-01 12:00:00 [ERROR] 処理が失敗しました。\nException: 接続できません。";
        assert_eq!(filters().check(text), Some(DropReason::LogContent));
    }

    #[test]
    fn overlong_sentences_are_rejected() {
        let text = format!("{}。", "長".repeat(501));
        assert_eq!(filters().check(&text), Some(DropReason::SentenceTooLong));
    }

    #[test]
    fn optional_script_bounds() {
        let config = NormalizeConfig {
            min_kanji_ratio: Some(0.5),
            ..NormalizeConfig::default()
        };
        assert_eq!(ContentFilters::new(config).check(PROSE), Some(DropReason::ScriptRatio));
    }

    #[test]
    fn optional_sentence_end_ratio() {
        let config = NormalizeConfig {
            min_sentence_end_ratio: Some(0.7),
            ..NormalizeConfig::default()
        };
        let text = "見出しだけの行です\nこちらも終わりがない\n最後の行は終わる。";
        assert_eq!(
            ContentFilters::new(config).check(text),
            Some(DropReason::MissingSentenceEnd)
        );
    }
}
