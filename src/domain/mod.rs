//! Data shapes shared by every phase of the cleaner.

use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::Value;

/// One metadata value. Values read from input stay as their original JSON
/// text so numbers and escapes are written back byte for byte.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Raw(Box<RawValue>),
    Parsed(Value),
}

impl FieldValue {
    /// Parsed view of the value; unparseable raw text reads as null
    pub fn to_value(&self) -> Value {
        match self {
            FieldValue::Raw(raw) => serde_json::from_str(raw.get()).unwrap_or(Value::Null),
            FieldValue::Parsed(value) => value.clone(),
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Raw(a), FieldValue::Raw(b)) => a.get() == b.get(),
            _ => self.to_value() == other.to_value(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Raw(raw) => raw.serialize(serializer),
            FieldValue::Parsed(value) => value.serialize(serializer),
        }
    }
}

/// JSON object fields in input order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, FieldValue)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn value(&self, key: &str) -> Option<Value> {
        self.get(key).map(FieldValue::to_value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace an existing key in place or append a new one
    pub fn insert(&mut self, key: impl Into<String>, value: FieldValue) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Fields {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

struct FieldsVisitor;

impl<'de> Visitor<'de> for FieldsVisitor {
    type Value = Fields;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Fields, A::Error> {
        let mut fields = Fields::new();
        while let Some((key, raw)) = access.next_entry::<String, Box<RawValue>>()? {
            fields.insert(key, FieldValue::Raw(raw));
        }
        Ok(fields)
    }
}

impl<'de> Deserialize<'de> for Fields {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(FieldsVisitor)
    }
}

/// One corpus entry flowing through the pipeline.
///
/// `metadata` is the full JSON object as read from the input line, key order
/// and number spelling preserved. The slot of the text field stays in place
/// and is refreshed from `text` when the record is serialized again, so the
/// rewritten text lands where the input had it.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub text: String,
    pub metadata: Fields,
    /// Set by the quality scorer when the record is kept.
    pub score: Option<ScoreResult>,
}

impl Record {
    /// Build a record with no metadata besides the text itself
    pub fn new(text: impl Into<String>, text_field: &str) -> Self {
        let text = text.into();
        let mut metadata = Fields::new();
        metadata.insert(text_field, FieldValue::Parsed(Value::String(text.clone())));
        Self {
            text,
            metadata,
            score: None,
        }
    }

    /// Parse a single JSONL line.
    ///
    /// Anything that is not a JSON object carrying a string under
    /// `text_field` is reported as [`DropReason::MalformedInput`].
    pub fn parse(line: &str, text_field: &str) -> Result<Self, DropReason> {
        let metadata: Fields = serde_json::from_str(line).map_err(|_| DropReason::MalformedInput)?;
        let text = match metadata.get(text_field) {
            Some(FieldValue::Raw(raw)) => {
                serde_json::from_str::<String>(raw.get()).map_err(|_| DropReason::MalformedInput)?
            }
            _ => return Err(DropReason::MalformedInput),
        };
        Ok(Self {
            text,
            metadata,
            score: None,
        })
    }

    /// Add a pipeline-owned field. Returns `false` when the key already
    /// existed and `overwrite` was not requested; the existing value is kept.
    pub fn annotate(&mut self, key: &str, value: Value, overwrite: bool) -> bool {
        if self.metadata.contains_key(key) && !overwrite {
            return false;
        }
        self.metadata.insert(key, FieldValue::Parsed(value));
        true
    }

    /// Serialize back to one JSONL line (without the trailing newline)
    pub fn into_json_line(mut self, text_field: &str) -> serde_json::Result<String> {
        self.metadata
            .insert(text_field, FieldValue::Parsed(Value::String(self.text)));
        serde_json::to_string(&self.metadata)
    }
}

/// Stable reason codes for dropped records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DropReason {
    MalformedInput,
    EmptyAfterNormalization,
    DuplicateLineCollapsedToEmpty,
    TooShort,
    TooLong,
    BadCharacterRatio,
    SpecialCharRatio,
    HtmlContent,
    CodeContent,
    LogContent,
    SentenceTooLong,
    ScriptRatio,
    MissingSentenceEnd,
    DuplicateDocument,
    EmptyAfterTokenization,
    ModelScoreError,
    LowQualityScore,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MalformedInput => "malformed-input",
            DropReason::EmptyAfterNormalization => "empty-after-normalization",
            DropReason::DuplicateLineCollapsedToEmpty => "duplicate-line-collapsed-to-empty",
            DropReason::TooShort => "too-short",
            DropReason::TooLong => "too-long",
            DropReason::BadCharacterRatio => "bad-character-ratio",
            DropReason::SpecialCharRatio => "special-char-ratio",
            DropReason::HtmlContent => "html-content",
            DropReason::CodeContent => "code-content",
            DropReason::LogContent => "log-content",
            DropReason::SentenceTooLong => "sentence-too-long",
            DropReason::ScriptRatio => "script-ratio",
            DropReason::MissingSentenceEnd => "missing-sentence-end",
            DropReason::DuplicateDocument => "duplicate-document",
            DropReason::EmptyAfterTokenization => "empty-after-tokenization",
            DropReason::ModelScoreError => "model-score-error",
            DropReason::LowQualityScore => "low-quality-score",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Perplexity of one document and the bucket it falls in
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    pub perplexity: f64,
    /// Scored events: tokens plus one end-of-sentence per scored line
    pub token_count: usize,
    pub bucket_index: usize,
    pub bucket: String,
    /// Score fields that collided with existing metadata keys and were left alone
    #[serde(skip)]
    pub annotation_conflicts: u32,
}

/// Result of running one phase over one record
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Kept(Record),
    Dropped {
        reason: DropReason,
        /// Present when the quality scorer computed a score before dropping
        score: Option<ScoreResult>,
    },
}

impl Outcome {
    pub fn dropped(reason: DropReason) -> Self {
        Outcome::Dropped {
            reason,
            score: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_keeps_metadata_and_text() {
        let record = Record::parse(r#"{"id": 7, "content": "本文です。"}"#, "content").unwrap();
        assert_eq!(record.text, "本文です。");
        assert_eq!(record.metadata.value("id"), Some(json!(7)));
    }

    #[test]
    fn parse_rejects_non_objects_and_missing_text() {
        assert_eq!(Record::parse("[1, 2]", "content"), Err(DropReason::MalformedInput));
        assert_eq!(Record::parse(r#"{"text": "x"}"#, "content"), Err(DropReason::MalformedInput));
        assert_eq!(Record::parse(r#"{"content": 3}"#, "content"), Err(DropReason::MalformedInput));
        assert_eq!(Record::parse("{not json", "content"), Err(DropReason::MalformedInput));
    }

    #[test]
    fn serialization_rewrites_text_in_place() {
        let mut record = Record::parse(r#"{"a": 1, "text": "old", "z": 2}"#, "text").unwrap();
        record.text = "new".to_string();
        let line = record.into_json_line("text").unwrap();
        assert_eq!(line, r#"{"a":1,"text":"new","z":2}"#);
    }

    #[test]
    fn numbers_and_nested_values_pass_through_verbatim() {
        let line = r#"{"text":"本文","big":123456789012345678901234567890,"f":1.10,"e":1e2,"s":"\u00e9"}"#;
        let mut record = Record::parse(line, "text").unwrap();
        record.text = "新しい本文".to_string();
        assert_eq!(
            record.into_json_line("text").unwrap(),
            r#"{"text":"新しい本文","big":123456789012345678901234567890,"f":1.10,"e":1e2,"s":"\u00e9"}"#
        );
    }

    #[test]
    fn duplicate_keys_keep_their_first_position() {
        let record = Record::parse(r#"{"a": 1, "text": "x", "a": 2}"#, "text").unwrap();
        assert_eq!(record.metadata.len(), 2);
        assert_eq!(record.into_json_line("text").unwrap(), r#"{"a":2,"text":"x"}"#);
    }

    #[test]
    fn annotate_respects_existing_keys() {
        let mut record = Record::parse(r#"{"text": "x", "perplexity": "mine"}"#, "text").unwrap();
        assert!(!record.annotate("perplexity", json!(1.5), false));
        assert_eq!(record.metadata.value("perplexity"), Some(json!("mine")));
        assert!(record.annotate("perplexity", json!(1.5), true));
        assert_eq!(record.metadata.value("perplexity"), Some(json!(1.5)));
    }

    #[test]
    fn reason_codes_match_serde_names() {
        let encoded = serde_json::to_value(DropReason::DuplicateLineCollapsedToEmpty).unwrap();
        assert_eq!(encoded, json!(DropReason::DuplicateLineCollapsedToEmpty.as_str()));
        assert_eq!(DropReason::LowQualityScore.to_string(), "low-quality-score");
    }
}
