use anyhow::Result;

/// Turns normalized text into the token strings the language model was
/// trained on. Must be deterministic.
pub trait Tokenize: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<String>>;
}

/// Destination for emitted records. Each call receives one complete JSONL
/// line; implementations must never leave half a line behind.
pub trait RecordSink {
    /// `bucket` is the quality bucket label when the record was scored
    fn write_line(&mut self, line: &str, bucket: Option<&str>) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}
