use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::app::ports::RecordSink;
use crate::constants::JSONL_EXTENSION;

fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }
    info!("Creating output file: {}", path.display());
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)
        .with_context(|| format!("opening output file {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_record_line(writer: &mut BufWriter<File>, line: &str) -> Result<()> {
    let mut buf = String::with_capacity(line.len() + 1);
    buf.push_str(line);
    buf.push('\n');
    writer.write_all(buf.as_bytes())?;
    Ok(())
}

/// Writes every emitted record to one JSONL file
pub struct JsonlFileSink {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl JsonlFileSink {
    pub fn create(path: &Path) -> Result<Self> {
        Ok(Self {
            writer: create_writer(path)?,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for JsonlFileSink {
    fn write_line(&mut self, line: &str, _bucket: Option<&str>) -> Result<()> {
        write_record_line(&mut self.writer, line)
            .with_context(|| format!("writing to {}", self.path.display()))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing {}", self.path.display()))
    }
}

/// Writes each record to `<stem>.<bucket>.jsonl` beside the configured
/// output path. Files are created on first use.
pub struct BucketedJsonlSink {
    base: PathBuf,
    writers: BTreeMap<String, BufWriter<File>>,
}

impl BucketedJsonlSink {
    pub fn new(base: &Path) -> Self {
        Self {
            base: base.to_path_buf(),
            writers: BTreeMap::new(),
        }
    }

    /// Path used for a given bucket label
    pub fn bucket_path(base: &Path, bucket: &str) -> PathBuf {
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        base.with_file_name(format!("{}.{}.{}", stem, bucket, JSONL_EXTENSION))
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.writers
            .keys()
            .map(|bucket| Self::bucket_path(&self.base, bucket))
            .collect()
    }
}

impl RecordSink for BucketedJsonlSink {
    fn write_line(&mut self, line: &str, bucket: Option<&str>) -> Result<()> {
        let bucket = bucket.context("bucketed output requires a scored record")?;
        if !self.writers.contains_key(bucket) {
            let writer = create_writer(&Self::bucket_path(&self.base, bucket))?;
            self.writers.insert(bucket.to_string(), writer);
        }
        let writer = self
            .writers
            .get_mut(bucket)
            .context("bucket writer vanished")?;
        write_record_line(writer, line)
    }

    fn flush(&mut self) -> Result<()> {
        for writer in self.writers.values_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn single_sink_writes_complete_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        let mut sink = JsonlFileSink::create(&path).unwrap();
        sink.write_line(r#"{"text":"一"}"#, None).unwrap();
        sink.write_line(r#"{"text":"二"}"#, Some("high")).unwrap();
        sink.flush().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "{\"text\":\"一\"}\n{\"text\":\"二\"}\n");
    }

    #[test]
    fn bucketed_sink_splits_by_label() {
        let dir = tempdir().unwrap();
        let base = dir.path().join("corpus.jsonl");
        let mut sink = BucketedJsonlSink::new(&base);
        sink.write_line("{}", Some("high")).unwrap();
        sink.write_line("{}", Some("low")).unwrap();
        sink.write_line("{}", Some("high")).unwrap();
        sink.flush().unwrap();

        let high = std::fs::read_to_string(dir.path().join("corpus.high.jsonl")).unwrap();
        let low = std::fs::read_to_string(dir.path().join("corpus.low.jsonl")).unwrap();
        assert_eq!(high.lines().count(), 2);
        assert_eq!(low.lines().count(), 1);
        assert_eq!(sink.paths().len(), 2);
        assert!(sink.write_line("{}", None).is_err());
    }
}
