use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use super::NgramModel;
use crate::error::{CleanerError, Result};

/// Leading bytes of a compiled model; the last byte is the format version.
pub const MAGIC: [u8; 8] = *b"JCLNGRM\x01";

/// Write `model` atomically: the snapshot goes to a temp file beside `path`
/// and is renamed into place once complete.
pub fn save(model: &NgramModel, path: &Path) -> Result<()> {
    let parent_dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent_dir)?;

    let temp_file = NamedTempFile::new_in(parent_dir)?;
    {
        let mut writer = BufWriter::new(temp_file.as_file());
        writer.write_all(&MAGIC)?;
        bincode::serialize_into(&mut writer, model)
            .map_err(|e| CleanerError::model_load(path, format!("serialization failed: {}", e)))?;
        writer.flush()?;
    }
    temp_file
        .persist(path)
        .map_err(|e| CleanerError::Io(e.error))?;
    Ok(())
}

pub fn load(path: &Path) -> Result<NgramModel> {
    let file = File::open(path).map_err(|e| CleanerError::model_load(path, e.to_string()))?;
    let mut reader = BufReader::new(file);
    let mut magic = [0u8; MAGIC.len()];
    reader
        .read_exact(&mut magic)
        .map_err(|e| CleanerError::model_load(path, e.to_string()))?;
    if magic != MAGIC {
        return Err(CleanerError::model_load(path, "not a compiled model (bad header)"));
    }
    let decoded: NgramModel = bincode::deserialize_from(reader)
        .map_err(|e| CleanerError::model_load(path, format!("corrupt model: {}", e)))?;
    NgramModel::from_tables(decoded.vocab, decoded.tables)
        .map_err(|message| CleanerError::model_load(path, format!("inconsistent model: {}", message)))
}
