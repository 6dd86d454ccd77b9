//! Persistence of fetched records for the `STORE` fetch type.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use uuid::Uuid;

use crate::error::ApiError;
use crate::types::DocumentRecord;

/// Writes a batch of records somewhere and returns where they went.
pub trait RecordStore {
    fn store(&self, records: &[DocumentRecord]) -> Result<String, ApiError>;
}

/// Stores each batch as a new newline-delimited JSON file in `dir`, one
/// row per line.
#[derive(Debug, Clone)]
pub struct JsonLinesStore {
    dir: PathBuf,
}

impl JsonLinesStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RecordStore for JsonLinesStore {
    fn store(&self, records: &[DocumentRecord]) -> Result<String, ApiError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.jsonl", Uuid::new_v4()));

        let mut out = BufWriter::new(File::create(&path)?);
        for record in records {
            serde_json::to_writer(&mut out, &record.to_row()).map_err(|e| ApiError::Serialization(e.to_string()))?;
            out.write_all(b"\n")?;
        }
        out.flush()?;

        Ok(path.display().to_string())
    }
}
