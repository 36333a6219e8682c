// 📊 Tabular backend - a CSV sheet with a single named column of encoded entries
//
// This is the shape the list takes in a spreadsheet: a header row naming the column
// ("items" by default) and one encoded entry per row. Empty cells are skipped.
// The CSV helpers are shared with the remote sheet backend.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::{Backend, StoreError};

pub const DEFAULT_COLUMN: &str = "items";

/// Extract the non-empty cells of `column` from CSV bytes
pub fn parse_column(data: &[u8], column: &str) -> Result<Vec<String>, csv::Error> {
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(data);

    let position = reader
        .headers()?
        .iter()
        .position(|header| header.trim() == column);

    let Some(position) = position else {
        return Ok(Vec::new());
    };

    let mut cells = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(cell) = record.get(position) {
            if !cell.trim().is_empty() {
                cells.push(cell.to_string());
            }
        }
    }

    Ok(cells)
}

/// Render `lines` as a single-column CSV document with a header
pub fn render_column(column: &str, lines: &[String]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([column])?;
    for line in lines {
        writer.write_record([line.as_str()])?;
    }
    writer.flush()?;

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

#[derive(Debug, Clone)]
pub struct TableBackend {
    path: PathBuf,
    column: String,
}

impl TableBackend {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_column(path, DEFAULT_COLUMN)
    }

    pub fn with_column<P: AsRef<Path>>(path: P, column: &str) -> Self {
        TableBackend {
            path: path.as_ref().to_path_buf(),
            column: column.to_string(),
        }
    }
}

#[async_trait]
impl Backend for TableBackend {
    fn describe(&self) -> String {
        format!("sheet file {} (column '{}')", self.path.display(), self.column)
    }

    async fn read(&self) -> Result<Option<Vec<String>>, StoreError> {
        let data = match tokio::fs::read(&self.path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StoreError::Unavailable {
                    backend: self.describe(),
                    reason: e.to_string(),
                })
            }
        };

        parse_column(&data, &self.column)
            .map(Some)
            .map_err(|e| StoreError::Unavailable {
                backend: self.describe(),
                reason: e.to_string(),
            })
    }

    async fn write(&self, lines: &[String]) -> Result<(), StoreError> {
        let data = render_column(&self.column, lines).map_err(|e| StoreError::WriteRejected {
            backend: self.describe(),
            reason: e.to_string(),
        })?;

        tokio::fs::write(&self.path, data)
            .await
            .map_err(|e| StoreError::WriteRejected {
                backend: self.describe(),
                reason: e.to_string(),
            })
    }
}

// ============================================================================
// TESTS
// ============================================================================
