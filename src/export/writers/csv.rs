//! CSV writer for export operations
//!
//! This module writes rows as comma-separated values with a header row taken
//! from the result set's column names, quoting values where necessary.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, SheetError};
use crate::export::value::{ColumnSet, Row};

use super::{FIRST_DATA_ROW, RowSink, expect_position};

/// Buffer size for the output file
const BUFFER_CAPACITY: usize = 8 * 1024 * 1024;

/// Writer for CSV format
pub struct CsvSink {
    /// Buffered file writer
    writer: BufWriter<File>,
    /// Path to the output file
    path: PathBuf,
    /// Next row index expected by `write_row`
    next_row: u32,
    /// Reused line buffer
    line: String,
}

impl CsvSink {
    /// Create a new CSV writer
    ///
    /// # Arguments
    /// * `path` - Output file path
    ///
    /// # Returns
    /// * `Result<Self>` - New writer instance or error
    pub fn new(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .map_err(|e| SheetError::Persist(format!("Failed to create file: {e}")))?;

        debug!("Created CSV writer for: {}", path.display());

        Ok(Self {
            writer: BufWriter::with_capacity(BUFFER_CAPACITY, file),
            path: path.to_path_buf(),
            next_row: FIRST_DATA_ROW,
            line: String::new(),
        })
    }

    fn write_line<I>(&mut self, fields: I) -> Result<()>
    where
        I: IntoIterator<Item = String>,
    {
        self.line.clear();
        for (idx, field) in fields.into_iter().enumerate() {
            if idx > 0 {
                self.line.push(',');
            }
            push_escaped(&mut self.line, &field);
        }
        self.line.push('\n');

        self.writer
            .write_all(self.line.as_bytes())
            .map_err(|e| SheetError::Render(format!("Failed to write row: {e}")))
    }
}

/// Append a CSV value, quoting it if it contains a comma, quote, or line break
fn push_escaped(out: &mut String, value: &str) {
    if value.contains([',', '"', '\n', '\r']) {
        out.push('"');
        out.push_str(&value.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(value);
    }
}

impl RowSink for CsvSink {
    fn write_header(&mut self, columns: &ColumnSet) -> Result<()> {
        self.write_line(columns.iter().map(str::to_string))?;
        debug!("Wrote CSV headers: {} fields", columns.len());
        Ok(())
    }

    fn write_row(&mut self, position: u32, row: &Row) -> Result<()> {
        expect_position(self.next_row, position)?;
        self.write_line(row.iter().map(ToString::to_string))?;
        self.next_row = position + 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<u64> {
        self.writer
            .flush()
            .map_err(|e| SheetError::Persist(format!("Failed to flush file: {e}")))?;

        let size = std::fs::metadata(&self.path)
            .map_err(|e| SheetError::Persist(format!("Failed to get file metadata: {e}")))?
            .len();

        debug!(
            "Finalized CSV file: {} ({} rows)",
            self.path.display(),
            self.next_row - FIRST_DATA_ROW
        );
        Ok(size)
    }
}
