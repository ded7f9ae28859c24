//! Output document writers
//!
//! This module provides a unified interface for rendering rows into
//! different file formats (xlsx, CSV). A sink is driven from a single thread
//! at a time: the coordinator writes the header, then hands the sink to the
//! stream writer for the data rows, and finally takes it back to finalize.

use std::path::Path;

use crate::config::ExportFormat;
use crate::error::{Result, SheetError};

use super::value::{ColumnSet, Row};

pub mod csv;
pub mod xlsx;

pub use csv::CsvSink;
pub use xlsx::XlsxSink;

/// Document row index of the header (0-based)
pub const HEADER_ROW: u32 = 0;

/// Document row index of the first data row (0-based)
pub const FIRST_DATA_ROW: u32 = HEADER_ROW + 1;

/// Trait for rendering rows into an output document
pub trait RowSink: Send {
    /// Write the header row at [`HEADER_ROW`]
    ///
    /// # Arguments
    /// * `columns` - Column names in source order
    fn write_header(&mut self, columns: &ColumnSet) -> Result<()>;

    /// Write one data row at the given 0-based document row index
    ///
    /// Rows arrive with strictly increasing positions starting at
    /// [`FIRST_DATA_ROW`]; failures are reported as [`SheetError::Render`].
    ///
    /// # Arguments
    /// * `position` - Document row index
    /// * `row` - Values to render
    fn write_row(&mut self, position: u32, row: &Row) -> Result<()>;

    /// Flush and persist the document
    ///
    /// # Returns
    /// * `Result<u64>` - Size of the persisted file in bytes
    fn finalize(self: Box<Self>) -> Result<u64>;
}

/// Open the sink for the given format
///
/// # Arguments
/// * `format` - Output format
/// * `path` - Output file path
/// * `sheet_name` - Worksheet name (ignored for CSV)
pub fn open_sink(format: ExportFormat, path: &Path, sheet_name: &str) -> Result<Box<dyn RowSink>> {
    validate_path(path)?;
    Ok(match format {
        ExportFormat::Xlsx => Box::new(XlsxSink::new(path, sheet_name)?),
        ExportFormat::Csv => Box::new(CsvSink::new(path)?),
    })
}

/// Check that the output directory exists
///
/// # Arguments
/// * `path` - File path to validate
///
/// # Returns
/// * `Result<()>` - Success or error
pub(crate) fn validate_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(SheetError::Persist(format!(
                "Directory does not exist: {}",
                parent.display()
            )));
        }
    }

    Ok(())
}

/// Reject a row position that would leave a gap or overwrite a row
pub(crate) fn expect_position(expected: u32, actual: u32) -> Result<()> {
    if expected != actual {
        return Err(SheetError::Render(format!(
            "row position {actual} out of sequence (expected {expected})"
        )));
    }
    Ok(())
}
