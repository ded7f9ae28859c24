//! Excel writer for export operations
//!
//! Rows are written through a constant-memory worksheet: each row is flushed
//! to a temporary file as soon as a later row is started, so memory use does
//! not grow with the size of the result set. That mode requires rows to be
//! written in increasing order, which the stream writer guarantees.

use std::path::{Path, PathBuf};

use rust_xlsxwriter::{ColNum, Format, Workbook, Worksheet, XlsxError};
use tracing::{debug, warn};

use crate::error::{Result, SheetError};
use crate::export::value::{ColumnSet, Row, Value};

use super::{FIRST_DATA_ROW, HEADER_ROW, RowSink, expect_position};

const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";
const DATE_FORMAT: &str = "yyyy-mm-dd";

/// Largest number of characters Excel stores in one cell
pub const MAX_CELL_CHARS: usize = 32_767;

/// Integers beyond this magnitude do not survive conversion to an f64
const MAX_EXACT_INTEGER: i64 = 1 << 53;

/// Writer for the xlsx format
pub struct XlsxSink {
    /// Workbook holding the single export worksheet
    workbook: Workbook,
    /// Path the workbook is saved to on finalize
    path: PathBuf,
    header_format: Format,
    datetime_format: Format,
    date_format: Format,
    /// Next row index expected by `write_row`
    next_row: u32,
}

impl XlsxSink {
    /// Create a new xlsx writer with one empty worksheet
    ///
    /// Nothing touches the filesystem until [`RowSink::finalize`].
    ///
    /// # Arguments
    /// * `path` - Output file path
    /// * `sheet_name` - Worksheet name
    pub fn new(path: &Path, sheet_name: &str) -> Result<Self> {
        let mut workbook = Workbook::new();
        workbook
            .add_worksheet_with_constant_memory()
            .set_name(sheet_name)
            .map_err(|e| SheetError::Render(format!("Invalid sheet name '{sheet_name}': {e}")))?;

        debug!("Created xlsx writer for: {}", path.display());

        Ok(Self {
            workbook,
            path: path.to_path_buf(),
            header_format: Format::new().set_bold(),
            datetime_format: Format::new().set_num_format(DATETIME_FORMAT),
            date_format: Format::new().set_num_format(DATE_FORMAT),
            next_row: FIRST_DATA_ROW,
        })
    }

    fn column(idx: usize) -> Result<ColNum> {
        ColNum::try_from(idx)
            .map_err(|_| SheetError::Render(format!("column index {idx} exceeds sheet limits")))
    }
}

fn worksheet(workbook: &mut Workbook) -> Result<&mut Worksheet> {
    workbook
        .worksheet_from_index(0)
        .map_err(|e| SheetError::Render(e.to_string()))
}

fn write_cell(
    sheet: &mut Worksheet,
    row: u32,
    col: ColNum,
    value: &Value,
    datetime_format: &Format,
    date_format: &Format,
) -> Result<()> {
    let written = match value {
        Value::String(s) => sheet.write_string(row, col, fit_cell(s, row, col)),
        Value::Integer(n) if n.unsigned_abs() <= MAX_EXACT_INTEGER as u64 => {
            sheet.write_number(row, col, *n as f64)
        }
        Value::Integer(n) => sheet.write_string(row, col, n.to_string()),
        Value::Float(n) if n.is_finite() => sheet.write_number(row, col, *n),
        Value::Float(n) => sheet.write_string(row, col, n.to_string()),
        Value::Boolean(b) => sheet.write_boolean(row, col, *b),
        Value::Timestamp(ts) => sheet.write_datetime_with_format(row, col, ts, datetime_format),
        Value::Date(d) => sheet.write_datetime_with_format(row, col, d, date_format),
        Value::Null => return Ok(()),
    };

    written.map(|_| ()).map_err(|e| render_error(row, col, e))
}

/// Cut text down to the cell limit on a character boundary
fn fit_cell(text: &str, row: u32, col: ColNum) -> &str {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((cut, _)) => {
            warn!(
                "cell ({}, {}): truncated {} characters to {}",
                row + 1,
                col + 1,
                text.chars().count(),
                MAX_CELL_CHARS
            );
            &text[..cut]
        }
        None => text,
    }
}

fn render_error(row: u32, col: ColNum, err: XlsxError) -> SheetError {
    SheetError::Render(format!("cell ({}, {}): {err}", row + 1, col + 1))
}

impl RowSink for XlsxSink {
    fn write_header(&mut self, columns: &ColumnSet) -> Result<()> {
        let sheet = worksheet(&mut self.workbook)?;
        for (idx, name) in columns.iter().enumerate() {
            let col = Self::column(idx)?;
            sheet
                .write_string_with_format(
                    HEADER_ROW,
                    col,
                    fit_cell(name, HEADER_ROW, col),
                    &self.header_format,
                )
                .map_err(|e| render_error(HEADER_ROW, col, e))?;
        }
        debug!("Wrote xlsx header: {} columns", columns.len());
        Ok(())
    }

    fn write_row(&mut self, position: u32, row: &Row) -> Result<()> {
        expect_position(self.next_row, position)?;
        let sheet = worksheet(&mut self.workbook)?;
        for (idx, value) in row.iter().enumerate() {
            let col = Self::column(idx)?;
            write_cell(
                sheet,
                position,
                col,
                value,
                &self.datetime_format,
                &self.date_format,
            )?;
        }
        self.next_row = position + 1;
        Ok(())
    }

    fn finalize(mut self: Box<Self>) -> Result<u64> {
        let path = self.path.clone();
        self.workbook
            .save(&path)
            .map_err(|e| SheetError::Persist(format!("{}: {e}", path.display())))?;

        let size = std::fs::metadata(&path)
            .map_err(|e| SheetError::Persist(format!("Failed to get file metadata: {e}")))?
            .len();
        debug!(
            "Saved xlsx file: {} ({} data rows, {} bytes)",
            path.display(),
            self.next_row - FIRST_DATA_ROW,
            size
        );
        Ok(size)
    }
}
