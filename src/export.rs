//! Spreadsheet export: JSON record store → single-sheet `.xlsx` workbook.
//!
//! The exporter reads the store as plain JSON rather than as
//! [`crate::output::ExtractionRecord`]s, so it also handles hand-edited files
//! with extra or missing keys. The header row is the union of all object keys
//! in first-seen order (this relies on `serde_json`'s `preserve_order`).

use crate::error::Shot2SheetError;
use crate::output::value_to_string;
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

/// Name of the only worksheet.
pub const SHEET_NAME: &str = "Extracted Data";

/// Column width cap, in characters.
const MAX_COLUMN_WIDTH: usize = 50;

/// What an export wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportStats {
    /// Data rows, excluding the header.
    pub rows: usize,
    pub columns: usize,
}

/// Convert the JSON store at `input_json` into a workbook at `output_xlsx`.
///
/// Every object in the array becomes one row; array elements that are not
/// objects are skipped. Cells hold the string form of each value (strings
/// verbatim, other values as JSON text, missing keys empty). Each column is
/// as wide as its longest cell plus two, capped at 50.
///
/// # Errors
/// - [`Shot2SheetError::FileNotFound`] — `input_json` does not exist
/// - [`Shot2SheetError::InvalidStore`] — unreadable or not JSON
/// - [`Shot2SheetError::EmptyStore`] — an empty array, or not an array
/// - [`Shot2SheetError::NoColumns`] — no object carries any key
/// - [`Shot2SheetError::WorkbookWriteFailed`] — the workbook could not be saved
pub fn export_to_xlsx(
    input_json: impl AsRef<Path>,
    output_xlsx: impl AsRef<Path>,
) -> Result<ExportStats, Shot2SheetError> {
    let input = input_json.as_ref();
    let output = output_xlsx.as_ref();

    let rows = load_rows(input)?;
    let headers = collect_headers(&rows);
    if headers.is_empty() {
        return Err(Shot2SheetError::NoColumns {
            path: input.to_path_buf(),
        });
    }
    debug!("Exporting {} rows × {} columns", rows.len(), headers.len());

    write_workbook(output, &headers, &rows).map_err(|e| Shot2SheetError::WorkbookWriteFailed {
        path: output.to_path_buf(),
        detail: e.to_string(),
    })?;

    info!(
        "Successfully converted {} to {}",
        input.display(),
        output.display()
    );
    Ok(ExportStats {
        rows: rows.len(),
        columns: headers.len(),
    })
}

fn load_rows(path: &Path) -> Result<Vec<Map<String, Value>>, Shot2SheetError> {
    if !path.exists() {
        return Err(Shot2SheetError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let bytes = std::fs::read(path).map_err(|e| Shot2SheetError::InvalidStore {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let value: Value = serde_json::from_slice(&bytes).map_err(|e| Shot2SheetError::InvalidStore {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    match value {
        Value::Array(items) if !items.is_empty() => Ok(items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect()),
        _ => Err(Shot2SheetError::EmptyStore {
            path: path.to_path_buf(),
        }),
    }
}

fn collect_headers(rows: &[Map<String, Value>]) -> Vec<String> {
    let mut headers: Vec<String> = Vec::new();
    for row in rows {
        for key in row.keys() {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }
    headers
}

fn write_workbook(
    path: &Path,
    headers: &[String],
    rows: &[Map<String, Value>],
) -> Result<(), XlsxError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, column(col)?, header)?;
    }

    for (r, row) in rows.iter().enumerate() {
        let row_num = u32::try_from(r + 1).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (col, header) in headers.iter().enumerate() {
            let cell = row.get(header).map(value_to_string).unwrap_or_default();
            widths[col] = widths[col].max(cell.chars().count());
            sheet.write_string(row_num, column(col)?, &cell)?;
        }
    }

    for (col, width) in widths.iter().enumerate() {
        sheet.set_column_width(column(col)?, column_width(*width) as f64)?;
    }

    workbook.save(path)
}

fn column(index: usize) -> Result<u16, XlsxError> {
    u16::try_from(index).map_err(|_| XlsxError::RowColumnLimitError)
}

fn column_width(longest: usize) -> usize {
    (longest + 2).min(MAX_COLUMN_WIDTH)
}
