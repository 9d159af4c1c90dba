use calamine::{Data, Range, Reader, Xls, XlsError, Xlsx, XlsxError};
use std::fmt;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use thiserror::Error;

use crate::cell::CellValue;
use crate::spreadsheet::{Sheet, Workbook};

/// Extensions accepted by the upload filter, with their leading dot
pub const ACCEPTED_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// Binary workbook formats the decoder understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpreadsheetFormat {
    /// Office Open XML workbook (zip container)
    Xlsx,
    /// Legacy BIFF workbook (compound document)
    Xls,
}

impl SpreadsheetFormat {
    /// Resolve a format from a bare extension, case-insensitively
    ///
    /// `csv` deliberately resolves to `None`: text files do not go through the
    /// binary workbook decoder.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "xlsx" => Some(SpreadsheetFormat::Xlsx),
            "xls" => Some(SpreadsheetFormat::Xls),
            _ => None,
        }
    }

    /// Resolve a format from a file name such as `report.XLSX`
    pub fn from_file_name(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Xlsx => ".xlsx",
            SpreadsheetFormat::Xls => ".xls",
        }
    }
}

impl fmt::Display for SpreadsheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to read `.xlsx`: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("failed to read `.xls`: {0}")]
    Xls(#[from] XlsError),

    #[error("unsupported file extension: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decode raw spreadsheet bytes into a workbook
///
/// The reader is picked strictly from the declared format; bytes that are not a
/// legal container for that format (corrupted archive, wrong magic bytes) fail
/// with a `DecodeError`. A well-formed workbook with no cells is not an error here:
/// it decodes to sheets with zero rows, and deciding what that means is left to
/// the normalizer.
///
/// Every sheet is decoded in workbook order. Each grid starts at the sheet's first
/// used cell, and every row is trimmed after its last populated cell.
///
/// # Arguments
/// * `bytes` - The uploaded file content
/// * `format` - The format claimed by the file's extension
///
/// # Returns
/// * `Result<Workbook, DecodeError>` - The decoded workbook or the parse failure
///
/// # Examples
/// ```
/// use excel_analytics::loader::{decode, SpreadsheetFormat};
///
/// let err = decode(b"definitely not a zip archive", SpreadsheetFormat::Xlsx);
/// assert!(err.is_err());
/// ```
pub fn decode(bytes: &[u8], format: SpreadsheetFormat) -> Result<Workbook, DecodeError> {
    let cursor = Cursor::new(bytes);
    let workbook = match format {
        SpreadsheetFormat::Xlsx => read_sheets(Xlsx::new(cursor)?)?,
        SpreadsheetFormat::Xls => read_sheets(Xls::new(cursor)?)?,
    };
    log::debug!(
        "decoded {} workbook with sheets {:?}",
        format,
        workbook.sheet_names()
    );
    Ok(workbook)
}

fn read_sheets<RS, R>(mut reader: R) -> Result<Workbook, DecodeError>
where
    RS: Read + Seek,
    R: Reader<RS>,
    DecodeError: From<R::Error>,
{
    let mut sheets = Vec::new();
    for name in reader.sheet_names() {
        let range = reader.worksheet_range(&name)?;
        sheets.push(range_to_sheet(name, &range));
    }
    Ok(Workbook::new(sheets))
}

fn range_to_sheet(name: String, range: &Range<Data>) -> Sheet {
    let rows: Vec<Vec<CellValue>> = range
        .rows()
        .map(|row| {
            let mut cells: Vec<CellValue> = row.iter().map(convert_cell).collect();
            while cells.last().is_some_and(CellValue::is_empty) {
                cells.pop();
            }
            cells
        })
        .collect();

    if let Some((row, col)) = range.start() {
        log::debug!(
            "sheet '{}' starts at {} with {} row(s)",
            name,
            Sheet::cell_name(row as usize, col as usize),
            rows.len()
        );
    }
    Sheet::new(name, rows)
}

/// Map a calamine cell onto the four value shapes the pipeline knows
///
/// Dates stay as their Excel serial number. Error cells (`#DIV/0!` and friends)
/// carry no usable value and decode as empty.
fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) => CellValue::Empty,
    }
}

/// Load a workbook from disk, picking the decoder from the file extension
///
/// # Examples
/// ```no_run
/// use excel_analytics::loader::load_path;
///
/// match load_path("data.xlsx") {
///     Ok(workbook) => println!("Loaded {} sheet(s)", workbook.sheets.len()),
///     Err(e) => eprintln!("Error loading file: {}", e),
/// }
/// ```
pub fn load_path(filepath: impl AsRef<Path>) -> Result<Workbook, DecodeError> {
    let path = filepath.as_ref();
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    let format = SpreadsheetFormat::from_extension(ext)
        .ok_or_else(|| DecodeError::Unsupported(ext.to_string()))?;
    let bytes = std::fs::read(path)?;
    decode(&bytes, format)
}
