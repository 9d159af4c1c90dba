use crate::cell::CellValue;

/// A decoded spreadsheet file
///
/// Sheets are kept in workbook order. Only the first sheet feeds the normalizer;
/// the rest are decoded and carried along but never read downstream.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

/// One worksheet as a row-major grid
///
/// Rows may be ragged: each row ends at its last populated cell. By convention
/// row 0 is the header row, but nothing here enforces that.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl Workbook {
    pub fn new(sheets: Vec<Sheet>) -> Self {
        Workbook { sheets }
    }

    /// The sheet the rest of the pipeline consumes
    pub fn first_sheet(&self) -> Option<&Sheet> {
        self.sheets.first()
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }
}

impl Sheet {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Sheet {
            name: name.into(),
            rows,
        }
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Width of the widest row
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Spreadsheet-style name of a zero-based position, e.g. `(0, 27)` is `AB1`
    pub fn cell_name(row: usize, col: usize) -> String {
        format!("{}{}", col_to_letter(col + 1), row + 1)
    }
}

/// Convert a 1-based column number to its letter form (1 = A, 27 = AA)
pub fn col_to_letter(col: usize) -> String {
    let mut col = col;
    let mut result = String::new();
    while col > 0 {
        col -= 1;
        result.push(((col % 26) as u8 + b'A') as char);
        col /= 26;
    }
    result.chars().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters() {
        assert_eq!(col_to_letter(1), "A");
        assert_eq!(col_to_letter(26), "Z");
        assert_eq!(col_to_letter(27), "AA");
        assert_eq!(col_to_letter(52), "AZ");
        assert_eq!(Sheet::cell_name(0, 27), "AB1");
    }

    #[test]
    fn ragged_dimensions() {
        let sheet = Sheet::new(
            "Data",
            vec![
                vec![CellValue::text("a"), CellValue::text("b"), CellValue::text("c")],
                vec![CellValue::Number(1.0)],
                vec![],
            ],
        );
        assert_eq!(sheet.height(), 3);
        assert_eq!(sheet.width(), 3);
        assert!(!sheet.is_empty());
    }

    #[test]
    fn first_sheet_is_the_consumed_one() {
        let workbook = Workbook::new(vec![Sheet::new("One", vec![]), Sheet::new("Two", vec![])]);
        assert_eq!(workbook.first_sheet().map(|s| s.name.as_str()), Some("One"));
        assert_eq!(workbook.sheet_names(), vec!["One", "Two"]);
    }
}
