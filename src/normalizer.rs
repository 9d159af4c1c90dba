//! Turns the first sheet of a decoded workbook into the header-keyed record
//! payload every client consumes.

use serde::{Deserialize, Serialize};
use indexmap::IndexMap;

use crate::cell::CellValue;
use crate::error::{Error, Result};
use crate::spreadsheet::Workbook;

/// One retained data row
///
/// `row` counts retained rows only, starting at 1. `values` holds exactly one
/// entry per distinct column name, in header order; cells missing from the source
/// row are `""`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub row: usize,
    pub values: IndexMap<String, CellValue>,
}

/// The `{columns, data, rowCount}` contract between the server and its clients
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPayload {
    pub columns: Vec<String>,
    #[serde(rename = "data")]
    pub records: Vec<Record>,
    pub row_count: usize,
}

impl NormalizedPayload {
    /// Every value recorded for `column`, in row order
    pub fn column_values<'a>(&'a self, column: &'a str) -> impl Iterator<Item = &'a CellValue> + 'a {
        self.records
            .iter()
            .filter_map(move |record| record.values.get(column))
    }
}

/// Normalize the first sheet of `workbook`
///
/// Row 0 becomes the column list, verbatim and without deduplication. Each later
/// row becomes a [`Record`] unless it has no cells or only empty ones; dropped rows
/// do not consume a row number. When two headers share a name, the later column's
/// value is the one kept.
///
/// Fails with [`Error::EmptyFile`] when there is no sheet, the sheet has no rows,
/// or no data row survives.
pub fn normalize(workbook: &Workbook) -> Result<NormalizedPayload> {
    let sheet = workbook.first_sheet().ok_or(Error::EmptyFile)?;
    let (header, body) = sheet.rows.split_first().ok_or(Error::EmptyFile)?;

    let columns: Vec<String> = header.iter().map(CellValue::to_header).collect();

    let records: Vec<Record> = body
        .iter()
        .filter(|row| !is_blank_row(row))
        .enumerate()
        .map(|(index, row)| Record {
            row: index + 1,
            values: zip_row(&columns, row),
        })
        .collect();

    if records.is_empty() {
        return Err(Error::EmptyFile);
    }

    log::debug!(
        "normalized sheet '{}': {} column(s), {} of {} data row(s) kept",
        sheet.name,
        columns.len(),
        records.len(),
        body.len()
    );

    Ok(NormalizedPayload {
        row_count: records.len(),
        columns,
        records,
    })
}

fn is_blank_row(row: &[CellValue]) -> bool {
    row.iter().all(CellValue::is_empty)
}

fn zip_row(columns: &[String], row: &[CellValue]) -> IndexMap<String, CellValue> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| {
            let value = match row.get(i) {
                Some(cell) if !matches!(cell, CellValue::Empty) => cell.clone(),
                _ => CellValue::Text(String::new()),
            };
            (column.clone(), value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spreadsheet::Sheet;

    fn workbook(rows: Vec<Vec<CellValue>>) -> Workbook {
        Workbook::new(vec![Sheet::new("Sheet1", rows)])
    }

    #[test]
    fn duplicate_headers_keep_the_last_value() {
        let payload = normalize(&workbook(vec![
            vec!["id".into(), "id".into()],
            vec![1.0.into(), 2.0.into()],
        ]))
        .unwrap();
        assert_eq!(payload.columns, vec!["id", "id"]);
        assert_eq!(payload.records[0].values.len(), 1);
        assert_eq!(payload.records[0].values["id"], CellValue::Number(2.0));
    }

    #[test]
    fn empty_cells_inside_a_row_become_empty_text() {
        let payload = normalize(&workbook(vec![
            vec!["a".into(), "b".into(), "c".into()],
            vec![CellValue::Empty, 5.0.into()],
        ]))
        .unwrap();
        let values = &payload.records[0].values;
        assert_eq!(values["a"], CellValue::text(""));
        assert_eq!(values["b"], CellValue::Number(5.0));
        assert_eq!(values["c"], CellValue::text(""));
    }

    #[test]
    fn falsy_values_are_not_blanked() {
        let payload = normalize(&workbook(vec![
            vec!["n".into(), "flag".into()],
            vec![0.0.into(), false.into()],
        ]))
        .unwrap();
        assert_eq!(payload.records[0].values["n"], CellValue::Number(0.0));
        assert_eq!(payload.records[0].values["flag"], CellValue::Bool(false));
    }

    #[test]
    fn header_cells_are_coerced_to_strings() {
        let payload = normalize(&workbook(vec![
            vec![2024.0.into(), CellValue::Empty, true.into()],
            vec!["x".into()],
        ]))
        .unwrap();
        assert_eq!(payload.columns, vec!["2024", "", "true"]);
    }

    #[test]
    fn no_sheets_or_no_rows_is_empty() {
        assert!(matches!(normalize(&Workbook::default()), Err(Error::EmptyFile)));
        assert!(matches!(normalize(&workbook(vec![])), Err(Error::EmptyFile)));
    }

    #[test]
    fn only_blank_data_rows_is_empty() {
        let result = normalize(&workbook(vec![
            vec!["Name".into()],
            vec![],
            vec![CellValue::Empty, CellValue::text("")],
        ]));
        assert!(matches!(result, Err(Error::EmptyFile)));
    }

    #[test]
    fn only_the_first_sheet_is_read() {
        let book = Workbook::new(vec![
            Sheet::new("First", vec![vec!["a".into()], vec!["1".into()]]),
            Sheet::new("Second", vec![vec!["b".into()], vec!["2".into()], vec!["3".into()]]),
        ]);
        let payload = normalize(&book).unwrap();
        assert_eq!(payload.columns, vec!["a"]);
        assert_eq!(payload.row_count, 1);
    }

    #[test]
    fn values_follow_header_order() {
        let payload = normalize(&workbook(vec![
            vec!["Zeta".into(), "Alpha".into(), "Zeta".into(), "Mid".into()],
            vec![1.0.into(), 2.0.into(), 3.0.into(), 4.0.into()],
        ]))
        .unwrap();
        let keys: Vec<&str> = payload.records[0].values.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Zeta", "Alpha", "Mid"]);
        assert_eq!(payload.records[0].values["Zeta"], CellValue::Number(3.0));

        let json = serde_json::to_string(&payload.records[0]).unwrap();
        assert_eq!(json, r#"{"row":1,"values":{"Zeta":3,"Alpha":2,"Mid":4}}"#);
    }

    #[test]
    fn json_shape() {
        let payload = normalize(&workbook(vec![
            vec!["Name".into(), "Age".into()],
            vec!["Alice".into(), 30.0.into()],
        ]))
        .unwrap();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "columns": ["Name", "Age"],
                "data": [{ "row": 1, "values": { "Name": "Alice", "Age": 30 } }],
                "rowCount": 1
            })
        );
    }
}
