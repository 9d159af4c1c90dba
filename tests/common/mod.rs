#![allow(dead_code)]

use excel_analytics::CellValue;
use excel_analytics::normalizer::{NormalizedPayload, Record};
use rust_xlsxwriter::Workbook;

/// Builds an `.xlsx` file in memory, one `(name, rows)` pair per sheet.
///
/// `CellValue::Empty` cells are left unwritten, so an empty row is a gap in the sheet.
pub fn xlsx(sheets: &[(&str, Vec<Vec<CellValue>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).expect("sheet name");
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                match cell {
                    CellValue::Text(s) => {
                        worksheet.write_string(r, c, s).expect("write string");
                    }
                    CellValue::Number(n) => {
                        worksheet.write_number(r, c, *n).expect("write number");
                    }
                    CellValue::Bool(b) => {
                        worksheet.write_boolean(r, c, *b).expect("write boolean");
                    }
                    CellValue::Empty => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("save workbook")
}

/// Single-sheet shorthand for [`xlsx`].
pub fn single_sheet(rows: Vec<Vec<CellValue>>) -> Vec<u8> {
    xlsx(&[("Sheet1", rows)])
}

/// The workbook from the "Name/Age" walkthrough: four body rows, the third blank.
pub fn people() -> Vec<Vec<CellValue>> {
    vec![
        vec!["Name".into(), "Age".into()],
        vec!["Alice".into(), 30.0.into()],
        vec!["Bob".into(), 25.0.into()],
        vec![],
        vec!["Carol".into(), 40.0.into()],
    ]
}

/// A payload built directly, without going through a workbook.
pub fn payload(columns: &[&str], rows: Vec<Vec<CellValue>>) -> NormalizedPayload {
    let records: Vec<Record> = rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| Record {
            row: i + 1,
            values: columns.iter().map(|c| c.to_string()).zip(row).collect(),
        })
        .collect();
    NormalizedPayload {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        row_count: records.len(),
        records,
    }
}
