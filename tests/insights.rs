mod common;

use excel_analytics::insights::{self, CONFIDENCE, InsightRequest, classify_columns, column_stats};
use excel_analytics::{CellValue, Error};
use proptest::prelude::*;

use common::payload;

#[test]
fn a_single_far_value_is_an_outlier() {
    let p = payload(
        &["amount"],
        [10.0, 10.0, 10.0, 10.0, 1000.0]
            .into_iter()
            .map(|v| vec![CellValue::Number(v)])
            .collect(),
    );
    let stats = column_stats(&p, "amount").unwrap();
    assert_eq!(stats.mean, 208.0);
    assert!((stats.std_dev - 396.0).abs() < 1e-9);
    assert_eq!(stats.outliers, 1);

    let report = insights::summarize(&p);
    assert_eq!(
        report.anomalies,
        vec!["Potential outliers detected in amount column (1 values)"]
    );
}

#[test]
fn identical_values_have_no_outliers() {
    let p = payload(&["v"], (0..6).map(|_| vec![CellValue::Number(7.0)]).collect());
    let stats = column_stats(&p, "v").unwrap();
    assert_eq!(stats.std_dev, 0.0);
    assert_eq!(stats.outliers, 0);
    assert!(insights::summarize(&p).anomalies.is_empty());
}

#[test]
fn numeric_strings_count_as_numbers() {
    let p = payload(
        &["region", "sales", "units"],
        vec![
            vec!["north".into(), "1200".into(), 3.0.into()],
            vec!["south".into(), " 800 ".into(), 4.0.into()],
            vec!["east".into(), "".into(), 5.0.into()],
        ],
    );
    let classes = classify_columns(&p);
    assert_eq!(classes.numeric, vec!["sales", "units"]);
    assert_eq!(classes.categorical, vec!["region"]);
    assert_eq!(column_stats(&p, "sales").unwrap().count, 2);
}

#[test]
fn report_text_follows_the_columns() {
    let p = payload(
        &["region", "sales", "units"],
        vec![
            vec!["north".into(), 1200.0.into(), 3.0.into()],
            vec!["south".into(), 800.0.into(), 4.0.into()],
        ],
    );
    let report = insights::summarize(&p);

    assert_eq!(report.confidence, CONFIDENCE);
    assert_eq!(
        report.patterns,
        vec![
            "Found 2 numeric columns suitable for quantitative analysis",
            "Identified 1 categorical columns for grouping analysis",
            "Dataset contains 2 data points for statistical analysis",
        ]
    );
    assert_eq!(
        report.recommendations[0],
        "Consider creating correlation analysis between sales and units"
    );
    assert_eq!(
        report.recommendations[1],
        "Create grouped analysis using region as categories and sales as values"
    );
    assert_eq!(
        report.chart_suggestions,
        vec![
            "Scatter plot: sales vs units",
            "Bar chart: region categories with sales values",
            "Histogram: Distribution of sales",
            "Pie chart: Distribution of categorical data",
        ]
    );
    assert!(report.summary.starts_with("This dataset contains 2 records with 3 columns."));
}

#[test]
fn request_validation() {
    let empty: InsightRequest = serde_json::from_value(serde_json::json!({})).unwrap();
    assert!(matches!(empty.into_payload(), Err(Error::Validation(_))));

    let zero_rows: InsightRequest = serde_json::from_value(serde_json::json!({
        "columns": ["a"],
        "data": [{ "row": 1, "values": { "a": 1 } }],
        "rowCount": 0
    }))
    .unwrap();
    assert!(zero_rows.into_payload().is_err());

    let ok: InsightRequest = serde_json::from_value(serde_json::json!({
        "columns": ["a"],
        "data": [{ "row": 1, "values": { "a": 1 } }],
        "rowCount": 1
    }))
    .unwrap();
    let payload = ok.into_payload().unwrap();
    assert_eq!(payload.records[0].values["a"], CellValue::Number(1.0));
}

proptest! {
    #[test]
    fn every_column_lands_in_exactly_one_class(
        rows in prop::collection::vec(
            prop::collection::vec(
                prop_oneof![
                    "[a-z]{0,5}".prop_map(CellValue::Text),
                    (-50.0f64..50.0).prop_map(CellValue::Number),
                    any::<bool>().prop_map(CellValue::Bool),
                ],
                4,
            ),
            1..15,
        ),
    ) {
        let columns = ["c0", "c1", "c2", "c3"];
        let p = payload(&columns, rows);
        let classes = classify_columns(&p);

        prop_assert_eq!(classes.numeric.len() + classes.categorical.len(), columns.len());
        for column in columns {
            let in_numeric = classes.numeric.iter().any(|c| c == column);
            let in_categorical = classes.categorical.iter().any(|c| c == column);
            prop_assert!(in_numeric != in_categorical);
        }
    }
}
