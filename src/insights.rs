//! Descriptive summary of a normalized upload.
//!
//! Columns are split into numeric and categorical buckets, numeric columns get
//! a mean and a population standard deviation, and values at least two standard
//! deviations away from the mean are counted as outliers. Everything else is
//! templated text. The heuristics are crude on purpose and kept that way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::normalizer::{NormalizedPayload, Record};

/// Reported confidence; fixed, there is no model behind it
pub const CONFIDENCE: f64 = 0.85;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightReport {
    pub patterns: Vec<String>,
    pub recommendations: Vec<String>,
    pub chart_suggestions: Vec<String>,
    pub anomalies: Vec<String>,
    pub summary: String,
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

/// Request body of the analysis endpoint
///
/// Same shape the upload endpoints return, minus the message.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightRequest {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub data: Vec<Record>,
    #[serde(default)]
    pub row_count: usize,
}

impl InsightRequest {
    /// Reject requests with no columns, no data or a zero row count
    pub fn into_payload(self) -> Result<NormalizedPayload> {
        if self.columns.is_empty() || self.data.is_empty() || self.row_count == 0 {
            return Err(Error::Validation("Invalid data provided".to_string()));
        }
        Ok(NormalizedPayload {
            columns: self.columns,
            records: self.data,
            row_count: self.row_count,
        })
    }
}

/// Numeric/categorical partition of a payload's columns, in column order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ColumnClasses {
    pub numeric: Vec<String>,
    pub categorical: Vec<String>,
}

/// Statistics for one numeric column
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnStats {
    pub column: String,
    /// Number of values that parsed as finite numbers
    pub count: usize,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
    pub outliers: usize,
}

/// Split columns into numeric and categorical
///
/// A column is numeric as soon as a single record holds a finite number for it.
pub fn classify_columns(payload: &NormalizedPayload) -> ColumnClasses {
    let mut classes = ColumnClasses::default();
    for column in &payload.columns {
        let numeric = payload
            .column_values(column)
            .any(|value| value.as_finite_number().is_some());
        if numeric {
            classes.numeric.push(column.clone());
        } else {
            classes.categorical.push(column.clone());
        }
    }
    classes
}

/// Mean, standard deviation and outlier count over the parseable values of `column`
///
/// Returns `None` when no value parses. A zero standard deviation reports no
/// outliers.
pub fn column_stats(payload: &NormalizedPayload, column: &str) -> Option<ColumnStats> {
    let values: Vec<f64> = payload
        .column_values(column)
        .filter_map(|value| value.as_finite_number())
        .collect();
    if values.is_empty() {
        return None;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std_dev = variance.sqrt();

    let outliers = if std_dev > 0.0 && std_dev.is_finite() {
        let threshold = 2.0 * std_dev;
        values
            .iter()
            .filter(|v| (*v - mean).abs() >= threshold)
            .count()
    } else {
        0
    };

    Some(ColumnStats {
        column: column.to_string(),
        count: values.len(),
        mean,
        std_dev,
        outliers,
    })
}

/// Build the insight report for a payload
pub fn summarize(payload: &NormalizedPayload) -> InsightReport {
    let classes = classify_columns(payload);
    let numeric = &classes.numeric;
    let text = &classes.categorical;
    let row_count = payload.row_count;

    let mut patterns = Vec::new();
    if !numeric.is_empty() {
        patterns.push(format!(
            "Found {} numeric columns suitable for quantitative analysis",
            numeric.len()
        ));
    }
    if !text.is_empty() {
        patterns.push(format!(
            "Identified {} categorical columns for grouping analysis",
            text.len()
        ));
    }
    patterns.push(format!(
        "Dataset contains {} data points for statistical analysis",
        row_count
    ));

    let mut recommendations = Vec::new();
    if numeric.len() >= 2 {
        recommendations.push(format!(
            "Consider creating correlation analysis between {} and {}",
            numeric[0], numeric[1]
        ));
    }
    if let (Some(category), Some(value)) = (text.first(), numeric.first()) {
        recommendations.push(format!(
            "Create grouped analysis using {} as categories and {} as values",
            category, value
        ));
    }
    recommendations.push("Use time series analysis if date/time columns are present".to_string());
    recommendations.push("Consider outlier detection for better data quality".to_string());

    let mut chart_suggestions = Vec::new();
    if numeric.len() >= 2 {
        chart_suggestions.push(format!("Scatter plot: {} vs {}", numeric[0], numeric[1]));
    }
    if let (Some(category), Some(value)) = (text.first(), numeric.first()) {
        chart_suggestions.push(format!(
            "Bar chart: {} categories with {} values",
            category, value
        ));
    }
    if let Some(first) = numeric.first() {
        chart_suggestions.push(format!("Histogram: Distribution of {}", first));
    }
    chart_suggestions.push("Pie chart: Distribution of categorical data".to_string());

    let anomalies = numeric
        .iter()
        .filter_map(|column| column_stats(payload, column))
        .filter(|stats| stats.outliers > 0)
        .map(|stats| {
            format!(
                "Potential outliers detected in {} column ({} values)",
                stats.column, stats.outliers
            )
        })
        .collect();

    let summary = format!(
        "This dataset contains {} records with {} columns. \
         The data includes {} quantitative variables and {} categorical variables. \
         Recommended analysis includes correlation studies, distribution analysis, and pattern recognition.",
        row_count,
        payload.columns.len(),
        numeric.len(),
        text.len()
    );

    InsightReport {
        patterns,
        recommendations,
        chart_suggestions,
        anomalies,
        summary,
        confidence: CONFIDENCE,
        generated_at: Utc::now(),
    }
}
