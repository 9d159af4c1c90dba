/*!
# Excel Analytics

A web service that accepts spreadsheet uploads, turns them into header-keyed
records, and produces a descriptive summary of the result, built in Rust.

## Overview

Clients upload `.xlsx` or `.xls` files. The server decodes the workbook, takes
its first sheet, treats the first row as column headers, and answers with a
stable JSON payload that charting clients consume directly. A second endpoint
takes that same payload back and returns a templated "insight" report.

## Architecture

### Ingestion pipeline
- **Tabular Decoder** (`loader`) - raw bytes to an in-memory workbook, via calamine
- **Row Normalizer** (`normalizer`) - first sheet to `{columns, data, rowCount}`
- **Ingestion Endpoint** (`ingest`) - validation, then decode, normalize, and hand
  the result to a sink that either discards it or persists it

### Analysis
- **Insight Summarizer** (`insights`) - numeric/categorical classification, mean and
  population standard deviation, 2-sigma outlier counts, templated text

### Persistence
- Gzip-compressed JSON documents, one per upload, grouped per owner (`saving`)
- Raw uploaded files kept under the upload directory
- Users in a JSON file with Argon2 password hashes (`login`)

### Web layer (feature `web`)
- axum router (`app`), bearer-token sessions (`login`), admin routes (`admin`),
  environment configuration (`config`)

## Modules

- **cell**: `CellValue`, the four value shapes a decoded cell can take
- **spreadsheet**: `Workbook` and `Sheet`
- **loader**: format detection and decoding
- **normalizer**: header/record normalization
- **insights**: descriptive summary
- **ingest**: the upload pipeline and its sinks
- **saving**: document store and upload directory
- **error**: the error taxonomy shared by every layer

## REST API Endpoints

- `POST /api/upload/simple` - anonymous upload, nothing persisted
- `POST /api/upload` - authenticated upload, persisted
- `GET /api/upload/history` - the caller's uploads, newest first
- `POST /api/ai/analyze-simple` - insight report for a payload
- `POST /api/auth/register`, `/api/auth/login`, `/api/auth/logout`, `GET /api/auth/me`
- `/api/admin/users`, `/api/admin/files`, `/api/admin/stats` - admin maintenance
- `GET /api/health` - liveness and configuration summary
*/

pub mod cell;
pub mod error;
pub mod ingest;
pub mod insights;
pub mod loader;
pub mod normalizer;
pub mod saving;
pub mod spreadsheet;

#[cfg(feature = "web")]
pub mod admin;
#[cfg(feature = "web")]
pub mod app;
#[cfg(feature = "web")]
pub mod config;
#[cfg(feature = "web")]
pub mod login;

/// Re-export the pipeline types to make them easier to use
pub use cell::CellValue;
pub use error::{Error, Result};
pub use ingest::{Discard, IngestLimits, PersistUpload, UploadSink, UploadedFile, ingest};
pub use insights::{InsightReport, summarize};
pub use loader::{SpreadsheetFormat, decode};
pub use normalizer::{NormalizedPayload, Record, normalize};
pub use spreadsheet::{Sheet, Workbook};

/// Initialise `env_logger` once, defaulting this crate to `info` when `RUST_LOG` is unset
#[cfg(feature = "web")]
pub fn init_logging() {
    use std::sync::OnceLock;

    static LOGGER: OnceLock<()> = OnceLock::new();
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if std::env::var("RUST_LOG").is_err() {
            builder.filter_module("excel_analytics", log::LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}
