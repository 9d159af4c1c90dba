//! Error taxonomy shared by the ingestion pipeline and the HTTP layer.
//!
//! Every failure that can reach a response is one of these kinds, so a caller can
//! tell "fix your file" (the 4xx kinds) apart from "try again later" (`Persistence`).

use thiserror::Error;

use crate::loader::DecodeError;
use crate::saving::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing input: no file, wrong extension, oversized body, malformed request
    #[error("{0}")]
    Validation(String),

    /// The file content is not a readable workbook for its declared format
    #[error("Invalid Excel file: {0}")]
    Format(String),

    /// The workbook decoded fine but holds no data rows
    #[error("Excel file is empty")]
    EmptyFile,

    /// The document store or upload directory could not be used
    #[error("Storage unavailable: {0}")]
    Persistence(String),

    /// Missing or invalid credentials
    #[error("{0}")]
    Authorization(String),

    /// Authenticated, but not allowed
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),
}

impl Error {
    /// Stable machine-readable name for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Format(_) => "format",
            Error::EmptyFile => "empty_file",
            Error::Persistence(_) => "persistence",
            Error::Authorization(_) => "authorization",
            Error::Forbidden(_) => "forbidden",
            Error::NotFound(_) => "not_found",
        }
    }

    /// Whether the caller can fix the problem by changing the request
    pub fn is_user_correctable(&self) -> bool {
        !matches!(self, Error::Persistence(_))
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Format(err.to_string())
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        Error::Persistence(err.to_string())
    }
}

#[cfg(feature = "web")]
mod response {
    use axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde_json::json;

    use super::Error;

    impl Error {
        pub fn status_code(&self) -> StatusCode {
            match self {
                Error::Validation(_) | Error::Format(_) | Error::EmptyFile => {
                    StatusCode::BAD_REQUEST
                }
                Error::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                Error::Authorization(_) => StatusCode::UNAUTHORIZED,
                Error::Forbidden(_) => StatusCode::FORBIDDEN,
                Error::NotFound(_) => StatusCode::NOT_FOUND,
            }
        }
    }

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = self.status_code();
            if status.is_server_error() {
                log::error!("{} error: {}", self.kind(), self);
            } else {
                log::warn!("request rejected ({}): {}", self.kind(), self);
            }
            let body = json!({
                "message": self.to_string(),
                "kind": self.kind(),
            });
            (status, Json(body)).into_response()
        }
    }
}
