//! The upload pipeline: validate, decode, normalize, hand off to a sink.
//!
//! Stages run strictly in order and the first failure ends the request; there is
//! never a partial payload. Both deployment variants share this code and differ
//! only in the [`UploadSink`] they pass in.

use crate::error::{Error, Result};
use crate::loader::{self, SpreadsheetFormat};
use crate::normalizer::{self, NormalizedPayload};
use crate::saving::{DocumentStore, StoredUpload, UploadDir};

/// Default upload ceiling: 10 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const NO_FILE_MESSAGE: &str = "No file uploaded";
pub const WRONG_TYPE_MESSAGE: &str = "Please upload Excel files only (.xlsx or .xls)";

/// A file as received from the client
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        UploadedFile {
            original_name: original_name.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IngestLimits {
    pub max_bytes: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        IngestLimits {
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// What happens to a successfully normalized upload
pub trait UploadSink {
    /// Returns the stored document when the sink persists anything
    fn accept(&self, file: &UploadedFile, payload: &NormalizedPayload)
    -> Result<Option<StoredUpload>>;
}

/// Anonymous variant: nothing is kept
pub struct Discard;

impl UploadSink for Discard {
    fn accept(&self, _: &UploadedFile, _: &NormalizedPayload) -> Result<Option<StoredUpload>> {
        Ok(None)
    }
}

/// Authenticated variant: keep the raw file and append one document for `owner`
pub struct PersistUpload<'a> {
    pub store: &'a dyn DocumentStore,
    pub uploads: &'a UploadDir,
    pub owner: &'a str,
}

impl UploadSink for PersistUpload<'_> {
    fn accept(
        &self,
        file: &UploadedFile,
        payload: &NormalizedPayload,
    ) -> Result<Option<StoredUpload>> {
        let path = self.uploads.save(&file.original_name, &file.bytes)?;
        let upload = StoredUpload::new(self.owner, &file.original_name, &path, payload.clone());
        if let Err(err) = self.store.append(upload.clone()) {
            if let Err(cleanup) = self.uploads.discard(&path) {
                log::warn!("could not remove {} after a failed append: {}", path.display(), cleanup);
            }
            return Err(err.into());
        }
        log::info!(
            "persisted upload {} for '{}' ({} rows)",
            upload.id,
            self.owner,
            payload.row_count
        );
        Ok(Some(upload))
    }
}

/// Result of a successful ingestion
#[derive(Clone, Debug)]
pub struct Ingested {
    pub payload: NormalizedPayload,
    pub stored: Option<StoredUpload>,
}

/// Check presence, extension and size, in that order
///
/// Runs before any decoding, so an oversized or mistyped file never reaches the
/// decoder.
pub fn validate(file: Option<&UploadedFile>, limits: &IngestLimits) -> Result<SpreadsheetFormat> {
    let file = file.ok_or_else(|| Error::Validation(NO_FILE_MESSAGE.to_string()))?;
    let format = SpreadsheetFormat::from_file_name(&file.original_name)
        .ok_or_else(|| Error::Validation(WRONG_TYPE_MESSAGE.to_string()))?;
    if file.size() > limits.max_bytes {
        return Err(Error::Validation(format!(
            "File too large: {} bytes exceeds the {} byte limit",
            file.size(),
            limits.max_bytes
        )));
    }
    Ok(format)
}

/// Decode and normalize an already validated file
pub fn parse(file: &UploadedFile, format: SpreadsheetFormat) -> Result<NormalizedPayload> {
    let workbook = loader::decode(&file.bytes, format)?;
    normalizer::normalize(&workbook)
}

/// Run the whole pipeline for one upload
///
/// # Arguments
/// * `file` - The uploaded file, if the request carried one
/// * `limits` - Size ceiling for the file body
/// * `sink` - Where a normalized payload goes once it exists
///
/// # Returns
/// * `Result<Ingested>` - The payload and, for persisting sinks, the stored document
///
/// # Errors
/// * `Error::Validation` - No file, wrong extension or oversized body
/// * `Error::Format` - The bytes are not a workbook of the declared format
/// * `Error::EmptyFile` - The first sheet holds no data rows
/// * `Error::Persistence` - The sink could not store the result
pub fn ingest(
    file: Option<UploadedFile>,
    limits: &IngestLimits,
    sink: &dyn UploadSink,
) -> Result<Ingested> {
    let Some(file) = file else {
        return Err(Error::Validation(NO_FILE_MESSAGE.to_string()));
    };
    let format = validate(Some(&file), limits)?;
    log::info!(
        "ingesting '{}' ({} bytes, {})",
        file.original_name,
        file.size(),
        format
    );

    let payload = parse(&file, format)?;
    let stored = sink.accept(&file, &payload)?;
    Ok(Ingested { payload, stored })
}
