//! Persistence for the authenticated upload variant.
//!
//! Stored uploads are append-only from the ingestion path. `FileStore` keeps one
//! gzip-compressed JSON document per upload under a directory per owner;
//! `MemoryStore` keeps everything in process and backs the tests.

use chrono::{DateTime, Utc};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, create_dir_all};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use thiserror::Error;
use uuid::Uuid;

use crate::normalizer::NormalizedPayload;

const DOCUMENT_SUFFIX: &str = ".json.gz";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("store lock poisoned")]
    Poisoned,
}

/// One persisted upload: who sent which file, and what it normalized to
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredUpload {
    pub id: Uuid,
    pub owner: String,
    pub original_name: String,
    /// Where the raw file was written
    pub stored_path: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: NormalizedPayload,
}

impl StoredUpload {
    pub fn new(
        owner: &str,
        original_name: &str,
        stored_path: &Path,
        payload: NormalizedPayload,
    ) -> Self {
        StoredUpload {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            original_name: original_name.to_string(),
            stored_path: stored_path.to_string_lossy().to_string(),
            created_at: Utc::now(),
            payload,
        }
    }
}

/// A document store for normalized uploads
///
/// Listings are returned newest first; uploads stamped in the same instant keep
/// reverse insertion order where the backend knows it.
pub trait DocumentStore: Send + Sync {
    fn append(&self, upload: StoredUpload) -> Result<(), StoreError>;

    /// Uploads owned by `owner`
    fn history(&self, owner: &str) -> Result<Vec<StoredUpload>, StoreError>;

    /// Uploads of every owner
    fn all(&self) -> Result<Vec<StoredUpload>, StoreError>;

    /// Remove one upload, returning it if it existed
    fn remove(&self, id: Uuid) -> Result<Option<StoredUpload>, StoreError>;

    /// Remove every upload of `owner`, returning what was removed
    fn remove_owner(&self, owner: &str) -> Result<Vec<StoredUpload>, StoreError>;
}

fn newest_first(mut uploads: Vec<StoredUpload>) -> Vec<StoredUpload> {
    uploads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    uploads
}

#[derive(Default)]
pub struct MemoryStore {
    uploads: RwLock<Vec<StoredUpload>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn append(&self, upload: StoredUpload) -> Result<(), StoreError> {
        self.uploads
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(upload);
        Ok(())
    }

    fn history(&self, owner: &str) -> Result<Vec<StoredUpload>, StoreError> {
        let uploads = self.uploads.read().map_err(|_| StoreError::Poisoned)?;
        Ok(newest_first(
            uploads.iter().rev().filter(|u| u.owner == owner).cloned().collect(),
        ))
    }

    fn all(&self) -> Result<Vec<StoredUpload>, StoreError> {
        let uploads = self.uploads.read().map_err(|_| StoreError::Poisoned)?;
        Ok(newest_first(uploads.iter().rev().cloned().collect()))
    }

    fn remove(&self, id: Uuid) -> Result<Option<StoredUpload>, StoreError> {
        let mut uploads = self.uploads.write().map_err(|_| StoreError::Poisoned)?;
        let index = uploads.iter().position(|u| u.id == id);
        Ok(index.map(|index| uploads.remove(index)))
    }

    fn remove_owner(&self, owner: &str) -> Result<Vec<StoredUpload>, StoreError> {
        let mut uploads = self.uploads.write().map_err(|_| StoreError::Poisoned)?;
        let (removed, kept): (Vec<_>, Vec<_>) = uploads.drain(..).partition(|u| u.owner == owner);
        *uploads = kept;
        Ok(removed)
    }
}

/// Directory-backed store: `<root>/u-<hex owner>/<id>.json.gz`
///
/// The owner directory is the hex encoding of the owner name, so two distinct
/// owners never share a directory.
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        create_dir_all(&root)?;
        Ok(FileStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn owner_dir(&self, owner: &str) -> PathBuf {
        self.root.join(format!("u-{}", hex::encode(owner.as_bytes())))
    }

    fn document_path(&self, owner: &str, id: Uuid) -> PathBuf {
        self.owner_dir(owner).join(format!("{id}{DOCUMENT_SUFFIX}"))
    }

    fn read_dir_documents(dir: &Path) -> Result<Vec<StoredUpload>, StoreError> {
        Ok(Self::read_dir_entries(dir)?
            .into_iter()
            .map(|(_, upload)| upload)
            .collect())
    }

    /// Documents in `dir` together with the file each was read from
    fn read_dir_entries(dir: &Path) -> Result<Vec<(PathBuf, StoredUpload)>, StoreError> {
        let mut uploads = Vec::new();
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(uploads),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let path = entry?.path();
            let is_document = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(DOCUMENT_SUFFIX));
            if path.is_file() && is_document {
                let upload = load_document(&path)?;
                uploads.push((path, upload));
            }
        }
        Ok(uploads)
    }

    fn owner_dirs(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.is_dir() {
                dirs.push(path);
            }
        }
        Ok(dirs)
    }
}

impl DocumentStore for FileStore {
    fn append(&self, upload: StoredUpload) -> Result<(), StoreError> {
        create_dir_all(self.owner_dir(&upload.owner))?;
        let path = self.document_path(&upload.owner, upload.id);
        save_document(&upload, &path)?;
        log::debug!("stored upload {} at {}", upload.id, path.display());
        Ok(())
    }

    fn history(&self, owner: &str) -> Result<Vec<StoredUpload>, StoreError> {
        let uploads = Self::read_dir_documents(&self.owner_dir(owner))?;
        Ok(newest_first(
            uploads.into_iter().filter(|u| u.owner == owner).collect(),
        ))
    }

    fn all(&self) -> Result<Vec<StoredUpload>, StoreError> {
        let mut uploads = Vec::new();
        for dir in self.owner_dirs()? {
            uploads.extend(Self::read_dir_documents(&dir)?);
        }
        Ok(newest_first(uploads))
    }

    fn remove(&self, id: Uuid) -> Result<Option<StoredUpload>, StoreError> {
        let file_name = format!("{id}{DOCUMENT_SUFFIX}");
        for dir in self.owner_dirs()? {
            let path = dir.join(&file_name);
            if path.is_file() {
                let upload = load_document(&path)?;
                fs::remove_file(path)?;
                return Ok(Some(upload));
            }
        }
        Ok(None)
    }

    fn remove_owner(&self, owner: &str) -> Result<Vec<StoredUpload>, StoreError> {
        let dir = self.owner_dir(owner);
        let mut removed = Vec::new();
        for (path, upload) in Self::read_dir_entries(&dir)? {
            if upload.owner == owner {
                fs::remove_file(path)?;
                removed.push(upload);
            }
        }
        if dir.is_dir() && fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
        }
        Ok(removed)
    }
}

fn save_document(upload: &StoredUpload, path: &Path) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(GzEncoder::new(file, Compression::default()));
    serde_json::to_writer(&mut writer, upload)?;
    writer.into_inner().map_err(|e| e.into_error())?.finish()?;
    Ok(())
}

fn load_document(path: &Path) -> Result<StoredUpload, StoreError> {
    let file = File::open(path)?;
    let reader = BufReader::new(GzDecoder::new(file));
    Ok(serde_json::from_reader(reader)?)
}

/// Raw uploaded files, kept so a stored upload can point back at its source
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        create_dir_all(&root)?;
        Ok(UploadDir { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write `bytes` as `<unix millis>-<sanitized original name>` and return the path
    pub fn save(&self, original_name: &str, bytes: &[u8]) -> Result<PathBuf, StoreError> {
        let name = format!(
            "{}-{}",
            Utc::now().timestamp_millis(),
            sanitize_file_name(original_name)
        );
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    /// Delete a raw file previously written by [`UploadDir::save`]
    ///
    /// Paths outside this directory are left alone. Returns whether a file was removed.
    pub fn discard(&self, stored_path: impl AsRef<Path>) -> Result<bool, StoreError> {
        let path = stored_path.as_ref();
        if path.parent() != Some(self.root.as_path()) {
            log::warn!("refusing to delete {} outside the upload directory", path.display());
            return Ok(false);
        }
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Replace everything outside `[A-Za-z0-9._-]` so a client-supplied name can't
/// escape its directory
pub fn sanitize_file_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let re = UNSAFE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));
    let cleaned = re.replace_all(name, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizing_file_names() {
        assert_eq!(sanitize_file_name("sales report.xlsx"), "sales_report.xlsx");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name(".."), "upload");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name("Ümlaut.xls"), "_mlaut.xls");
    }

    #[test]
    fn memory_store_removal() {
        let store = MemoryStore::new();
        let a = StoredUpload::new("alice", "a.xlsx", Path::new("a"), NormalizedPayload::default());
        let b = StoredUpload::new("bob", "b.xlsx", Path::new("b"), NormalizedPayload::default());
        let a_id = a.id;
        store.append(a).unwrap();
        store.append(b).unwrap();

        assert_eq!(store.remove(a_id).unwrap().map(|u| u.owner), Some("alice".to_string()));
        assert!(store.remove(a_id).unwrap().is_none());
        assert_eq!(store.remove_owner("bob").unwrap().len(), 1);
        assert!(store.all().unwrap().is_empty());
    }

    #[test]
    fn similar_owner_names_do_not_share_documents() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        for owner in ["a b", "a_b", "..", "upload"] {
            let upload = StoredUpload::new(owner, "x.xlsx", Path::new("x"), NormalizedPayload::default());
            store.append(upload).unwrap();
        }

        let removed = store.remove_owner("a b").unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].owner, "a b");
        assert_eq!(store.history("a_b").unwrap().len(), 1);

        assert_eq!(store.remove_owner("..").unwrap().len(), 1);
        assert_eq!(store.history("upload").unwrap().len(), 1);
        assert_eq!(store.all().unwrap().len(), 2);
    }

    #[test]
    fn discard_stays_inside_the_upload_directory() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::open(dir.path().join("uploads")).unwrap();
        let outside = dir.path().join("keep.xlsx");
        fs::write(&outside, b"keep").unwrap();

        let saved = uploads.save("report.xlsx", b"data").unwrap();
        assert!(uploads.discard(&saved).unwrap());
        assert!(!saved.exists());
        assert!(!uploads.discard(&saved).unwrap());

        assert!(!uploads.discard(&outside).unwrap());
        assert!(outside.exists());
    }
}
