//! Upload pipeline.
//!
//! Processes a batch of files for one owner. Each file passes, in order:
//!
//! 1. extension policy (jpg, jpeg, png, gif)
//! 2. the [`DedupGate`] filename pre-check
//! 3. format sniffing, decode and fingerprint extraction
//! 4. record insert, which claims the `(owner_id, filename)` slot atomically
//! 5. blob upload, after which the record's URL is set (a failure here
//!    removes the record again)
//! 6. fingerprint index `put`
//!
//! Files that fail steps 1-4 are reported in [`UploadReport::not_uploaded`]
//! and the batch continues. Blob store and storage failures abort the batch.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::decode::{is_supported_extension, is_supported_format};
use crate::error::{Result, UtsuruError};
use crate::fingerprint::PerceptualHasher;
use crate::gate::DedupGate;
use crate::index::FingerprintIndex;
use crate::records::{ImageRecord, NewImageRecord, RecordStore};

/// Opaque blob storage for uploaded image bytes.
pub trait BlobStore: Send + Sync {
    /// Persist `data` and return the URL it can be fetched from.
    fn put(&self, owner_id: &str, filename: &str, data: &[u8]) -> Result<String>;
}

/// Blob store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: DashMap<String, Vec<u8>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(owner_id: &str, filename: &str) -> String {
        format!("{}/{}", owner_id, filename)
    }

    pub fn get(&self, owner_id: &str, filename: &str) -> Option<Vec<u8>> {
        self.blobs
            .get(&Self::key(owner_id, filename))
            .map(|blob| blob.value().clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn put(&self, owner_id: &str, filename: &str, data: &[u8]) -> Result<String> {
        let key = Self::key(owner_id, filename);
        self.blobs.insert(key.clone(), data.to_vec());
        Ok(format!("mem://{}", key))
    }
}

/// Blob store writing `<root>/<owner_id>/<filename>` on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// A path component that cannot escape its parent directory.
fn plain_component(value: &str) -> bool {
    !value.is_empty() && Path::new(value).file_name() == Some(OsStr::new(value))
}

impl BlobStore for FsBlobStore {
    fn put(&self, owner_id: &str, filename: &str, data: &[u8]) -> Result<String> {
        if !plain_component(owner_id) || !plain_component(filename) {
            return Err(UtsuruError::BlobStore(format!(
                "refusing to store {:?} for owner {:?}: not a plain file name",
                filename, owner_id
            )));
        }

        let dir = self.root.join(owner_id);
        std::fs::create_dir_all(&dir)
            .map_err(|e| UtsuruError::BlobStore(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(filename);
        std::fs::write(&path, data)
            .map_err(|e| UtsuruError::BlobStore(format!("{}: {}", path.display(), e)))?;

        let path = path.canonicalize().unwrap_or(path);
        Ok(format!("file://{}", path.display()))
    }
}

/// One file of an upload batch.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl IncomingFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Why a file was not uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Not a jpg, jpeg, png or gif file
    UnsupportedExtension,
    /// The owner already has a file with this name
    AlreadyExists,
    /// Empty, corrupt or unsupported image data
    UnreadableImage(String),
}

/// A file left out of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub filename: String,
    pub reason: RejectReason,
}

/// Outcome of an upload batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReport {
    pub uploaded: Vec<ImageRecord>,
    pub not_uploaded: Vec<Rejection>,
}

impl UploadReport {
    pub fn uploaded_filenames(&self) -> Vec<&str> {
        self.uploaded.iter().map(|r| r.filename.as_str()).collect()
    }

    pub fn not_uploaded_filenames(&self) -> Vec<&str> {
        self.not_uploaded.iter().map(|r| r.filename.as_str()).collect()
    }
}

/// Result of ingesting a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Uploaded(ImageRecord),
    Rejected(RejectReason),
}

/// Ingests uploads into the record store, blob store and fingerprint index.
pub struct UploadPipeline<B: BlobStore> {
    hasher: PerceptualHasher,
    records: Arc<RecordStore>,
    index: Arc<FingerprintIndex>,
    blobs: B,
}

impl<B: BlobStore> UploadPipeline<B> {
    pub fn new(records: Arc<RecordStore>, index: Arc<FingerprintIndex>, blobs: B) -> Self {
        Self {
            hasher: PerceptualHasher::new(),
            records,
            index,
            blobs,
        }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Ingest a batch of files for `owner_id`.
    ///
    /// Files are processed in the given order. A blob store or storage error
    /// aborts the batch; files already ingested stay ingested.
    pub fn ingest(&self, owner_id: &str, files: &[IncomingFile]) -> Result<UploadReport> {
        let mut report = UploadReport::default();

        for file in files {
            match self.ingest_file(owner_id, file)? {
                FileOutcome::Uploaded(record) => report.uploaded.push(record),
                FileOutcome::Rejected(reason) => report.not_uploaded.push(Rejection {
                    filename: file.filename.clone(),
                    reason,
                }),
            }
        }

        info!(
            owner_id,
            uploaded = report.uploaded.len(),
            not_uploaded = report.not_uploaded.len(),
            "Upload batch processed"
        );
        Ok(report)
    }

    /// Ingest one file. Safe to call concurrently.
    pub fn ingest_file(&self, owner_id: &str, file: &IncomingFile) -> Result<FileOutcome> {
        let filename = file.filename.as_str();

        if !is_supported_extension(filename) {
            warn!(owner_id, filename, "Rejected upload: unsupported extension");
            return Ok(FileOutcome::Rejected(RejectReason::UnsupportedExtension));
        }

        if !DedupGate::new(self.records.as_ref()).should_ingest(owner_id, filename) {
            return Ok(FileOutcome::Rejected(RejectReason::AlreadyExists));
        }

        if !is_supported_format(&file.bytes) {
            warn!(owner_id, filename, "Rejected upload: unrecognised image format");
            return Ok(FileOutcome::Rejected(RejectReason::UnreadableImage(
                "unrecognised image format".to_string(),
            )));
        }

        let fingerprint = match self.hasher.hash_bytes(&file.bytes) {
            Ok(fp) => fp,
            Err(e) if e.is_user_input() => {
                warn!(owner_id, filename, error = %e, "Rejected upload: unreadable image");
                return Ok(FileOutcome::Rejected(RejectReason::UnreadableImage(
                    e.to_string(),
                )));
            }
            Err(e) => return Err(e),
        };

        let record = match self.records.insert(NewImageRecord {
            owner_id: owner_id.to_string(),
            filename: filename.to_string(),
            size: file.bytes.len() as u64,
            url: None,
            fingerprint,
        }) {
            Ok(record) => record,
            Err(UtsuruError::DuplicateRecord { .. }) => {
                warn!(owner_id, filename, "Rejected upload: lost filename race");
                return Ok(FileOutcome::Rejected(RejectReason::AlreadyExists));
            }
            Err(e) => return Err(e),
        };

        let url = match self.blobs.put(owner_id, filename, &file.bytes) {
            Ok(url) => url,
            Err(e) => {
                self.records.remove(&record.id);
                return Err(e);
            }
        };
        if let Err(e) = self.records.set_url(record.id, url.clone()) {
            self.records.remove(&record.id);
            return Err(e);
        }
        self.index.put(record.id, fingerprint);

        Ok(FileOutcome::Uploaded(ImageRecord {
            url: Some(url),
            ..record
        }))
    }
}

impl<B: BlobStore + std::fmt::Debug> std::fmt::Debug for UploadPipeline<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadPipeline")
            .field("records", &self.records)
            .field("index", &self.index.len())
            .field("blobs", &self.blobs)
            .finish()
    }
}
