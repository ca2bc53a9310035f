//! Upload dedup gate.
//!
//! Name-based: a file is skipped when its owner already has a record with
//! the exact same filename, regardless of pixel content. The check runs
//! before any decoding, fingerprinting or blob upload.
//!
//! Check-then-insert is not atomic. The record store's uniqueness
//! constraint settles concurrent uploads of the same name.

use tracing::debug;

use crate::records::RecordLookup;

/// Pre-ingest duplicate check over a record source.
pub struct DedupGate<'a, R: RecordLookup + ?Sized> {
    records: &'a R,
}

impl<'a, R: RecordLookup + ?Sized> DedupGate<'a, R> {
    pub fn new(records: &'a R) -> Self {
        Self { records }
    }

    /// Returns `false` when `(owner_id, filename)` already has a record.
    ///
    /// Byte-for-byte comparison: no case folding or path normalization.
    pub fn should_ingest(&self, owner_id: &str, filename: &str) -> bool {
        let exists = self.records.record_exists(owner_id, filename);
        if exists {
            debug!(owner_id, filename, "Skipping upload: filename already exists for owner");
        }
        !exists
    }
}
