//! Image records and the in-memory record store.
//!
//! The record store enforces the `(owner_id, filename)` uniqueness
//! constraint atomically: of two concurrent inserts for the same pair,
//! exactly one succeeds and the other receives
//! [`UtsuruError::DuplicateRecord`]. That failure is the authoritative
//! dedup signal; the [`DedupGate`](crate::gate::DedupGate) pre-check only
//! saves wasted work.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, UtsuruError};
use crate::fingerprint::Fingerprint;

/// Opaque image identifier.
pub type ImageId = Uuid;

/// A stored image and its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub owner_id: String,
    /// Unique per owner
    pub filename: String,
    /// Size of the uploaded file in bytes
    pub size: u64,
    /// Set once the blob has been persisted
    pub url: Option<String>,
    pub fingerprint: Fingerprint,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a new image record.
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    pub owner_id: String,
    pub filename: String,
    pub size: u64,
    pub url: Option<String>,
    pub fingerprint: Fingerprint,
}

/// Read access used by the upload dedup gate.
///
/// Synchronous, for in-process stores. The PostgreSQL store exposes the same
/// check as the async `PostgresImageStore::should_ingest`.
pub trait RecordLookup {
    /// Whether a record exists for this exact `(owner_id, filename)` pair.
    fn record_exists(&self, owner_id: &str, filename: &str) -> bool;
}

/// Thread-safe in-memory record store.
#[derive(Default)]
pub struct RecordStore {
    records: DashMap<ImageId, ImageRecord>,
    /// (owner_id, filename) -> id
    by_name: DashMap<(String, String), ImageId>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new record, failing if the owner already has this filename.
    pub fn insert(&self, input: NewImageRecord) -> Result<ImageRecord> {
        let key = (input.owner_id.clone(), input.filename.clone());

        match self.by_name.entry(key) {
            Entry::Occupied(_) => Err(UtsuruError::DuplicateRecord {
                owner_id: input.owner_id,
                filename: input.filename,
            }),
            Entry::Vacant(slot) => {
                let record = ImageRecord {
                    id: Uuid::new_v4(),
                    owner_id: input.owner_id,
                    filename: input.filename,
                    size: input.size,
                    url: input.url,
                    fingerprint: input.fingerprint,
                    created_at: Utc::now(),
                };
                self.records.insert(record.id, record.clone());
                slot.insert(record.id);

                tracing::debug!(
                    id = %record.id,
                    owner_id = %record.owner_id,
                    filename = %record.filename,
                    "Stored image record"
                );
                Ok(record)
            }
        }
    }

    /// Record the storage URL of a persisted blob.
    ///
    /// The URL can only be set once.
    pub fn set_url(&self, id: ImageId, url: impl Into<String>) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(&id)
            .ok_or(UtsuruError::RecordNotFound(id))?;

        if entry.url.is_some() {
            return Err(UtsuruError::Storage(format!(
                "storage URL already set for image {}",
                id
            )));
        }
        entry.url = Some(url.into());
        Ok(())
    }

    /// Remove a record, releasing its `(owner_id, filename)` slot.
    pub fn remove(&self, id: &ImageId) -> Option<ImageRecord> {
        let (_, record) = self.records.remove(id)?;
        self.by_name
            .remove(&(record.owner_id.clone(), record.filename.clone()));
        Some(record)
    }

    pub fn get(&self, id: &ImageId) -> Option<ImageRecord> {
        self.records.get(id).map(|entry| entry.value().clone())
    }

    pub fn find(&self, owner_id: &str, filename: &str) -> Option<ImageRecord> {
        let id = *self
            .by_name
            .get(&(owner_id.to_string(), filename.to_string()))?
            .value();
        self.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordLookup for RecordStore {
    fn record_exists(&self, owner_id: &str, filename: &str) -> bool {
        self.by_name
            .contains_key(&(owner_id.to_string(), filename.to_string()))
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_record(owner: &str, filename: &str) -> NewImageRecord {
        NewImageRecord {
            owner_id: owner.to_string(),
            filename: filename.to_string(),
            size: 1024,
            url: None,
            fingerprint: Fingerprint::from_u64(0xABCD),
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = RecordStore::new();
        let record = store.insert(new_record("u1", "cat.jpg")).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&record.id), Some(record.clone()));
        assert_eq!(store.find("u1", "cat.jpg"), Some(record));
        assert!(store.record_exists("u1", "cat.jpg"));
        assert!(!store.record_exists("u2", "cat.jpg"));
        assert!(!store.record_exists("u1", "CAT.jpg"));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let store = RecordStore::new();
        store.insert(new_record("u1", "cat.jpg")).unwrap();

        let err = store.insert(new_record("u1", "cat.jpg")).unwrap_err();
        assert!(matches!(err, UtsuruError::DuplicateRecord { .. }));
        assert_eq!(store.len(), 1);

        // Same filename, different owner is fine
        store.insert(new_record("u2", "cat.jpg")).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_concurrent_inserts_single_winner() {
        let store = RecordStore::new();
        let successes: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| store.insert(new_record("u1", "race.png")).is_ok()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap() as usize)
                .sum()
        });

        assert_eq!(successes, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_url_once() {
        let store = RecordStore::new();
        let record = store.insert(new_record("u1", "cat.jpg")).unwrap();

        store.set_url(record.id, "mem://u1/cat.jpg").unwrap();
        assert_eq!(
            store.get(&record.id).unwrap().url.as_deref(),
            Some("mem://u1/cat.jpg")
        );
        assert!(store.set_url(record.id, "mem://elsewhere").is_err());
    }

    #[test]
    fn test_set_url_unknown_record() {
        let store = RecordStore::new();
        let err = store.set_url(Uuid::new_v4(), "mem://x").unwrap_err();
        assert!(matches!(err, UtsuruError::RecordNotFound(_)));
    }

    #[test]
    fn test_remove_releases_name() {
        let store = RecordStore::new();
        let record = store.insert(new_record("u1", "cat.jpg")).unwrap();

        assert_eq!(store.remove(&record.id), Some(record.clone()));
        assert!(store.is_empty());
        assert!(!store.record_exists("u1", "cat.jpg"));
        assert!(store.remove(&record.id).is_none());

        store.insert(new_record("u1", "cat.jpg")).unwrap();
    }
}
