//! Fingerprint index: stores `(image id, fingerprint)` pairs and answers
//! Hamming-distance similarity queries.
//!
//! Results are ordered by distance ascending, ties broken by insertion
//! order. Replacing an entry's fingerprint keeps its original insertion
//! position.
//!
//! # Strategies
//!
//! - [`IndexStrategy::FullScan`]: `popcount(query ^ stored)` over every entry.
//! - [`IndexStrategy::MultiIndex`]: exact multi-index hashing (see
//!   [`multi`]); no false negatives, identical output to the full scan.
//!
//! # Concurrency
//!
//! Entries live behind a single `RwLock`: a query sees a consistent
//! snapshot of every `put` that completed before it acquired the lock, and
//! never a partially written entry.

mod multi;

pub use multi::MAX_INDEXED_THRESHOLD;

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{IndexStrategy, SimilarityThreshold};
use crate::error::{Result, UtsuruError};
use crate::fingerprint::Fingerprint;
use crate::records::ImageId;

use multi::MultiIndex;

/// One entry of a similarity query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimilarityMatch {
    pub image_id: ImageId,
    /// Hamming distance from the query (0 = identical fingerprint)
    pub distance: u32,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    fingerprint: Fingerprint,
    seq: u64,
}

#[derive(Debug, Default)]
struct IndexState {
    entries: HashMap<ImageId, Entry>,
    next_seq: u64,
    buckets: Option<MultiIndex>,
}

/// Thread-safe in-memory fingerprint index.
#[derive(Debug)]
pub struct FingerprintIndex {
    strategy: IndexStrategy,
    state: RwLock<IndexState>,
}

impl Default for FingerprintIndex {
    fn default() -> Self {
        Self::new(IndexStrategy::default())
    }
}

impl FingerprintIndex {
    pub fn new(strategy: IndexStrategy) -> Self {
        let buckets = match strategy {
            IndexStrategy::FullScan => None,
            IndexStrategy::MultiIndex => Some(MultiIndex::default()),
        };

        Self {
            strategy,
            state: RwLock::new(IndexState {
                buckets,
                ..IndexState::default()
            }),
        }
    }

    pub fn strategy(&self) -> IndexStrategy {
        self.strategy
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the fingerprint for an image.
    ///
    /// Idempotent: repeating a `put` with the same pair changes nothing.
    pub fn put(&self, image_id: ImageId, fingerprint: Fingerprint) {
        let mut guard = self.write();
        let state = &mut *guard;

        match state.entries.get_mut(&image_id) {
            Some(entry) if entry.fingerprint == fingerprint => {}
            Some(entry) => {
                if let Some(buckets) = state.buckets.as_mut() {
                    buckets.remove(&image_id, entry.fingerprint);
                    buckets.insert(image_id, fingerprint);
                }
                entry.fingerprint = fingerprint;
                debug!(%image_id, %fingerprint, "Replaced fingerprint");
            }
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.entries.insert(image_id, Entry { fingerprint, seq });
                if let Some(buckets) = state.buckets.as_mut() {
                    buckets.insert(image_id, fingerprint);
                }
                debug!(%image_id, %fingerprint, seq, "Indexed fingerprint");
            }
        }
    }

    pub fn get(&self, image_id: &ImageId) -> Option<Fingerprint> {
        self.read().entries.get(image_id).map(|e| e.fingerprint)
    }

    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// Every stored entry within `threshold` bits of `fingerprint`.
    ///
    /// A negative threshold is rejected with
    /// [`UtsuruError::InvalidThreshold`] before any entry is examined.
    pub fn similar_to(
        &self,
        fingerprint: Fingerprint,
        threshold: i64,
    ) -> Result<Vec<SimilarityMatch>> {
        if threshold < 0 {
            return Err(UtsuruError::InvalidThreshold(threshold));
        }
        // Distances never exceed 64, larger thresholds simply saturate.
        let threshold = u32::try_from(threshold).unwrap_or(u32::MAX);

        Ok(self.similar_within(fingerprint, SimilarityThreshold::new(threshold)))
    }

    /// Typed variant of [`similar_to`](Self::similar_to) for already
    /// validated thresholds.
    pub fn similar_within(
        &self,
        fingerprint: Fingerprint,
        threshold: SimilarityThreshold,
    ) -> Vec<SimilarityMatch> {
        let threshold = threshold.get();
        let state = self.read();

        let mut hits: Vec<(u32, u64, ImageId)> = match state
            .buckets
            .as_ref()
            .and_then(|b| b.candidates(fingerprint, threshold))
        {
            Some(candidates) => candidates
                .into_iter()
                .filter_map(|id| state.entries.get(&id).map(|e| (id, *e)))
                .filter_map(|(id, e)| {
                    within(fingerprint, &e, threshold).map(|d| (d, e.seq, id))
                })
                .collect(),
            None => state
                .entries
                .iter()
                .filter_map(|(id, e)| {
                    within(fingerprint, e, threshold).map(|d| (d, e.seq, *id))
                })
                .collect(),
        };
        drop(state);

        hits.sort_unstable_by_key(|&(distance, seq, _)| (distance, seq));

        debug!(
            query = %fingerprint,
            threshold,
            strategy = %self.strategy,
            matches = hits.len(),
            "Similarity query"
        );

        hits.into_iter()
            .map(|(distance, _, image_id)| SimilarityMatch { image_id, distance })
            .collect()
    }
}

fn within(query: Fingerprint, entry: &Entry, threshold: u32) -> Option<u32> {
    let distance = query.hamming_distance(entry.fingerprint);
    (distance <= threshold).then_some(distance)
}
