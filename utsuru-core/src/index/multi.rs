//! Exact multi-index hashing.
//!
//! The 64-bit fingerprint is split into four 16-bit chunks, each with its
//! own bucket table. If two fingerprints are within distance `T`, at least
//! one chunk differs in at most `T / 4` bits (pigeonhole), so probing every
//! bucket within that radius of each query chunk yields a candidate set
//! that contains every true match. Candidates are then verified with the
//! full 64-bit distance, so results equal the full scan exactly.
//!
//! Neighbour enumeration is capped at chunk radius 2 (`T <= 11`); above
//! that the caller falls back to a full scan.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::fingerprint::Fingerprint;
use crate::records::ImageId;

const NUM_CHUNKS: usize = 4;
const CHUNK_BITS: usize = 16;

/// Largest per-chunk radius that is enumerated.
pub const MAX_CHUNK_RADIUS: u32 = 2;

/// Largest threshold served from the bucket tables.
pub const MAX_INDEXED_THRESHOLD: u32 = (MAX_CHUNK_RADIUS + 1) * NUM_CHUNKS as u32 - 1;

/// All 16-bit masks with at most `MAX_CHUNK_RADIUS` bits set, by popcount.
fn flip_masks() -> &'static [u16] {
    static MASKS: OnceLock<Vec<u16>> = OnceLock::new();
    MASKS.get_or_init(|| {
        let mut masks = vec![0u16];
        for i in 0..CHUNK_BITS {
            masks.push(1 << i);
        }
        for i in 0..CHUNK_BITS {
            for j in (i + 1)..CHUNK_BITS {
                masks.push((1 << i) | (1 << j));
            }
        }
        masks
    })
}

#[inline]
fn chunk(fp: Fingerprint, index: usize) -> u16 {
    (fp.as_u64() >> (index * CHUNK_BITS)) as u16
}

#[derive(Debug, Default)]
pub(crate) struct MultiIndex {
    tables: [HashMap<u16, Vec<ImageId>>; NUM_CHUNKS],
}

impl MultiIndex {
    pub(crate) fn insert(&mut self, id: ImageId, fp: Fingerprint) {
        for (k, table) in self.tables.iter_mut().enumerate() {
            table.entry(chunk(fp, k)).or_default().push(id);
        }
    }

    pub(crate) fn remove(&mut self, id: &ImageId, fp: Fingerprint) {
        for (k, table) in self.tables.iter_mut().enumerate() {
            let key = chunk(fp, k);
            if let Some(bucket) = table.get_mut(&key) {
                bucket.retain(|candidate| candidate != id);
                if bucket.is_empty() {
                    table.remove(&key);
                }
            }
        }
    }

    /// Candidate ids that may lie within `threshold` of `query`.
    ///
    /// Returns `None` when the threshold is too large to be served from the
    /// bucket tables.
    pub(crate) fn candidates(
        &self,
        query: Fingerprint,
        threshold: u32,
    ) -> Option<HashSet<ImageId>> {
        if threshold > MAX_INDEXED_THRESHOLD {
            return None;
        }

        let radius = threshold / NUM_CHUNKS as u32;
        let masks = flip_masks()
            .iter()
            .filter(|mask| mask.count_ones() <= radius);

        let mut found = HashSet::new();
        for mask in masks {
            for (k, table) in self.tables.iter().enumerate() {
                if let Some(bucket) = table.get(&(chunk(query, k) ^ mask)) {
                    found.extend(bucket.iter().copied());
                }
            }
        }
        Some(found)
    }
}
