//! Similarity query engine.
//!
//! Binds the search configuration to a fingerprint index and the record
//! store used to hydrate results. The threshold is resolved from the
//! configuration on every query; a missing or malformed threshold fails
//! the query before any fingerprint is extracted or compared.

use std::sync::Arc;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::config::{SearchConfig, SimilarityThreshold};
use crate::error::Result;
use crate::fingerprint::{Fingerprint, PerceptualHasher};
use crate::index::{FingerprintIndex, SimilarityMatch};
use crate::records::{ImageRecord, RecordStore};

/// A hydrated similarity result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMatch {
    pub record: ImageRecord,
    /// Hamming distance from the query (0 = identical fingerprint)
    pub distance: u32,
}

/// Answers "which stored images look like this one" queries.
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    config: SearchConfig,
    hasher: PerceptualHasher,
    index: Arc<FingerprintIndex>,
    records: Arc<RecordStore>,
}

impl SimilarityEngine {
    pub fn new(
        config: SearchConfig,
        index: Arc<FingerprintIndex>,
        records: Arc<RecordStore>,
    ) -> Self {
        Self {
            config,
            hasher: PerceptualHasher::new(),
            index,
            records,
        }
    }

    /// Engine over a fresh, empty index built with the configured strategy.
    pub fn from_config(config: SearchConfig) -> Self {
        let index = Arc::new(FingerprintIndex::new(config.index_strategy));
        Self::new(config, index, Arc::new(RecordStore::new()))
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn index(&self) -> &Arc<FingerprintIndex> {
        &self.index
    }

    pub fn records(&self) -> &Arc<RecordStore> {
        &self.records
    }

    fn threshold(&self) -> Result<SimilarityThreshold> {
        self.config.threshold().inspect_err(|e| {
            error!(error = %e, "Similarity threshold misconfigured");
        })
    }

    /// Stored images within the configured threshold of `fingerprint`.
    pub fn search(&self, fingerprint: Fingerprint) -> Result<Vec<SimilarityMatch>> {
        let threshold = self.threshold()?;
        Ok(self.index.similar_within(fingerprint, threshold))
    }

    /// Fingerprint a decoded image and search for it.
    pub fn search_image(&self, image: &DynamicImage) -> Result<Vec<SimilarityMatch>> {
        let threshold = self.threshold()?;
        let fingerprint = self.hasher.hash_image(image)?;
        Ok(self.index.similar_within(fingerprint, threshold))
    }

    /// Decode raw image bytes, fingerprint them and search.
    pub fn search_bytes(&self, image_data: &[u8]) -> Result<Vec<SimilarityMatch>> {
        let threshold = self.threshold()?;
        let fingerprint = self.hasher.hash_bytes(image_data)?;
        Ok(self.index.similar_within(fingerprint, threshold))
    }

    /// Search and join the matches against the record store.
    ///
    /// Order is preserved. Matches whose record no longer exists are
    /// skipped.
    pub fn search_records(&self, fingerprint: Fingerprint) -> Result<Vec<RecordMatch>> {
        let matches = self.search(fingerprint)?;
        Ok(self.hydrate(&matches))
    }

    /// Join `(image id, distance)` pairs against the record store.
    pub fn hydrate(&self, matches: &[SimilarityMatch]) -> Vec<RecordMatch> {
        matches
            .iter()
            .filter_map(|m| match self.records.get(&m.image_id) {
                Some(record) => Some(RecordMatch {
                    record,
                    distance: m.distance,
                }),
                None => {
                    debug!(image_id = %m.image_id, "Skipping match without record");
                    None
                }
            })
            .collect()
    }
}
