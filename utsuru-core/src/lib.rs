//! Utsuru Core - perceptual image fingerprinting and similarity search
//!
//! This crate reduces images to 64-bit perceptual fingerprints (pHash) and
//! finds previously stored images whose fingerprints lie within a Hamming
//! distance threshold of a query.
//!
//! # Features
//!
//! - DCT-based perceptual hash, robust to re-encoding, resizing and small
//!   brightness changes
//! - Thread-safe fingerprint index with deterministic result ordering
//! - Optional exact multi-index hashing for large collections
//! - Per-owner filename dedup gate and an upload pipeline over a pluggable
//!   blob store
//! - PostgreSQL persistence (`postgres` feature)
//!
//! # Example
//!
//! ```no_run
//! use utsuru_core::{
//!     FingerprintIndex, IndexStrategy, PerceptualHasher, SearchConfig, SimilarityEngine,
//! };
//!
//! # fn example(stored: &[u8], query: &[u8]) -> utsuru_core::Result<()> {
//! let engine = SimilarityEngine::from_config(SearchConfig::with_threshold(10));
//!
//! let hasher = PerceptualHasher::new();
//! let id = uuid::Uuid::new_v4();
//! engine.index().put(id, hasher.hash_bytes(stored)?);
//!
//! for m in engine.search_bytes(query)? {
//!     println!("{} at distance {}", m.image_id, m.distance);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod decode;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod gate;
pub mod index;
pub mod ingest;
pub mod records;

#[cfg(feature = "postgres")]
pub mod postgres;

// Re-export main types for convenience
pub use config::{IndexStrategy, SearchConfig, SimilarityThreshold, THRESHOLD_ENV};
pub use decode::{decode_image, is_supported_extension, SUPPORTED_EXTENSIONS};
pub use engine::{RecordMatch, SimilarityEngine};
pub use error::{Result, UtsuruError};
pub use fingerprint::{hamming_distance, Fingerprint, PerceptualHasher, FINGERPRINT_BITS};
pub use gate::DedupGate;
pub use index::{FingerprintIndex, SimilarityMatch, MAX_INDEXED_THRESHOLD};
pub use ingest::{
    BlobStore, FileOutcome, FsBlobStore, InMemoryBlobStore, IncomingFile, RejectReason, Rejection,
    UploadPipeline, UploadReport,
};
pub use records::{ImageId, ImageRecord, NewImageRecord, RecordLookup, RecordStore};

#[cfg(feature = "postgres")]
pub use postgres::PostgresImageStore;
