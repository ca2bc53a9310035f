//! Perceptual image fingerprints.
//!
//! A [`Fingerprint`] is a 64-bit perceptual hash derived purely from pixel
//! content. Two fingerprints are similar when the number of differing bits
//! (their Hamming distance) is at most a configured threshold.
//!
//! # Usage
//!
//! ```no_run
//! use utsuru_core::fingerprint::PerceptualHasher;
//!
//! let bytes = std::fs::read("cat.jpg").unwrap();
//! let hasher = PerceptualHasher::new();
//! let a = hasher.hash_bytes(&bytes).unwrap();
//!
//! let other = std::fs::read("cat-recompressed.jpg").unwrap();
//! let b = hasher.hash_bytes(&other).unwrap();
//!
//! let similar = a.hamming_distance(b) <= 10;
//! ```

pub mod phash;

pub use phash::PerceptualHasher;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, UtsuruError};

/// Fingerprint width in bits.
pub const FINGERPRINT_BITS: u32 = 64;

/// Fingerprint width in bytes.
const FINGERPRINT_SIZE: usize = 8;

/// 64-bit perceptual hash of an image.
///
/// Bit 63 corresponds to the first coefficient in scan order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Number of differing bits between two fingerprints.
    pub const fn hamming_distance(self, other: Self) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    /// Check whether `other` lies within `threshold` bits of this fingerprint.
    pub const fn is_within(self, other: Self, threshold: u32) -> bool {
        self.hamming_distance(other) <= threshold
    }

    pub fn to_bytes(self) -> [u8; FINGERPRINT_SIZE] {
        self.0.to_be_bytes()
    }

    pub fn from_bytes(bytes: [u8; FINGERPRINT_SIZE]) -> Self {
        Self(u64::from_be_bytes(bytes))
    }

    /// Lowercase, zero-padded 16 character hex form.
    pub fn to_hex(self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();
        let trimmed = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        let bytes = hex::decode(trimmed)
            .map_err(|e| UtsuruError::InvalidFingerprint(format!("invalid hex string: {}", e)))?;

        let bytes: [u8; FINGERPRINT_SIZE] = bytes.try_into().map_err(|v: Vec<u8>| {
            UtsuruError::InvalidFingerprint(format!(
                "expected {} bytes, got {}",
                FINGERPRINT_SIZE,
                v.len()
            ))
        })?;

        Ok(Self::from_bytes(bytes))
    }

    /// Bit-cast to a signed integer for storage in `BIGINT` columns.
    pub const fn to_i64(self) -> i64 {
        self.0 as i64
    }

    pub const fn from_i64(value: i64) -> Self {
        Self(value as u64)
    }
}

/// Number of differing bits between two fingerprints.
pub fn hamming_distance(a: Fingerprint, b: Fingerprint) -> u32 {
    a.hamming_distance(b)
}

impl From<u64> for Fingerprint {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Fingerprint> for u64 {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Binary for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Binary::fmt(&self.0, f)
    }
}

impl FromStr for Fingerprint {
    type Err = UtsuruError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
