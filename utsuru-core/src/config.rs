//! Search configuration.
//!
//! The similarity threshold is kept as the raw configured string and parsed
//! on every query, so a missing or malformed value fails the query with
//! [`UtsuruError::Configuration`] instead of silently returning no matches.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UtsuruError};

/// Environment variable holding the similarity threshold.
pub const THRESHOLD_ENV: &str = "PHASH_THRESHOLD";

/// Environment variable selecting the index strategy.
pub const INDEX_STRATEGY_ENV: &str = "UTSURU_INDEX_STRATEGY";

/// Maximum Hamming distance for two fingerprints to count as similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SimilarityThreshold(u32);

impl SimilarityThreshold {
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Parse a configured threshold string.
    pub fn parse(raw: &str) -> Result<Self> {
        let value: i64 = raw.trim().parse().map_err(|_| {
            UtsuruError::Configuration(format!(
                "{} must be a non-negative integer, got {:?}",
                THRESHOLD_ENV, raw
            ))
        })?;

        u32::try_from(value).map(Self).map_err(|_| {
            UtsuruError::Configuration(format!(
                "{} must be a non-negative integer, got {}",
                THRESHOLD_ENV, value
            ))
        })
    }
}

impl fmt::Display for SimilarityThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How the fingerprint index answers similarity queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexStrategy {
    /// Compare the query against every stored fingerprint.
    #[default]
    FullScan,
    /// Exact multi-index hashing over 16-bit fingerprint chunks.
    MultiIndex,
}

impl FromStr for IndexStrategy {
    type Err = UtsuruError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scan" | "full-scan" => Ok(Self::FullScan),
            "multi-index" | "mih" => Ok(Self::MultiIndex),
            other => Err(UtsuruError::Configuration(format!(
                "unknown index strategy {:?} (expected 'scan' or 'multi-index')",
                other
            ))),
        }
    }
}

impl fmt::Display for IndexStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FullScan => write!(f, "scan"),
            Self::MultiIndex => write!(f, "multi-index"),
        }
    }
}

/// Configuration consumed by the similarity engine.
#[derive(Debug, Clone, Default)]
pub struct SearchConfig {
    /// Raw threshold value as configured (None = unset)
    pub phash_threshold: Option<String>,
    /// Index strategy for newly built indexes
    pub index_strategy: IndexStrategy,
}

impl SearchConfig {
    /// Configuration with a known-good threshold (tests, embedding callers).
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            phash_threshold: Some(threshold.to_string()),
            index_strategy: IndexStrategy::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Only captures the raw values; validation happens per query.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(None, None)
    }

    /// Load configuration, with explicit values taking precedence.
    ///
    /// The environment is only read for values not given here, so a bad
    /// `UTSURU_INDEX_STRATEGY` is ignored when `strategy` is `Some`.
    pub fn from_env_with(
        threshold: Option<String>,
        strategy: Option<IndexStrategy>,
    ) -> Result<Self> {
        let index_strategy = match strategy {
            Some(strategy) => strategy,
            None => match std::env::var(INDEX_STRATEGY_ENV) {
                Ok(v) if !v.trim().is_empty() => v.parse()?,
                _ => IndexStrategy::default(),
            },
        };

        Ok(Self {
            phash_threshold: threshold.or_else(|| std::env::var(THRESHOLD_ENV).ok()),
            index_strategy,
        })
    }

    /// Threshold-only configuration. The strategy variable is never read.
    pub fn threshold_from_env(threshold: Option<String>) -> Self {
        Self {
            phash_threshold: threshold.or_else(|| std::env::var(THRESHOLD_ENV).ok()),
            index_strategy: IndexStrategy::default(),
        }
    }

    pub fn strategy(mut self, strategy: IndexStrategy) -> Self {
        self.index_strategy = strategy;
        self
    }

    /// Resolve the configured threshold.
    pub fn threshold(&self) -> Result<SimilarityThreshold> {
        match self.phash_threshold.as_deref() {
            Some(raw) => SimilarityThreshold::parse(raw),
            None => Err(UtsuruError::Configuration(format!(
                "{} is not set",
                THRESHOLD_ENV
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_threshold() {
        assert_eq!(SimilarityThreshold::parse("10").unwrap().get(), 10);
        assert_eq!(SimilarityThreshold::parse(" 0 ").unwrap().get(), 0);
    }

    #[test]
    fn test_parse_threshold_rejects_garbage() {
        for raw in ["", "ten", "1.5", "-1", "99999999999999999999"] {
            let err = SimilarityThreshold::parse(raw).unwrap_err();
            assert!(err.is_configuration(), "{:?} should be rejected", raw);
        }
    }

    #[test]
    fn test_unset_threshold_is_error() {
        let config = SearchConfig::default();
        let err = config.threshold().unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains(THRESHOLD_ENV));
    }

    #[test]
    fn test_with_threshold() {
        let config = SearchConfig::with_threshold(7);
        assert_eq!(config.threshold().unwrap(), SimilarityThreshold::new(7));
        assert_eq!(config.index_strategy, IndexStrategy::FullScan);
    }

    #[test]
    fn test_explicit_values_skip_environment() {
        let config =
            SearchConfig::from_env_with(Some("3".into()), Some(IndexStrategy::MultiIndex))
                .unwrap();
        assert_eq!(config.threshold().unwrap().get(), 3);
        assert_eq!(config.index_strategy, IndexStrategy::MultiIndex);

        let config = SearchConfig::threshold_from_env(Some("12".into()));
        assert_eq!(config.threshold().unwrap().get(), 12);
    }

    #[test]
    fn test_index_strategy_parse() {
        assert_eq!(
            "scan".parse::<IndexStrategy>().unwrap(),
            IndexStrategy::FullScan
        );
        assert_eq!(
            "Multi-Index".parse::<IndexStrategy>().unwrap(),
            IndexStrategy::MultiIndex
        );
        assert!("btree".parse::<IndexStrategy>().is_err());
    }

    #[test]
    fn test_index_strategy_display_roundtrip() {
        for s in [IndexStrategy::FullScan, IndexStrategy::MultiIndex] {
            assert_eq!(s.to_string().parse::<IndexStrategy>().unwrap(), s);
        }
    }
}
