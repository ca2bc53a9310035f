//! Common utility functions shared across CLI commands.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use utsuru_core::{
    is_supported_extension, Fingerprint, IndexStrategy, PerceptualHasher, SearchConfig,
};

/// A fingerprinted file on disk.
#[derive(Debug, Clone)]
pub struct FileFingerprint {
    pub path: PathBuf,
    pub size: u64,
    pub fingerprint: Fingerprint,
}

/// File name of `path` for display.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn fingerprint_blocking(path: PathBuf) -> Result<FileFingerprint> {
    let bytes = std::fs::read(&path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    let fingerprint = PerceptualHasher::new()
        .hash_bytes(&bytes)
        .with_context(|| format!("Unsupported or corrupt image: {}", path.display()))?;

    debug!(path = %path.display(), bytes = bytes.len(), %fingerprint, "Fingerprinted file");
    Ok(FileFingerprint {
        path,
        size: bytes.len() as u64,
        fingerprint,
    })
}

/// Read and fingerprint a single file on the blocking pool.
pub async fn fingerprint_file(path: PathBuf) -> Result<FileFingerprint> {
    tokio::task::spawn_blocking(move || fingerprint_blocking(path)).await?
}

/// Fingerprint files concurrently. Results are returned in input order.
pub async fn fingerprint_files(paths: Vec<PathBuf>) -> Result<Vec<Result<FileFingerprint>>> {
    let handles: Vec<_> = paths
        .into_iter()
        .map(|path| tokio::task::spawn_blocking(move || fingerprint_blocking(path)))
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await?);
    }
    Ok(results)
}

/// Supported image files directly inside `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Failed to read directory: {}", dir.display()))?
            .path();
        let supported = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(is_supported_extension);
        if supported && path.is_file() {
            paths.push(path);
        }
    }

    paths.sort();
    Ok(paths)
}

/// Search configuration from the environment, overridden by command-line flags.
pub fn search_config(
    threshold: Option<String>,
    strategy: Option<IndexStrategy>,
) -> Result<SearchConfig> {
    Ok(SearchConfig::from_env_with(threshold, strategy)?)
}

/// Threshold from the flag or the environment, for commands without an index.
pub fn threshold_config(threshold: Option<String>) -> SearchConfig {
    SearchConfig::threshold_from_env(threshold)
}
