//! Hash command implementation.

use std::path::PathBuf;

use anyhow::Result;
use serde::Serialize;
use utsuru_core::Fingerprint;

use crate::utils;

#[derive(Serialize)]
struct HashOutput {
    file: String,
    size: u64,
    fingerprint: Fingerprint,
}

/// Execute the hash command.
pub async fn execute(files: Vec<PathBuf>, json: bool) -> Result<()> {
    let fingerprints = utils::fingerprint_files(files)
        .await?
        .into_iter()
        .collect::<Result<Vec<_>>>()?;

    if json {
        let output: Vec<HashOutput> = fingerprints
            .into_iter()
            .map(|f| HashOutput {
                file: f.path.display().to_string(),
                size: f.size,
                fingerprint: f.fingerprint,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        for f in &fingerprints {
            println!("{}  {}", f.fingerprint, f.path.display());
        }
    }

    Ok(())
}
