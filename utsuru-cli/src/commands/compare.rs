//! Compare command implementation.

use std::path::PathBuf;

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tracing::info;
use utsuru_core::{Fingerprint, FINGERPRINT_BITS};

use crate::utils::{self, FileFingerprint};

#[derive(Serialize)]
struct FileOutput {
    file: String,
    fingerprint: Fingerprint,
}

impl From<&FileFingerprint> for FileOutput {
    fn from(f: &FileFingerprint) -> Self {
        Self {
            file: f.path.display().to_string(),
            fingerprint: f.fingerprint,
        }
    }
}

#[derive(Serialize)]
struct CompareOutput {
    first: FileOutput,
    second: FileOutput,
    distance: u32,
    threshold: Option<u32>,
    similar: Option<bool>,
}

/// Execute the compare command.
///
/// The verdict is only printed when a threshold is configured; a configured
/// but invalid threshold is an error.
pub async fn execute(
    first: PathBuf,
    second: PathBuf,
    threshold: Option<String>,
    json: bool,
) -> Result<()> {
    let config = utils::threshold_config(threshold);
    let threshold = match config.phash_threshold {
        Some(_) => Some(config.threshold()?.get()),
        None => None,
    };

    let (a, b) = tokio::try_join!(
        utils::fingerprint_file(first),
        utils::fingerprint_file(second)
    )?;

    let distance = a.fingerprint.hamming_distance(b.fingerprint);
    let similar = threshold.map(|t| a.fingerprint.is_within(b.fingerprint, t));
    info!(distance, ?threshold, "Compared images");

    if json {
        let output = CompareOutput {
            first: (&a).into(),
            second: (&b).into(),
            distance,
            threshold,
            similar,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("   {} {}  {}", "A:".dimmed(), a.fingerprint, a.path.display());
    println!("   {} {}  {}", "B:".dimmed(), b.fingerprint, b.path.display());
    println!(
        "   {} {} / {}",
        "Distance:".dimmed(),
        distance,
        FINGERPRINT_BITS
    );

    if let (Some(t), Some(similar)) = (threshold, similar) {
        let verdict = if similar {
            "SIMILAR".green().bold()
        } else {
            "DIFFERENT".red().bold()
        };
        println!("   {} {}", verdict, format!("(threshold {})", t).dimmed());
    }

    Ok(())
}
