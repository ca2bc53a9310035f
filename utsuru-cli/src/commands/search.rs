//! Search command implementation.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use tracing::{info, warn};
use utsuru_core::{Fingerprint, IndexStrategy, NewImageRecord, SimilarityEngine};

use crate::utils;

/// Owner assigned to every file of a scanned directory.
const LOCAL_OWNER: &str = "local";

#[derive(Serialize)]
struct MatchOutput {
    filename: String,
    url: Option<String>,
    fingerprint: Fingerprint,
    distance: u32,
}

#[derive(Serialize)]
struct SearchOutput {
    query: String,
    fingerprint: Fingerprint,
    threshold: u32,
    strategy: IndexStrategy,
    indexed: usize,
    skipped: usize,
    matches: Vec<MatchOutput>,
}

fn file_url(path: &Path) -> String {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    format!("file://{}", path.display())
}

/// Execute the search command.
pub async fn execute(
    query: PathBuf,
    dir: PathBuf,
    threshold: Option<String>,
    strategy: Option<IndexStrategy>,
    json: bool,
) -> Result<()> {
    let config = utils::search_config(threshold, strategy)?;
    // Fail on a bad threshold before touching any file
    let threshold = config.threshold()?;
    let strategy = config.index_strategy;

    let query_file = utils::fingerprint_file(query).await?;
    let candidates = utils::list_images(&dir)?;
    info!(
        dir = %dir.display(),
        files = candidates.len(),
        %strategy,
        "Indexing directory"
    );

    let engine = SimilarityEngine::from_config(config);
    let mut skipped = 0;
    for result in utils::fingerprint_files(candidates).await? {
        let file = match result {
            Ok(file) => file,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "Skipping file");
                skipped += 1;
                continue;
            }
        };

        let record = engine
            .records()
            .insert(NewImageRecord {
                owner_id: LOCAL_OWNER.to_string(),
                filename: utils::display_name(&file.path),
                size: file.size,
                url: Some(file_url(&file.path)),
                fingerprint: file.fingerprint,
            })
            .with_context(|| format!("Failed to index {}", file.path.display()))?;
        engine.index().put(record.id, record.fingerprint);
    }

    let matches = engine.search_records(query_file.fingerprint)?;
    let indexed = engine.index().len();

    if json {
        let output = SearchOutput {
            query: query_file.path.display().to_string(),
            fingerprint: query_file.fingerprint,
            threshold: threshold.get(),
            strategy,
            indexed,
            skipped,
            matches: matches
                .into_iter()
                .map(|m| MatchOutput {
                    filename: m.record.filename,
                    url: m.record.url,
                    fingerprint: m.record.fingerprint,
                    distance: m.distance,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!(
        "{} {}  {}",
        "Query:".dimmed(),
        query_file.fingerprint,
        query_file.path.display()
    );
    println!(
        "{} {} images, threshold {}, {} strategy",
        "Indexed:".dimmed(),
        indexed,
        threshold,
        strategy
    );
    if skipped > 0 {
        println!(
            "{} {}",
            "Skipped:".dimmed(),
            format!("{} unreadable files", skipped).yellow()
        );
    }
    println!();

    if matches.is_empty() {
        println!("{}", "No similar images found".yellow());
        return Ok(());
    }

    for m in &matches {
        let distance = format!("{:>2}", m.distance);
        let distance = if m.distance == 0 {
            distance.green().bold()
        } else {
            distance.normal()
        };
        println!("  {}  {}  {}", distance, m.record.fingerprint, m.record.filename);
    }

    Ok(())
}
