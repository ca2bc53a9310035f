//! Utsuru CLI - perceptual image fingerprinting and similarity search.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use utsuru_core::IndexStrategy;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

const EXIT_CODES_HELP: &str = "\
Exit codes:
  0   Success
  1   General error
  2   Invalid command-line arguments
  65  Unsupported or corrupt image
  66  Input file or directory not found
  74  I/O error
  78  Configuration error (e.g. PHASH_THRESHOLD unset or invalid)";

#[derive(Parser)]
#[command(name = "utsuru")]
#[command(author, version, about = "Perceptual image fingerprinting and similarity search", long_about = None)]
#[command(after_help = EXIT_CODES_HELP)]
struct Cli {
    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the perceptual fingerprint of one or more images
    Hash {
        /// Image files (jpg, jpeg, png, gif)
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Hamming distance between the fingerprints of two images
    Compare {
        #[arg(value_name = "A")]
        first: PathBuf,

        #[arg(value_name = "B")]
        second: PathBuf,

        /// Similarity threshold (defaults to PHASH_THRESHOLD)
        #[arg(short, long, allow_hyphen_values = true)]
        threshold: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Find images in a directory that look like the query image
    Search {
        /// Query image
        #[arg(value_name = "QUERY")]
        query: PathBuf,

        /// Directory of candidate images
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// Similarity threshold (defaults to PHASH_THRESHOLD)
        #[arg(short, long, allow_hyphen_values = true)]
        threshold: Option<String>,

        /// Index strategy: scan or multi-index (defaults to UTSURU_INDEX_STRATEGY)
        #[arg(short, long)]
        strategy: Option<IndexStrategy>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(Level::WARN.into())
            .from_env_lossy()
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Hash { files, json } => commands::hash::execute(files, json).await,
        Commands::Compare {
            first,
            second,
            threshold,
            json,
        } => commands::compare::execute(first, second, threshold, json).await,
        Commands::Search {
            query,
            dir,
            threshold,
            strategy,
            json,
        } => commands::search::execute(query, dir, threshold, strategy, json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(err) = run(cli.command).await {
        let exit = ExitCode::from_anyhow(&err);
        if let Some(message) = exit.message {
            eprintln!("{} {}", "error:".red().bold(), message);
        }
        std::process::exit(exit.code);
    }
}
