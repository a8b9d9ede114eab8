//! Command line flags. Every value left unset falls back to the settings file.

use std::path::PathBuf;

use clap::Parser;

/// Fetch missing assets from HTTP directory listings.
///
/// Seeds come from the sources file (created with an example on first run)
/// and from `--seed`. Files whose stem already exists locally are skipped.
#[derive(Parser, Debug)]
#[command(name = "assetfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Directory that receives downloaded files
    #[arg(short, long)]
    pub dest: Option<PathBuf>,

    /// Seed list file, one listing URL per line
    #[arg(short, long)]
    pub sources: Option<PathBuf>,

    /// Additional seed URL (repeatable)
    #[arg(long = "seed", value_name = "URL")]
    pub seeds: Vec<String>,

    /// Additional directory to scan for existing assets (repeatable)
    #[arg(long = "scan", value_name = "DIR")]
    pub scan: Vec<PathBuf>,

    /// Comma separated keywords; only names containing one of them are fetched
    #[arg(short, long)]
    pub include: Option<String>,

    /// Comma separated keywords; names containing any of them are dropped
    #[arg(short = 'x', long)]
    pub exclude: Option<String>,

    /// Number of concurrent workers (defaults to half the available cores)
    #[arg(short, long, value_parser = clap::value_parser!(u16).range(1..=256))]
    pub workers: Option<u16>,

    /// Do not probe remote sizes or check free disk space
    #[arg(long)]
    pub skip_size_check: bool,

    /// Decompress downloaded archives
    #[arg(long)]
    pub decompress: bool,

    /// Delete archives after successful decompression
    #[arg(long)]
    pub delete_archives: bool,

    /// Descend into sub-listings below each seed
    #[arg(short, long)]
    pub recursive: bool,

    /// Answer yes to large-download confirmations
    #[arg(short, long)]
    pub yes: bool,

    /// Settings file (RON)
    #[arg(long, default_value = "assetfetch.ron")]
    pub config: PathBuf,

    /// Directory for the run report
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Also write the live log to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
