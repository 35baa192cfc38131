//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use bulkfetch_core::DEFAULT_CONCURRENCY;
use bulkfetch_core::download::DEFAULT_MAX_RETRIES;

/// Download a batch of files concurrently, resuming partial transfers.
///
/// Targets come from positional URLs, a manifest file (`--input`), or stdin.
/// Manifest lines are `URL`, `FILENAME URL` or `FILENAME URL SIZE`; `#` starts a comment.
#[derive(Parser, Debug, Clone)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (file name taken from the last path segment)
    pub urls: Vec<String>,

    /// Manifest file with one target per line
    #[arg(short = 'i', long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Directory to save downloaded files (default: current directory)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Only consider the first N targets
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub max_files: Option<u64>,

    /// Attempts per file, the first one included (1-20)
    #[arg(short = 'r', long = "retry", default_value_t = DEFAULT_MAX_RETRIES as u8, value_parser = clap::value_parser!(u8).range(1..=20))]
    pub retry: u8,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'w', long = "workers", default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub workers: u8,

    /// Overwrite existing files without asking
    #[arg(long, conflicts_with = "no_skip_existing")]
    pub force: bool,

    /// Ask before overwriting each existing file
    #[arg(long)]
    pub no_skip_existing: bool,

    /// Do not skip existing files whose size matches the server's
    #[arg(long)]
    pub no_smart_check: bool,

    /// Only download files whose name matches this regex (anchored at the start)
    #[arg(long, value_name = "REGEX")]
    pub filter: Option<String>,

    /// Only download (and inventory) files with this extension
    #[arg(short = 'e', long, value_name = "EXT")]
    pub extension: Option<String>,

    /// Per-transfer bandwidth limit in MB/s (0 = unlimited)
    #[arg(short = 't', long, value_name = "MBPS", default_value_t = 0.0)]
    pub throttle: f64,

    /// Stop after the first file settles and save progress for a later run
    #[arg(long)]
    pub pause: bool,

    /// Seconds to let in-flight transfers finish after a pause before aborting them
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(0..=3600))]
    pub pause_grace: Option<u64>,

    /// Remove leftover .part files under the output directory when done
    #[arg(long)]
    pub cleanup: bool,

    /// Connect / first-byte / idle timeout per attempt in seconds (1-3600)
    #[arg(long, value_name = "SECS", default_value_t = 10, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub timeout: u64,

    /// Do not write a download_log_*.txt file into the output directory
    #[arg(long)]
    pub no_log_file: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
