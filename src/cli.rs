//! Command-line interface definitions for coauthors.
//!
//! Global options control logging, configuration and error formatting.
//! Subcommands run pair queries, report dataset status and maintain the
//! result cache.
//!
//! # Example
//!
//! ```bash
//! # Co-authorship matrix between two author lists
//! coauthors query --left "Jane Doe" --left "Ann Poe" --right "Bob Roe"
//!
//! # Read names from files, one per line, and export CSV
//! coauthors query --left-file pc.txt --right-file submitters.txt --output csv
//!
//! # Send a JSON request on stdin
//! echo '{"left":["Jane Doe"],"right":["Bob Roe"]}' | coauthors query --request -
//!
//! # Drop cache entries from previous dataset builds
//! coauthors cache prune --stale
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Co-authorship lookups over a DBLP SQLite dataset.
///
/// Resolves two lists of author names and reports, for every pair, the
/// publications they share.
#[derive(Debug, Parser)]
#[command(name = "coauthors")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: platform config dir / coauthors.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Path to the DBLP SQLite dataset
    #[arg(long, value_name = "PATH", global = true)]
    pub db: Option<PathBuf>,

    /// Path to the result cache database
    #[arg(long, value_name = "PATH", global = true)]
    pub cache_db: Option<PathBuf>,

    /// Report errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Compute the co-authorship matrix between two author lists
    Query(QueryArgs),
    /// Check that the dataset is present and complete
    Health,
    /// Show dataset statistics
    Stats,
    /// Inspect or maintain the result cache
    Cache(CacheArgs),
    /// Print the effective configuration as TOML
    Config,
}

/// Arguments for the query subcommand.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Left-side author (can be specified multiple times)
    #[arg(short, long, value_name = "NAME")]
    pub left: Vec<String>,

    /// Right-side author (can be specified multiple times)
    #[arg(short, long, value_name = "NAME")]
    pub right: Vec<String>,

    /// File with one left-side author entry per line
    #[arg(long, value_name = "PATH")]
    pub left_file: Option<PathBuf>,

    /// File with one right-side author entry per line
    #[arg(long, value_name = "PATH")]
    pub right_file: Option<PathBuf>,

    /// JSON request file, or "-" for stdin
    ///
    /// Names given with --left/--right are appended to the request's lists;
    /// other flags override the request's fields.
    #[arg(long, value_name = "FILE")]
    pub request: Option<PathBuf>,

    /// Maximum publications per pair (1-5000, capped by configuration)
    #[arg(long, value_name = "N")]
    pub limit_per_pair: Option<u32>,

    /// Add fuzzy name matches instead of base-name variants only
    #[arg(long)]
    pub fuzzy: bool,

    /// Maximum fuzzy matches per name (1-5000, capped by configuration)
    #[arg(long, value_name = "N")]
    pub author_limit: Option<u32>,

    /// Only count publications from this year on (1900-2100)
    #[arg(long, value_name = "YEAR")]
    pub year_min: Option<i32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub output: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// Output format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Full result as JSON
    #[default]
    Json,
    /// One row per pair and publication
    Csv,
}

/// Arguments for the cache subcommand.
#[derive(Debug, Args)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache maintenance actions.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Show entry counts and hit totals
    Stats,
    /// Delete stale or idle entries
    Prune(PruneArgs),
    /// Delete every entry
    Clear,
}

/// Arguments for `cache prune`. At least one criterion is required.
#[derive(Debug, Args)]
pub struct PruneArgs {
    /// Delete entries built against a different dataset file
    #[arg(long)]
    pub stale: bool,

    /// Delete entries not used for this many days
    #[arg(long, value_name = "DAYS")]
    pub idle_days: Option<u32>,
}
