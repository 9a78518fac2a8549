//! Command-line argument definitions for precip-grid
//!
//! Uses the clap derive API. Global options (store location and verbosity)
//! apply to every subcommand.

use crate::config::{EmptyRowPolicy, ImportConfig};
use crate::constants::DEFAULT_PAGE_SIZE;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the precipitation grid importer
#[derive(Debug, Clone, Parser)]
#[command(
    name = "precip-grid",
    version,
    about = "Import gridded precipitation text files into a queryable Parquet store",
    long_about = "Reads text files carrying a [Years=FROM-TO] header followed by Grid-ref \
                  blocks of monthly values, flattens every value into a dated record and \
                  stores it under the file's name. Re-importing a file replaces its records \
                  atomically."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Directory of the Parquet store
    ///
    /// Defaults to <data dir>/precip-grid/store, created on first use.
    #[arg(long = "store", value_name = "DIR", global = true)]
    pub store: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        conflicts_with = "verbose",
        help = "Suppress output except errors"
    )]
    pub quiet: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Import one or more grid files, replacing earlier imports of the same name
    Import(ImportArgs),
    /// Show the records of an imported file page by page
    Show(ShowArgs),
    /// List imported files
    List,
    /// Export the records of an imported file to Parquet
    Export(ExportArgs),
}

#[derive(Debug, Clone, Parser)]
pub struct ImportArgs {
    /// Files or glob patterns to import
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<String>,

    /// Logical name to store the file under (single file only)
    ///
    /// Defaults to the file name of each path.
    #[arg(short = 'n', long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Drop data lines that contain no numbers instead of keeping empty rows
    #[arg(long = "skip-empty-rows")]
    pub skip_empty_rows: bool,

    /// Fail on files without a Years header instead of clearing the stored file
    #[arg(long = "require-years")]
    pub require_years: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct ShowArgs {
    /// Logical file name given at import time
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Records per page
    #[arg(short = 'l', long = "limit", value_name = "N", default_value_t = DEFAULT_PAGE_SIZE)]
    pub limit: usize,

    /// Number of pages to show; all pages when omitted
    #[arg(short = 'p', long = "pages", value_name = "K")]
    pub pages: Option<usize>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "human")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct ExportArgs {
    /// Logical file name given at import time
    #[arg(value_name = "NAME")]
    pub name: String,

    /// Parquet file to write
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,
}

/// Output format options for the show command
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    Human,
    /// One JSON object per record
    JsonLines,
    /// CSV with a header row
    Csv,
}

impl Args {
    /// Log level derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }

    /// Whether progress spinners and summaries should be drawn
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }
}

impl ImportArgs {
    /// Import configuration selected by the flags
    pub fn import_config(&self) -> ImportConfig {
        let mut config = ImportConfig::default();
        if self.skip_empty_rows {
            config = config.with_empty_rows(EmptyRowPolicy::Skip);
        }
        if self.require_years {
            config = config.with_require_years();
        }
        config
    }
}
