//! Command-line argument definitions for the data-mart normalizer
//!
//! The CLI surface is deliberately thin: everything that describes the
//! sources lives in the config file; the flags here only pick the run
//! mode and override the two directories.

use crate::{Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// CLI arguments for the EGASA data-mart normalizer
///
/// Normalizes the utility's irregular spreadsheet exports (generation,
/// hydrology, billing, contracts, energy balance) into a clean
/// long-format CSV data mart consumed by the reporting dashboard.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "egasa_datamart",
    version,
    about = "Normalize EGASA spreadsheet exports into a long-format CSV data mart",
    long_about = "Batch tool that locates header rows inside loosely structured .xlsx \
                  exports, reshapes wide month-column layouts into long per-period \
                  records, reconciles plant names against the canonical reference, \
                  validates each table against its declared schema and persists the \
                  result atomically into the data-mart directory."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the full normalization pipeline (default command)
    Run(RunArgs),
    /// Print the canonical plant reference table
    Plants(PlantsArgs),
    /// Show which landing file each configured source pattern matches
    Sources(SourcesArgs),
}

/// Arguments for the run command (the ETL itself)
#[derive(Debug, Clone, Parser)]
pub struct RunArgs {
    /// Base directory the configured relative paths resolve against
    ///
    /// Defaults to the current working directory. The config file is
    /// also looked up here (config.yml, then config.toml).
    #[arg(
        long = "base-dir",
        value_name = "PATH",
        help = "Base directory for relative paths and implicit config lookup"
    )]
    pub base_dir: Option<PathBuf>,

    /// Path to the configuration file (YAML or TOML)
    ///
    /// When omitted, config.yml / config.toml next to the base
    /// directory are tried; absent both, built-in defaults apply.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        help = "Path to configuration file (.yml or .toml)"
    )]
    pub config_file: Option<PathBuf>,

    /// Landing directory holding the raw source workbooks
    #[arg(
        short = 'i',
        long = "input",
        value_name = "PATH",
        help = "Landing directory with the raw .xlsx exports"
    )]
    pub input_dir: Option<PathBuf>,

    /// Output (data mart) directory for the normalized CSV tables
    #[arg(
        short = 'o',
        long = "output",
        value_name = "PATH",
        help = "Data-mart directory for the normalized CSV tables"
    )]
    pub output_dir: Option<PathBuf>,

    /// Restrict the 15-minute interval output to one YYYYMM partition
    #[arg(
        long = "month",
        value_name = "YYYYMM",
        help = "Only write the 15-minute partition for this month"
    )]
    pub month: Option<String>,

    /// Overwrite existing 15-minute partitions instead of merging
    ///
    /// By default fresh interval rows are folded into the partition
    /// already on disk, deduplicating on the natural key. This flag
    /// replaces the partition file wholesale.
    #[arg(long = "force", help = "Replace existing partitions instead of merging")]
    pub force: bool,

    /// Continue past schema validation failures
    ///
    /// Validation reports are persisted either way; without this flag a
    /// failing table aborts the run (strict mode).
    #[arg(
        long = "no-strict",
        help = "Warn instead of aborting when schema validation fails"
    )]
    pub no_strict: bool,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: debug, -vv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output except errors
    #[arg(
        short = 'q',
        long = "quiet",
        help = "Suppress output except errors",
        conflicts_with = "verbose"
    )]
    pub quiet: bool,

    /// Output format for the final run summary
    #[arg(
        long = "output-format",
        value_enum,
        default_value = "human",
        help = "Output format for the run summary"
    )]
    pub output_format: OutputFormat,
}

/// Arguments for the plants command (reference table report)
#[derive(Debug, Clone, Parser)]
pub struct PlantsArgs {
    /// Base directory the configured relative paths resolve against
    #[arg(long = "base-dir", value_name = "PATH")]
    pub base_dir: Option<PathBuf>,

    /// Path to the configuration file (YAML or TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Output format for the plant report
    #[arg(
        long = "format",
        value_enum,
        default_value = "human",
        help = "Output format for the plant report"
    )]
    pub output_format: OutputFormat,
}

/// Arguments for the sources command (pattern-match diagnostics)
#[derive(Debug, Clone, Parser)]
pub struct SourcesArgs {
    /// Base directory the configured relative paths resolve against
    #[arg(long = "base-dir", value_name = "PATH")]
    pub base_dir: Option<PathBuf>,

    /// Path to the configuration file (YAML or TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Landing directory holding the raw source workbooks
    #[arg(short = 'i', long = "input", value_name = "PATH")]
    pub input_dir: Option<PathBuf>,
}

/// Output format for command results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable terminal output
    Human,
    /// Machine-readable JSON
    Json,
}

impl RunArgs {
    /// Log level derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        }
    }

    /// Whether terminal progress reporting should be shown
    pub fn show_progress(&self) -> bool {
        !self.quiet && self.output_format == OutputFormat::Human
    }

    /// Validate flag combinations before any work starts
    pub fn validate(&self) -> Result<()> {
        if let Some(month) = &self.month {
            if month.len() != 6 || !month.chars().all(|c| c.is_ascii_digit()) {
                return Err(Error::configuration(format!(
                    "--month must be a six-digit YYYYMM value, got '{}'",
                    month
                )));
            }
            let mm: u32 = month[4..6].parse().unwrap_or(0);
            if !(1..=12).contains(&mm) {
                return Err(Error::configuration(format!(
                    "--month '{}' has an out-of-range month part",
                    month
                )));
            }
        }
        Ok(())
    }
}
