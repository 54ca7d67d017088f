//! Command-line argument definitions for the IDEAM processor

use crate::config::{BatchParameters, CompressionAlgorithm, IdeamConfig};
use crate::error::Result;
use crate::processor::writer::SinkFormat;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Rebuild per-station hydrology series from IDEAM fixed-width bulletins
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ideam",
    version,
    about = "Rebuild per-station daily and monthly series from IDEAM station bulletins",
    long_about = "Reads batches of IDEAM fixed-width station bulletins, merges every year-block \
                  of every station into continuous daily-mean and monthly max/min series, and \
                  writes them as per-station CSV files or as DataValues rows for a hydrology \
                  observations store."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Merge bulletins and write per-station CSV series
    Convert(ConvertArgs),
    /// Scan block headers and report what the lookup catalog is missing
    Explore(ExploreArgs),
    /// Merge bulletins and write DataValues rows
    Import(ImportArgs),
}

/// Flags shared by every subcommand
#[derive(Debug, Clone, ClapArgs)]
pub struct CommonArgs {
    /// Directory holding the bulletin files
    #[arg(value_name = "SOURCE_DIR")]
    pub source: PathBuf,

    /// Number of files decoded concurrently
    #[arg(short = 'j', long = "workers", value_name = "COUNT")]
    pub workers: Option<usize>,

    /// Glob pattern matched against bulletin file names
    #[arg(long = "pattern", value_name = "GLOB")]
    pub pattern: Option<String>,

    /// Walk subdirectories of SOURCE_DIR
    #[arg(short = 'r', long = "recursive")]
    pub recursive: bool,

    /// JSON configuration file; flags override its values
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Write the station database here between the header and value passes
    #[arg(long = "checkpoint", value_name = "FILE")]
    pub checkpoint: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Only show errors. Also hides progress bars.
    #[arg(short = 'q', long = "quiet", conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, Parser)]
pub struct ConvertArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Destination directory for daily_mean/, monthly_max/ and monthly_min/
    #[arg(short = 'o', long = "output", value_name = "DEST_DIR")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Parser)]
pub struct ExploreArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Lookup catalog of the target store (JSON)
    #[arg(long = "catalog", value_name = "FILE")]
    pub catalog: PathBuf,

    #[arg(long = "format", value_enum, default_value = "human")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Parser)]
pub struct ImportArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Lookup catalog of the target store (JSON)
    #[arg(long = "catalog", value_name = "FILE")]
    pub catalog: PathBuf,

    /// File the DataValues rows are written to
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    #[arg(long = "sink", value_enum, default_value = "parquet")]
    pub sink: SinkFormat,

    /// Parquet compression; defaults to the configured algorithm
    #[arg(long = "compression", value_enum)]
    pub compression: Option<CompressionAlgorithm>,

    /// Local time offset from UTC in hours
    #[arg(long = "utc-offset", value_name = "HOURS", allow_negative_numbers = true)]
    pub utc_offset: Option<i32>,

    #[arg(long = "source-id", value_name = "ID")]
    pub source_id: Option<i64>,

    #[arg(long = "quality-level", value_name = "ID")]
    pub quality_level: Option<i64>,

    #[arg(long = "censor-code", value_name = "TERM")]
    pub censor_code: Option<String>,
}

/// Report format for `explore`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

impl Commands {
    pub fn common(&self) -> &CommonArgs {
        match self {
            Commands::Convert(args) => &args.common,
            Commands::Explore(args) => &args.common,
            Commands::Import(args) => &args.common,
        }
    }
}

impl CommonArgs {
    /// Log level implied by the verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Configuration file (if any) with these flags applied on top
    pub fn load_config(&self) -> Result<IdeamConfig> {
        let mut config = match &self.config_file {
            Some(path) => IdeamConfig::from_json_file(path)?,
            None => IdeamConfig::default(),
        };

        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(pattern) = &self.pattern {
            config = config.with_file_pattern(pattern.clone());
        }
        if self.recursive {
            config = config.with_recursive(true);
        }
        if let Some(checkpoint) = &self.checkpoint {
            config = config.with_checkpoint(checkpoint.clone());
        }
        if !self.show_progress() {
            config = config.without_progress();
        }

        config.validate()?;
        Ok(config)
    }
}

impl ImportArgs {
    /// Batch parameters from the configuration, overridden by flags
    pub fn batch_parameters(&self, base: &BatchParameters) -> Result<BatchParameters> {
        let mut batch = base.clone();
        if let Some(offset) = self.utc_offset {
            batch.utc_offset_hours = offset;
        }
        if let Some(source_id) = self.source_id {
            batch.source_id = source_id;
        }
        if let Some(level) = self.quality_level {
            batch.quality_control_level_id = level;
        }
        if let Some(censor_code) = &self.censor_code {
            batch.censor_code = censor_code.clone();
        }
        batch.validate()?;
        Ok(batch)
    }
}
