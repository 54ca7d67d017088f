//! Configuration for batch runs.
//!
//! `IdeamConfig` controls discovery, concurrency and progress reporting;
//! `BatchParameters` carries the values stamped onto every exported row.
//! Both load from JSON and are overridden field by field from the CLI.

use clap::ValueEnum;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::constants::{
    DEFAULT_CENSOR_CODE, DEFAULT_FILE_PATTERN, DEFAULT_QUALIFIER_CODE, DEFAULT_UTC_OFFSET_HOURS,
};
use crate::error::{IdeamError, Result};

/// Supported compression algorithms for parquet output
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    Snappy,
    Zstd,
    Lz4,
    Uncompressed,
}

impl CompressionAlgorithm {
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Values supplied by the caller for every row of an import batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchParameters {
    /// Local time offset from UTC in hours
    pub utc_offset_hours: i32,
    pub source_id: i64,
    pub quality_control_level_id: i64,
    pub censor_code: String,
    /// Qualifier used for values that carry no quality digit
    pub default_qualifier_code: u8,
}

impl Default for BatchParameters {
    fn default() -> Self {
        Self {
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            source_id: 1,
            quality_control_level_id: 0,
            censor_code: DEFAULT_CENSOR_CODE.to_string(),
            default_qualifier_code: DEFAULT_QUALIFIER_CODE,
        }
    }
}

impl BatchParameters {
    pub fn validate(&self) -> Result<()> {
        if !(-12..=14).contains(&self.utc_offset_hours) {
            return Err(IdeamError::Configuration {
                message: format!(
                    "UTC offset {} is outside -12..=14 hours",
                    self.utc_offset_hours
                ),
            });
        }
        if self.censor_code.trim().is_empty() {
            return Err(IdeamError::Configuration {
                message: "censor code must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeamConfig {
    /// Files decoded concurrently
    pub workers: usize,

    /// Glob pattern matched against file names
    pub file_pattern: String,

    /// Walk subdirectories of the source directory
    pub recursive: bool,

    pub show_progress: bool,

    /// Where to checkpoint the station database between passes
    pub checkpoint_path: Option<PathBuf>,

    /// Compression for parquet output
    pub compression: CompressionAlgorithm,

    pub batch: BatchParameters,
}

impl Default for IdeamConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get(),
            file_pattern: DEFAULT_FILE_PATTERN.to_string(),
            recursive: false,
            show_progress: true,
            checkpoint_path: None,
            compression: CompressionAlgorithm::Snappy,
            batch: BatchParameters::default(),
        }
    }
}

impl IdeamConfig {
    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| IdeamError::Configuration {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        debug!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(IdeamError::Configuration {
                message: "workers must be at least 1".to_string(),
            });
        }
        glob::Pattern::new(&self.file_pattern).map_err(|e| IdeamError::Configuration {
            message: format!("invalid file pattern '{}': {}", self.file_pattern, e),
        })?;
        self.batch.validate()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_file_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.file_pattern = pattern.into();
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Disable progress bars (tests, non-interactive runs)
    pub fn without_progress(mut self) -> Self {
        self.show_progress = false;
        self
    }

    pub fn with_checkpoint(mut self, path: impl Into<PathBuf>) -> Self {
        self.checkpoint_path = Some(path.into());
        self
    }

    pub fn with_compression(mut self, compression: CompressionAlgorithm) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_batch(mut self, batch: BatchParameters) -> Self {
        self.batch = batch;
        self
    }
}
