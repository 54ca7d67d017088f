//! Core data structures shared across the pipeline.
//!
//! Station identity and metadata, decoded field values, series kinds,
//! per-file failures and processing statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use crate::constants::{DAILY_MEAN_DIR, MONTHLY_MAX_DIR, MONTHLY_MIN_DIR};
use crate::variable::VariableDescriptor;

/// IDEAM station code
pub type StationCode = u32;

/// Station identity and metadata taken from the first block header seen
/// for a code. Only `registration_years` grows afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationHeader {
    pub code: StationCode,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: i32,
    pub station_type: String,
    pub river: Option<String>,
    pub department: String,
    pub municipality: String,
    pub variable: Option<VariableDescriptor>,
    pub registration_years: BTreeSet<i32>,
}

impl StationHeader {
    /// First and last registration year, if any were recorded
    pub fn year_span(&self) -> Option<(i32, i32)> {
        let first = *self.registration_years.first()?;
        let last = *self.registration_years.last()?;
        Some((first, last))
    }

    /// Fold another header for the same code into this one
    pub fn absorb_years(&mut self, other: &StationHeader) {
        self.registration_years
            .extend(other.registration_years.iter().copied());
    }
}

/// One decoded month field: value plus optional single-digit quality code
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DecodedValue {
    pub value: Option<f64>,
    pub quality: Option<u8>,
}

impl DecodedValue {
    pub const MISSING: DecodedValue = DecodedValue {
        value: None,
        quality: None,
    };

    pub fn new(value: f64, quality: Option<u8>) -> Self {
        Self {
            value: Some(value),
            quality,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }
}

/// The three series every station carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SeriesKind {
    DailyMean,
    MonthlyMax,
    MonthlyMin,
}

impl SeriesKind {
    pub const ALL: [SeriesKind; 3] = [
        SeriesKind::DailyMean,
        SeriesKind::MonthlyMax,
        SeriesKind::MonthlyMin,
    ];

    /// Label used in exported column names
    pub fn label(&self) -> &'static str {
        match self {
            SeriesKind::DailyMean => "DailyMean",
            SeriesKind::MonthlyMax => "MonthlyMax",
            SeriesKind::MonthlyMin => "MonthlyMin",
        }
    }

    /// Sub-directory of the CSV export holding this kind
    pub fn output_dir(&self) -> &'static str {
        match self {
            SeriesKind::DailyMean => DAILY_MEAN_DIR,
            SeriesKind::MonthlyMax => MONTHLY_MAX_DIR,
            SeriesKind::MonthlyMin => MONTHLY_MIN_DIR,
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A file that could not be ingested, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub line: Option<usize>,
    pub reason: String,
}

/// Processing statistics
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub stations: usize,
    pub blocks_scanned: usize,
    pub values_written: usize,
    /// Values dropped because their day does not exist in that month
    pub values_dropped: usize,
    pub processing_time_ms: u128,
}
