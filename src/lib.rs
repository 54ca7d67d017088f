//! IDEAM Processor Library
//!
//! Rebuilds per-station hydrology time series from IDEAM fixed-width station
//! bulletins. A bulletin is a sequence of year-blocks; each block carries one
//! station's header and a 31-day by 12-month grid of values plus optional
//! monthly maximum and minimum rows.
//!
//! This library provides:
//! - Fixed-width decoding of value lines with per-value quality digits
//! - A line-offset state machine that scans block headers and value rows
//! - A station database that merges blocks from many files into continuous
//!   daily-mean and monthly max/min series
//! - Pre-flight validation against the target store's lookup catalog
//! - Per-station CSV export and DataValues rows as Parquet, CSV or SQL

pub mod calendar;
pub mod config;
pub mod constants;
pub mod database;
pub mod decoder;
pub mod error;
pub mod export;
pub mod header;
pub mod lookup;
pub mod models;
pub mod preflight;
pub mod processor;
pub mod series;
pub mod variable;

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use config::{BatchParameters, CompressionAlgorithm, IdeamConfig};
pub use database::{StationDatabase, StationRecord};
pub use decoder::PositionTable;
pub use error::{IdeamError, Result};
pub use lookup::{InMemoryCatalog, LookupCatalog};
pub use models::{DecodedValue, SeriesKind, StationCode, StationHeader};
pub use preflight::PreflightReport;
pub use processor::BatchProcessor;
pub use processor::writer::SinkFormat;
pub use series::{DatedSeries, StationSeries};
pub use variable::VariableDescriptor;
