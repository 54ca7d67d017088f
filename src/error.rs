//! Error handling for IDEAM bulletin processing.
//!
//! Field-level decode failures and impossible calendar dates never surface
//! here: they degrade to missing values inside the decoder and aggregator.
//! What remains are file-level failures (unreadable files, malformed block
//! headers), reference-integrity failures at export time, and plumbing errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::preflight::PreflightReport;

#[derive(Error, Debug)]
pub enum IdeamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Source directory not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Header parsing failed in {path} at line {line}: invalid {field} ({reason})")]
    HeaderParsingFailed {
        path: PathBuf,
        line: usize,
        field: &'static str,
        reason: String,
    },

    #[error("Invalid position table: {reason}")]
    InvalidPositionTable { reason: String },

    #[error("Station {code} has no allocated series")]
    UnknownStation { code: u32 },

    #[error("No {entity} found in lookup catalog for '{key}'")]
    MissingReference { entity: &'static str, key: String },

    #[error("Import refused: {}", .report.summary())]
    ImportRefused { report: Box<PreflightReport> },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing failed for {path}: {reason}")]
    ProcessingFailed { path: PathBuf, reason: String },
}

pub type Result<T> = std::result::Result<T, IdeamError>;
