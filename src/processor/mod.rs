//! Multi-file merger.
//!
//! Runs the two passes over a batch of bulletins:
//!
//! 1. header pass: every file is scanned for station headers, which are merged
//!    into the `StationDatabase`
//! 2. allocation: once all headers are in, each station's series are allocated
//!    over its full registration span
//! 3. value pass: every file that survived the header pass is decoded again and
//!    its values are routed into the allocated series
//!
//! Files are read on the blocking pool, `workers` at a time, and results are
//! consumed in discovery order on the calling task, which is the only writer of
//! the database. Cancellation is checked between files.

pub mod discovery;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::discovery::FileDiscovery;
use self::writer::{SinkFormat, write_data_values, write_station_csvs};

use crate::config::IdeamConfig;
use crate::database::StationDatabase;
use crate::decoder::PositionTable;
use crate::error::{IdeamError, Result};
use crate::export::build_rows;
use crate::header::{FileHeaderScan, FileValues, scan_headers, scan_values};
use crate::lookup::LookupCatalog;
use crate::models::{FileFailure, ProcessingStats};
use crate::preflight::{PreflightReport, explore_batch};

use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of a merge run
#[derive(Debug)]
pub struct MergeOutcome {
    pub database: StationDatabase,
    pub stats: ProcessingStats,
    pub failures: Vec<FileFailure>,
    /// Header scans of the files that passed the header pass
    pub scans: Vec<FileHeaderScan>,
    /// Files not processed in the pass that was cancelled
    pub pending_files: Vec<PathBuf>,
    pub cancelled: bool,
}

impl MergeOutcome {
    fn empty() -> Self {
        Self {
            database: StationDatabase::new(),
            stats: ProcessingStats::default(),
            failures: Vec::new(),
            scans: Vec::new(),
            pending_files: Vec::new(),
            cancelled: false,
        }
    }
}

/// Result of a header-only exploration
#[derive(Debug)]
pub struct ExploreOutcome {
    pub report: PreflightReport,
    pub failures: Vec<FileFailure>,
    pub files_discovered: usize,
    pub pending_files: Vec<PathBuf>,
    pub cancelled: bool,
}

/// Result of an import run
#[derive(Debug)]
pub struct ImportOutcome {
    pub merge: MergeOutcome,
    pub report: PreflightReport,
    pub rows_written: usize,
}

fn failure_from_error(path: &Path, error: &IdeamError) -> FileFailure {
    let line = match error {
        IdeamError::HeaderParsingFailed { line, .. } => Some(*line),
        _ => None,
    };
    FileFailure {
        path: path.to_path_buf(),
        line,
        reason: error.to_string(),
    }
}

fn join_failure(path: &Path, error: task::JoinError) -> IdeamError {
    IdeamError::ProcessingFailed {
        path: path.to_path_buf(),
        reason: format!("worker task failed: {}", error),
    }
}

/// Processor for one batch of IDEAM bulletins
#[derive(Debug)]
pub struct BatchProcessor {
    source_path: PathBuf,
    config: IdeamConfig,
    position_table: PositionTable,
    cancellation: CancellationToken,
}

impl BatchProcessor {
    pub fn new(source_path: PathBuf) -> Result<Self> {
        if !source_path.is_dir() {
            return Err(IdeamError::SourceNotFound { path: source_path });
        }

        Ok(Self {
            source_path,
            config: IdeamConfig::default(),
            position_table: PositionTable::ideam(),
            cancellation: CancellationToken::new(),
        })
    }

    pub fn with_config(mut self, config: IdeamConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_position_table(mut self, table: PositionTable) -> Self {
        self.position_table = table;
        self
    }

    /// Token checked between files; cancelling it stops the current pass
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn config(&self) -> &IdeamConfig {
        &self.config
    }

    pub async fn discover_files(&self) -> Result<Vec<PathBuf>> {
        let mut discovery = FileDiscovery::new(
            self.source_path.clone(),
            &self.config.file_pattern,
            self.config.recursive,
        )?;
        discovery.discover_bulletin_files().await
    }

    fn progress_bar(&self, len: usize, message: &'static str) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) = ProgressStyle::default_bar().template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message(message);
        pb
    }

    /// Scan headers of `files` into `outcome`. Returns false when cancelled.
    async fn header_pass(&self, files: &[PathBuf], outcome: &mut MergeOutcome) -> bool {
        let table = self.position_table;
        let pb = self.progress_bar(files.len(), "Scanning headers");
        let mut results = stream::iter(files.iter().cloned())
            .map(|path| async move {
                let task_path = path.clone();
                let result = task::spawn_blocking(move || scan_headers(&task_path, &table))
                    .await
                    .unwrap_or_else(|e| Err(join_failure(&path, e)));
                (path, result)
            })
            .buffered(self.config.workers.max(1));

        let mut consumed = 0;
        while let Some((path, result)) = results.next().await {
            if self.cancellation.is_cancelled() {
                break;
            }
            consumed += 1;
            pb.inc(1);

            match result {
                Ok(scan) => {
                    outcome.database.merge_scan(&scan);
                    outcome.stats.blocks_scanned += scan.blocks.len();
                    outcome.scans.push(scan);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    outcome.failures.push(failure_from_error(&path, &e));
                    outcome.stats.files_failed += 1;
                }
            }
        }

        if consumed < files.len() {
            info!("Header pass cancelled after {} of {} files", consumed, files.len());
            outcome.pending_files = files[consumed..].to_vec();
            outcome.cancelled = true;
            pb.abandon_with_message("Header pass cancelled");
            return false;
        }

        pb.finish_with_message("Headers scanned");
        true
    }

    /// Decode values of every scanned file into the allocated series
    async fn value_pass(&self, outcome: &mut MergeOutcome) {
        let files: Vec<PathBuf> = outcome.scans.iter().map(|scan| scan.path.clone()).collect();
        let table = self.position_table;
        let pb = self.progress_bar(files.len(), "Decoding values");

        let mut results = stream::iter(files.iter().cloned())
            .map(|path| async move {
                let task_path = path.clone();
                let result = task::spawn_blocking(move || scan_values(&task_path, &table))
                    .await
                    .unwrap_or_else(|e| Err(join_failure(&path, e)));
                (path, result)
            })
            .buffered(self.config.workers.max(1));

        let mut consumed = 0;
        while let Some((path, result)) = results.next().await {
            if self.cancellation.is_cancelled() {
                break;
            }
            consumed += 1;
            pb.inc(1);

            match result {
                Ok(values) => self.apply_file(&values, outcome),
                Err(e) => {
                    warn!("Skipping values of {}: {}", path.display(), e);
                    outcome.failures.push(failure_from_error(&path, &e));
                    outcome.stats.files_failed += 1;
                }
            }
        }

        if consumed < files.len() {
            info!("Value pass cancelled after {} of {} files", consumed, files.len());
            outcome.pending_files = files[consumed..].to_vec();
            outcome.cancelled = true;
            pb.abandon_with_message("Value pass cancelled");
        } else {
            pb.finish_with_message("Values decoded");
        }
    }

    fn apply_file(&self, values: &FileValues, outcome: &mut MergeOutcome) {
        let mut file_ok = true;
        for block in &values.blocks {
            match outcome.database.apply_block(block) {
                Ok(applied) => {
                    outcome.stats.values_written += applied.written;
                    outcome.stats.values_dropped += applied.dropped;
                }
                Err(e) => {
                    warn!("{}: {}", values.path.display(), e);
                    if file_ok {
                        outcome.failures.push(failure_from_error(&values.path, &e));
                        file_ok = false;
                    }
                }
            }
        }
        if file_ok {
            outcome.stats.files_processed += 1;
        } else {
            outcome.stats.files_failed += 1;
        }
    }

    /// Discover, scan headers, allocate, then decode values
    pub async fn merge(&self) -> Result<MergeOutcome> {
        let files = self.discover_files().await?;
        self.merge_files(&files).await
    }

    /// Merge an explicit list of files, in the order given
    pub async fn merge_files(&self, files: &[PathBuf]) -> Result<MergeOutcome> {
        let start_time = Instant::now();
        let mut outcome = MergeOutcome::empty();
        outcome.stats.files_discovered = files.len();

        if files.is_empty() {
            info!("No bulletin files to merge");
            return Ok(outcome);
        }

        if self.header_pass(files, &mut outcome).await {
            self.allocate_and_checkpoint(&mut outcome)?;
            self.value_pass(&mut outcome).await;
        }

        outcome.stats.stations = outcome.database.len();
        outcome.stats.processing_time_ms = start_time.elapsed().as_millis();
        info!(
            "Merged {} files into {} stations ({} values, {} dropped, {} failures)",
            outcome.stats.files_processed,
            outcome.stats.stations,
            outcome.stats.values_written,
            outcome.stats.values_dropped,
            outcome.failures.len()
        );
        Ok(outcome)
    }

    fn allocate_and_checkpoint(&self, outcome: &mut MergeOutcome) -> Result<()> {
        outcome.database.allocate_series();
        if let Some(path) = &self.config.checkpoint_path {
            outcome.database.save_checkpoint(path)?;
        }
        Ok(())
    }

    /// Header pass plus pre-flight report, without decoding any values
    pub async fn explore(&self, catalog: &dyn LookupCatalog) -> Result<ExploreOutcome> {
        let files = self.discover_files().await?;
        let mut outcome = MergeOutcome::empty();
        self.header_pass(&files, &mut outcome).await;

        let report = explore_batch(&outcome.scans, catalog, self.config.batch.default_qualifier_code);
        debug!("Pre-flight: {}", report.summary());

        Ok(ExploreOutcome {
            report,
            failures: outcome.failures,
            files_discovered: files.len(),
            pending_files: outcome.pending_files,
            cancelled: outcome.cancelled,
        })
    }

    /// Merge and write per-station CSV series under `output_dir`. Nothing is
    /// written when the merge was cancelled.
    pub async fn convert(&self, output_dir: &Path) -> Result<(MergeOutcome, usize)> {
        let mut outcome = self.merge().await?;
        if outcome.cancelled {
            return Ok((outcome, 0));
        }

        let database = std::mem::take(&mut outcome.database);
        let output = output_dir.to_path_buf();
        let (database, written) = task::spawn_blocking(move || {
            let written = write_station_csvs(&database, &output);
            (database, written)
        })
        .await
        .map_err(|e| join_failure(output_dir, e))?;
        outcome.database = database;

        Ok((outcome, written?))
    }

    /// Pre-flight, merge, and write DataValues rows to `output`. Refuses to
    /// decode or write anything while the catalog is incomplete.
    pub async fn import(
        &self,
        catalog: &dyn LookupCatalog,
        output: &Path,
        format: SinkFormat,
    ) -> Result<ImportOutcome> {
        self.config.batch.validate()?;
        let start_time = Instant::now();
        let files = self.discover_files().await?;

        let mut merge = MergeOutcome::empty();
        merge.stats.files_discovered = files.len();

        if !self.header_pass(&files, &mut merge).await {
            merge.stats.stations = merge.database.len();
            return Ok(ImportOutcome {
                report: explore_batch(&merge.scans, catalog, self.config.batch.default_qualifier_code),
                merge,
                rows_written: 0,
            });
        }

        let report = explore_batch(&merge.scans, catalog, self.config.batch.default_qualifier_code);
        if !report.is_importable() {
            warn!("Import refused: {}", report.summary());
            return Err(IdeamError::ImportRefused {
                report: Box::new(report),
            });
        }

        self.allocate_and_checkpoint(&mut merge)?;
        self.value_pass(&mut merge).await;
        merge.stats.stations = merge.database.len();

        let rows_written = if merge.cancelled {
            0
        } else {
            let rows = build_rows(&merge.database, catalog, &self.config.batch)?;
            let path = output.to_path_buf();
            let compression = self.config.compression;
            task::spawn_blocking(move || write_data_values(&rows, &path, format, compression))
                .await
                .map_err(|e| join_failure(output, e))??
        };

        merge.stats.processing_time_ms = start_time.elapsed().as_millis();
        info!("Imported {} rows into {}", rows_written, output.display());
        Ok(ImportOutcome {
            merge,
            report,
            rows_written,
        })
    }
}
