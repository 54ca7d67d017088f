//! Command implementations for the IDEAM processor
//!
//! Each subcommand:
//! 1. sets up logging and loads configuration (file, then flags)
//! 2. builds a `BatchProcessor` wired to the shutdown token
//! 3. runs its pipeline and prints a summary to stdout
//!
//! The returned value is the process exit status.

use crate::cli::args::{Args, Commands, CommonArgs, ConvertArgs, ExploreArgs, ImportArgs, OutputFormat};
use crate::config::IdeamConfig;
use crate::lookup::InMemoryCatalog;
use crate::models::{FileFailure, ProcessingStats};
use crate::preflight::PreflightReport;
use crate::processor::{BatchProcessor, MergeOutcome};

use anyhow::{Context, Result};
use colored::*;
use indicatif::HumanDuration;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Exit status when a run was interrupted
pub const EXIT_INTERRUPTED: i32 = 130;

/// Run the selected subcommand
pub async fn run(args: Args, cancellation: CancellationToken) -> Result<i32> {
    let command = args.command.context("no command given")?;
    setup_logging(command.common());
    debug!("Command line arguments: {:?}", command);

    match command {
        Commands::Convert(args) => run_convert(args, cancellation).await,
        Commands::Explore(args) => run_explore(args, cancellation).await,
        Commands::Import(args) => run_import(args, cancellation).await,
    }
}

/// Set up structured logging based on the verbosity flags
fn setup_logging(common: &CommonArgs) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = common.get_log_level();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ideam_processor={}", log_level)));

    if common.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

fn build_processor(
    common: &CommonArgs,
    config: IdeamConfig,
    cancellation: CancellationToken,
) -> Result<BatchProcessor> {
    let processor = BatchProcessor::new(common.source.clone())
        .with_context(|| format!("cannot open source directory {}", common.source.display()))?
        .with_config(config)
        .with_cancellation(cancellation);
    Ok(processor)
}

fn load_catalog(path: &Path) -> Result<InMemoryCatalog> {
    InMemoryCatalog::from_json_file(path)
        .with_context(|| format!("cannot load lookup catalog {}", path.display()))
}

async fn run_convert(args: ConvertArgs, cancellation: CancellationToken) -> Result<i32> {
    let config = args.common.load_config()?;
    info!("Converting bulletins in {}", args.common.source.display());

    let processor = build_processor(&args.common, config, cancellation)?;
    let (outcome, written) = processor
        .convert(&args.output)
        .await
        .context("conversion failed")?;

    print_merge_summary("IDEAM conversion", &outcome);
    if !outcome.cancelled {
        println!(
            "   CSV files written: {} (under {})",
            written,
            args.output.display()
        );
    }
    println!();

    Ok(merge_exit_status(&outcome))
}

async fn run_explore(args: ExploreArgs, cancellation: CancellationToken) -> Result<i32> {
    let config = args.common.load_config()?;
    let catalog = load_catalog(&args.catalog)?;

    let processor = build_processor(&args.common, config, cancellation)?;
    let outcome = processor.explore(&catalog).await.context("exploration failed")?;

    match args.format {
        OutputFormat::Human => {
            print_preflight(&outcome.report);
            print_failures(&outcome.failures);
            if outcome.cancelled {
                print_pending(&outcome.pending_files);
            }
            println!();
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&serde_json::json!({
                "filesDiscovered": outcome.files_discovered,
                "report": outcome.report,
                "failures": outcome.failures,
                "pendingFiles": outcome.pending_files,
                "cancelled": outcome.cancelled,
            }))
            .context("cannot serialise pre-flight report")?;
            println!("{}", json);
        }
    }

    if outcome.cancelled {
        Ok(EXIT_INTERRUPTED)
    } else if outcome.report.is_importable() {
        Ok(0)
    } else {
        Ok(1)
    }
}

async fn run_import(args: ImportArgs, cancellation: CancellationToken) -> Result<i32> {
    let config = args.common.load_config()?;
    let batch = args.batch_parameters(&config.batch)?;
    let mut config = config.with_batch(batch);
    if let Some(compression) = args.compression {
        config = config.with_compression(compression);
    }
    let catalog = load_catalog(&args.catalog)?;

    let processor = build_processor(&args.common, config, cancellation)?;
    let outcome = processor
        .import(&catalog, &args.output, args.sink)
        .await
        .context("import failed")?;

    print_merge_summary("IDEAM import", &outcome.merge);
    if !outcome.merge.cancelled {
        println!(
            "   DataValues rows: {} ({:?} to {})",
            outcome.rows_written,
            args.sink,
            args.output.display()
        );
    }
    println!();

    Ok(merge_exit_status(&outcome.merge))
}

fn merge_exit_status(outcome: &MergeOutcome) -> i32 {
    if outcome.cancelled {
        EXIT_INTERRUPTED
    } else if outcome.failures.is_empty() {
        0
    } else {
        1
    }
}

fn print_merge_summary(title: &str, outcome: &MergeOutcome) {
    let stats: &ProcessingStats = &outcome.stats;
    let duration = HumanDuration(Duration::from_millis(stats.processing_time_ms as u64));

    println!();
    if outcome.cancelled {
        println!("{}", format!("{} interrupted", title).bright_yellow().bold());
    } else {
        println!("{}", format!("{} complete", title).bright_green().bold());
    }
    println!("   Files discovered: {}", stats.files_discovered);
    println!("   Files processed: {}", stats.files_processed);
    println!("   Stations: {}", stats.stations);
    println!("   Year-blocks scanned: {}", stats.blocks_scanned);
    println!("   Values written: {}", stats.values_written);
    if stats.values_dropped > 0 {
        println!(
            "   Values on impossible dates: {}",
            stats.values_dropped.to_string().bright_yellow()
        );
    }
    println!("   Processing time: {}", duration);

    print_failures(&outcome.failures);
    if outcome.cancelled {
        print_pending(&outcome.pending_files);
    }
}

fn print_failures(failures: &[FileFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("{}", format!("   Files skipped: {}", failures.len()).bright_red());
    for failure in failures {
        match failure.line {
            Some(line) => println!(
                "     {}:{} {}",
                failure.path.display(),
                line,
                failure.reason.bright_black()
            ),
            None => println!("     {} {}", failure.path.display(), failure.reason.bright_black()),
        }
    }
}

fn print_pending(pending: &[PathBuf]) {
    println!(
        "{}",
        format!("   Files not processed: {}", pending.len()).bright_yellow()
    );
    for path in pending.iter().take(10) {
        println!("     {}", path.display());
    }
    if pending.len() > 10 {
        println!("     ... and {} more", pending.len() - 10);
    }
}

fn print_preflight(report: &PreflightReport) {
    println!();
    println!("{}", "IDEAM pre-flight report".bright_green().bold());
    println!("   Files scanned: {}", report.files.len());
    println!("   Stations: {}", report.station_count);
    println!("   Variables resolved: {}", report.variable_count);
    println!("   Methods resolved: {}", report.method_count);

    let flag = |ok: bool| if ok { "yes".green() } else { "no".red() };
    println!("   All sites created: {}", flag(report.all_sites_created));
    println!("   All variables created: {}", flag(report.all_vars_created));
    println!("   All methods created: {}", flag(report.all_methods_created));
    println!("   All qualifiers created: {}", flag(report.all_qualifiers_created));

    if !report.missing_sites.is_empty() {
        println!("{}", "   Missing sites:".bright_red());
        for code in &report.missing_sites {
            println!("     {}", code);
        }
    }
    if !report.missing_variables.is_empty() {
        println!("{}", "   Missing variables:".bright_red());
        for variable in &report.missing_variables {
            println!("     {}", variable);
        }
    }
    if !report.missing_methods.is_empty() {
        println!("{}", "   Missing methods for station types:".bright_red());
        for station_type in &report.missing_methods {
            println!("     {}", station_type);
        }
    }
    if !report.missing_qualifiers.is_empty() {
        println!("{}", "   Missing qualifiers for quality codes:".bright_red());
        for code in &report.missing_qualifiers {
            println!("     {}", code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StationDatabase;

    fn outcome(cancelled: bool, failures: Vec<FileFailure>) -> MergeOutcome {
        MergeOutcome {
            database: StationDatabase::new(),
            stats: ProcessingStats::default(),
            failures,
            scans: Vec::new(),
            pending_files: Vec::new(),
            cancelled,
        }
    }

    #[test]
    fn test_merge_exit_status() {
        assert_eq!(merge_exit_status(&outcome(false, Vec::new())), 0);
        assert_eq!(merge_exit_status(&outcome(true, Vec::new())), EXIT_INTERRUPTED);

        let failure = FileFailure {
            path: PathBuf::from("bad.txt"),
            line: Some(10),
            reason: "invalid elevation".to_string(),
        };
        assert_eq!(merge_exit_status(&outcome(false, vec![failure])), 1);
    }

    #[test]
    fn test_missing_catalog_is_reported() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let error = load_catalog(&temp_dir.path().join("catalog.json")).unwrap_err();
        assert!(format!("{:#}", error).contains("cannot load lookup catalog"));
    }
}
