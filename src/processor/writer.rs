//! Output writers.
//!
//! Per-station CSV series (one file per station and series kind) and the
//! DataValues table as Parquet, CSV or an SQL script of INSERT statements.

use crate::config::CompressionAlgorithm;
use crate::constants::QUALITY_COLUMN;
use crate::database::{StationDatabase, StationRecord};
use crate::error::{IdeamError, Result};
use crate::export::{DATA_VALUE_COLUMNS, DataValueRow};
use crate::models::{SeriesKind, StationCode};

use clap::ValueEnum;
use polars::prelude::{
    col, CsvWriter, DataFrame, IntoLazy, NamedFrom, ParquetWriter, SerWriter, Series,
    SortMultipleOptions,
};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination format for DataValues rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
pub enum SinkFormat {
    Parquet,
    Csv,
    /// SQL script of INSERT statements
    Sql,
}

fn write_failure(path: &Path, e: impl std::fmt::Display) -> IdeamError {
    IdeamError::ProcessingFailed {
        path: path.to_path_buf(),
        reason: format!("write failed: {}", e),
    }
}

/// Value column header, `<Variable>_<Kind>[unit]`
pub fn value_column_name(record: &StationRecord, kind: SeriesKind) -> String {
    match &record.header.variable {
        Some(variable) => {
            let unit = variable.unit.as_deref().unwrap_or("");
            format!("{}_{}[{}]", variable.column_stem(), kind.label(), unit)
        }
        None => format!("Value_{}[]", kind.label()),
    }
}

/// Dense `Date, <value>, Data_Quality` frame for one series
pub fn series_frame(record: &StationRecord, kind: SeriesKind) -> Result<DataFrame> {
    let series = record.series.as_ref().ok_or(IdeamError::UnknownStation {
        code: record.header.code,
    })?;
    let data = series.get(kind);

    let dates: Vec<String> = data
        .iter()
        .map(|(date, _)| date.format("%Y-%m-%d").to_string())
        .collect();
    let quality: Vec<Option<i32>> = data.quality().iter().map(|q| q.map(i32::from)).collect();

    let df = DataFrame::new(vec![
        Series::new("Date".into(), dates).into(),
        Series::new(value_column_name(record, kind).into(), data.values().to_vec()).into(),
        Series::new(QUALITY_COLUMN.into(), quality).into(),
    ])?;
    Ok(df)
}

/// Path of a station's CSV for one series kind
pub fn station_csv_path(output_dir: &Path, kind: SeriesKind, code: StationCode) -> PathBuf {
    output_dir.join(kind.output_dir()).join(format!("{}.csv", code))
}

/// Write `daily_mean/`, `monthly_max/` and `monthly_min/` CSVs for every
/// allocated station. Returns the number of files written.
pub fn write_station_csvs(database: &StationDatabase, output_dir: &Path) -> Result<usize> {
    for kind in SeriesKind::ALL {
        fs::create_dir_all(output_dir.join(kind.output_dir()))?;
    }

    let mut written = 0;
    for (code, record) in database.iter() {
        if record.series.is_none() {
            continue;
        }
        for kind in SeriesKind::ALL {
            let path = station_csv_path(output_dir, kind, *code);
            let mut df = series_frame(record, kind)?;
            let mut file = File::create(&path)?;
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(&mut df)
                .map_err(|e| write_failure(&path, e))?;
            written += 1;
        }
    }

    debug!("Wrote {} station CSV files to {}", written, output_dir.display());
    Ok(written)
}

/// DataValues rows as a frame sorted by site, variable and local time
pub fn data_values_frame(rows: &[DataValueRow]) -> Result<DataFrame> {
    let df = DataFrame::new(vec![
        Series::new(
            DATA_VALUE_COLUMNS[0].into(),
            rows.iter().map(|r| r.data_value).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[1].into(),
            rows.iter().map(|r| r.local_date_time).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[2].into(),
            rows.iter().map(|r| r.utc_offset).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[3].into(),
            rows.iter().map(|r| r.date_time_utc).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[4].into(),
            rows.iter().map(|r| r.site_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[5].into(),
            rows.iter().map(|r| r.variable_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[6].into(),
            rows.iter().map(|r| r.qualifier_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[7].into(),
            rows.iter().map(|r| r.method_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[8].into(),
            rows.iter().map(|r| r.source_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[9].into(),
            rows.iter().map(|r| r.quality_control_level_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DATA_VALUE_COLUMNS[10].into(),
            rows.iter().map(|r| r.censor_code.as_str()).collect::<Vec<_>>(),
        )
        .into(),
    ])?;

    let sorted = df
        .lazy()
        .sort_by_exprs(
            [col("SiteId"), col("VariableId"), col("LocalDateTime")],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()?;
    Ok(sorted)
}

/// Write DataValues rows to `path`. Returns the number of rows written.
pub fn write_data_values(
    rows: &[DataValueRow],
    path: &Path,
    format: SinkFormat,
    compression: CompressionAlgorithm,
) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    match format {
        SinkFormat::Parquet => {
            let mut df = data_values_frame(rows)?;
            let file = File::create(path)?;
            ParquetWriter::new(file)
                .with_compression(compression.to_polars_compression())
                .finish(&mut df)
                .map_err(|e| write_failure(path, e))?;
        }
        SinkFormat::Csv => {
            let mut df = data_values_frame(rows)?;
            let mut file = File::create(path)?;
            CsvWriter::new(&mut file)
                .include_header(true)
                .finish(&mut df)
                .map_err(|e| write_failure(path, e))?;
        }
        SinkFormat::Sql => {
            let mut writer = BufWriter::new(File::create(path)?);
            for row in rows {
                writeln!(writer, "{}", row.to_sql_insert())?;
            }
            writer.flush()?;
        }
    }

    debug!("Wrote {} DataValues rows to {} ({:?})", rows.len(), path.display(), format);
    Ok(rows.len())
}
