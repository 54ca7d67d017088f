//! Station database and value routing.
//!
//! `StationDatabase` is the one mutable structure of a merge run. Headers
//! are merged in during the header pass, series are allocated once every
//! registration year is known, and decoded blocks are routed into the
//! series during the value pass.
//!
//! Overlapping dates across files resolve to the last present value in file
//! order; blank fields never erase a value already written.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::calendar::{assign_date, month_end};
use crate::error::{IdeamError, Result};
use crate::header::{BlockValues, FileHeaderScan};
use crate::models::{DecodedValue, SeriesKind, StationCode, StationHeader};
use crate::series::{DatedSeries, StationSeries};

/// Header plus series of one station. `series` is `None` until allocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub header: StationHeader,
    pub series: Option<StationSeries>,
}

/// Outcome of routing one block
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub written: usize,
    /// Present values whose date does not exist or lies outside the span
    pub dropped: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationDatabase {
    stations: BTreeMap<StationCode, StationRecord>,
}

impl StationDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn get(&self, code: StationCode) -> Option<&StationRecord> {
        self.stations.get(&code)
    }

    pub fn contains(&self, code: StationCode) -> bool {
        self.stations.contains_key(&code)
    }

    /// Stations in ascending code order
    pub fn iter(&self) -> impl Iterator<Item = (&StationCode, &StationRecord)> {
        self.stations.iter()
    }

    pub fn codes(&self) -> impl Iterator<Item = StationCode> + '_ {
        self.stations.keys().copied()
    }

    /// Merge one station header. The first header seen for a code keeps its
    /// metadata; later ones only contribute registration years.
    pub fn merge_header(&mut self, header: StationHeader) {
        match self.stations.get_mut(&header.code) {
            Some(record) => {
                record.header.absorb_years(&header);
                if record.header.variable.is_none() {
                    record.header.variable = header.variable;
                }
            }
            None => {
                debug!("New station {} ({})", header.code, header.name);
                self.stations.insert(
                    header.code,
                    StationRecord {
                        header,
                        series: None,
                    },
                );
            }
        }
    }

    pub fn merge_scan(&mut self, scan: &FileHeaderScan) {
        for header in &scan.stations {
            self.merge_header(header.clone());
        }
    }

    /// Allocate series over each station's full registration span. Series
    /// already allocated are widened when new years extend the span.
    /// Returns the number of stations allocated or widened.
    pub fn allocate_series(&mut self) -> usize {
        let mut changed = 0;
        for (code, record) in self.stations.iter_mut() {
            let Some((first, last)) = record.header.year_span() else {
                warn!("Station {} has no registration years, no series allocated", code);
                continue;
            };

            match record.series.as_ref() {
                None => {
                    record.series = Some(StationSeries::allocate(first, last));
                    changed += 1;
                }
                Some(series) if series.span() != (first, last) => {
                    let (old_first, old_last) = series.span();
                    if first < old_first || last > old_last {
                        record.series = Some(series.widened(first, last));
                        changed += 1;
                    }
                }
                Some(_) => {}
            }
        }
        info!("Allocated series for {} stations", changed);
        changed
    }

    /// Route a decoded block into its station's series. Missing values never
    /// overwrite; values on impossible dates are dropped.
    pub fn apply_block(&mut self, block: &BlockValues) -> Result<ApplyStats> {
        let series = self
            .stations
            .get_mut(&block.code)
            .and_then(|record| record.series.as_mut())
            .ok_or(IdeamError::UnknownStation { code: block.code })?;

        let mut stats = ApplyStats::default();

        for (day, values) in &block.daily {
            for (month0, value) in values.iter().enumerate() {
                let month = month0 as u32 + 1;
                write_value(
                    &mut series.daily_mean,
                    assign_date(block.year, month, *day),
                    *value,
                    &mut stats,
                );
            }
        }

        for (kind, row) in [
            (SeriesKind::MonthlyMax, &block.monthly_max),
            (SeriesKind::MonthlyMin, &block.monthly_min),
        ] {
            let Some(row) = row else { continue };
            for (month0, value) in row.iter().enumerate() {
                write_value(
                    series.get_mut(kind),
                    month_end(block.year, month0 as u32 + 1),
                    *value,
                    &mut stats,
                );
            }
        }

        if stats.dropped > 0 {
            debug!(
                "Station {} year {}: {} values written, {} dropped",
                block.code, block.year, stats.written, stats.dropped
            );
        }
        Ok(stats)
    }

    /// Write the database as JSON, e.g. between the header and value passes
    pub fn save_checkpoint(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, self)?;
        info!("Checkpoint written to {}", path.display());
        Ok(())
    }

    pub fn load_checkpoint(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let database: Self = serde_json::from_reader(reader)?;
        info!(
            "Checkpoint loaded from {} ({} stations)",
            path.display(),
            database.len()
        );
        Ok(database)
    }
}

/// Write one decoded value. A blank value is skipped, so a later file with a
/// gap on a date keeps the value an earlier file wrote there; present values
/// overwrite (last write wins).
fn write_value(
    series: &mut DatedSeries,
    date: Option<chrono::NaiveDate>,
    value: DecodedValue,
    stats: &mut ApplyStats,
) {
    if value.is_missing() {
        return;
    }
    match date {
        Some(date) if series.set(date, value) => stats.written += 1,
        _ => stats.dropped += 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MONTHS_PER_LINE;
    use chrono::NaiveDate;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn header(code: StationCode, name: &str, years: &[i32]) -> StationHeader {
        StationHeader {
            code,
            name: name.to_string(),
            latitude: 6.25,
            longitude: -75.5,
            elevation: 1450,
            station_type: "LG".to_string(),
            river: Some("RIO PORCE".to_string()),
            department: "ANTIOQUIA".to_string(),
            municipality: "MEDELLIN".to_string(),
            variable: None,
            registration_years: years.iter().copied().collect::<BTreeSet<_>>(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn uniform_row(value: f64) -> [DecodedValue; MONTHS_PER_LINE] {
        [DecodedValue::new(value, Some(1)); MONTHS_PER_LINE]
    }

    #[test]
    fn test_first_header_metadata_wins() {
        let mut db = StationDatabase::new();
        db.merge_header(header(1, "FIRST", &[1990]));
        db.merge_header(header(1, "SECOND", &[1991, 1992]));

        let record = db.get(1).unwrap();
        assert_eq!(record.header.name, "FIRST");
        assert_eq!(record.header.year_span(), Some((1990, 1992)));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_apply_requires_allocation() {
        let mut db = StationDatabase::new();
        db.merge_header(header(1, "A", &[1990]));
        let block = BlockValues {
            code: 1,
            year: 1990,
            daily: vec![],
            monthly_max: None,
            monthly_min: None,
        };
        assert!(matches!(
            db.apply_block(&block),
            Err(IdeamError::UnknownStation { code: 1 })
        ));
    }

    #[test]
    fn test_day_31_and_leap_day_routing() {
        let mut db = StationDatabase::new();
        db.merge_header(header(9, "A", &[1900, 2000]));
        db.allocate_series();

        let block = |year| BlockValues {
            code: 9,
            year,
            daily: vec![(29, uniform_row(2.0)), (31, uniform_row(3.0))],
            monthly_max: None,
            monthly_min: None,
        };

        let stats = db.apply_block(&block(1900)).unwrap();
        // Day 29 exists in 11 months of 1900, day 31 in 7
        assert_eq!(stats.written, 11 + 7);
        assert_eq!(stats.dropped, 1 + 5);

        let stats = db.apply_block(&block(2000)).unwrap();
        assert_eq!(stats.written, 12 + 7);

        let daily = &db.get(9).unwrap().series.as_ref().unwrap().daily_mean;
        assert!(daily.get(date(1900, 2, 28)).unwrap().is_missing());
        assert_eq!(daily.get(date(2000, 2, 29)).unwrap().value, Some(2.0));
        assert_eq!(daily.get(date(2000, 12, 31)).unwrap().value, Some(3.0));
        assert_eq!(daily.get(date(2000, 1, 31)).unwrap().value, Some(3.0));
    }

    #[test]
    fn test_extrema_routing_and_missing_do_not_overwrite() {
        let mut db = StationDatabase::new();
        db.merge_header(header(4, "A", &[1995]));
        db.allocate_series();

        let mut max_row = uniform_row(50.0);
        max_row[5] = DecodedValue::MISSING;
        let first = BlockValues {
            code: 4,
            year: 1995,
            daily: vec![(1, uniform_row(7.0))],
            monthly_max: Some(uniform_row(40.0)),
            monthly_min: Some(uniform_row(0.5)),
        };
        let second = BlockValues {
            code: 4,
            year: 1995,
            daily: vec![(1, [DecodedValue::MISSING; MONTHS_PER_LINE])],
            monthly_max: Some(max_row),
            monthly_min: None,
        };
        db.apply_block(&first).unwrap();
        db.apply_block(&second).unwrap();

        let series = db.get(4).unwrap().series.as_ref().unwrap();
        assert_eq!(series.daily_mean.get(date(1995, 3, 1)).unwrap().value, Some(7.0));
        assert_eq!(series.monthly_max.get(date(1995, 1, 31)).unwrap().value, Some(50.0));
        assert_eq!(series.monthly_max.get(date(1995, 6, 30)).unwrap().value, Some(40.0));
        assert_eq!(series.monthly_min.get(date(1995, 12, 31)).unwrap().value, Some(0.5));
    }

    #[test]
    fn test_allocation_widens_with_new_years() {
        let mut db = StationDatabase::new();
        db.merge_header(header(2, "A", &[1990]));
        assert_eq!(db.allocate_series(), 1);
        assert_eq!(db.allocate_series(), 0);

        db.merge_header(header(2, "A", &[1988]));
        assert_eq!(db.allocate_series(), 1);
        let series = db.get(2).unwrap().series.as_ref().unwrap();
        assert_eq!(series.span(), (1988, 1990));
        assert_eq!(series.daily_mean.first_date(), date(1988, 1, 1));
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("checkpoint.json");

        let mut db = StationDatabase::new();
        db.merge_header(header(12345678, "A", &[1990, 1991]));
        db.allocate_series();
        db.apply_block(&BlockValues {
            code: 12345678,
            year: 1991,
            daily: vec![(15, uniform_row(1.25))],
            monthly_max: None,
            monthly_min: None,
        })
        .unwrap();

        db.save_checkpoint(&path).unwrap();
        let restored = StationDatabase::load_checkpoint(&path).unwrap();
        assert_eq!(restored, db);
    }
}
