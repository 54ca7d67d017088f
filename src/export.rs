//! DataValues rows for the relational store.
//!
//! Each observation becomes one row stamped at noon local time. Site, variable,
//! method and qualifier identifiers come from the lookup catalog; source,
//! quality-control level, censor code and UTC offset come from the batch.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::BatchParameters;
use crate::constants::LOCAL_OBSERVATION_HOUR;
use crate::database::{StationDatabase, StationRecord};
use crate::error::{IdeamError, Result};
use crate::lookup::{LookupCatalog, VariableKey};
use crate::models::{SeriesKind, StationCode};

/// Column names of the DataValues table, in row order
pub const DATA_VALUE_COLUMNS: [&str; 11] = [
    "DataValue",
    "LocalDateTime",
    "UTCOffset",
    "DateTimeUTC",
    "SiteId",
    "VariableId",
    "QualifierId",
    "MethodId",
    "SourceId",
    "QualityControlLevelId",
    "CensorCode",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataValueRow {
    pub data_value: f64,
    pub local_date_time: NaiveDateTime,
    pub utc_offset: i32,
    pub date_time_utc: NaiveDateTime,
    pub site_id: i64,
    pub variable_id: i64,
    pub qualifier_id: i64,
    pub method_id: i64,
    pub source_id: i64,
    pub quality_control_level_id: i64,
    pub censor_code: String,
}

impl DataValueRow {
    /// `INSERT` statement for this row
    pub fn to_sql_insert(&self) -> String {
        format!(
            "INSERT INTO \"DataValues\" ({}) VALUES ({}, '{}', {}, '{}', {}, {}, {}, {}, {}, {}, '{}');",
            DATA_VALUE_COLUMNS
                .iter()
                .map(|column| format!("\"{}\"", column))
                .collect::<Vec<_>>()
                .join(", "),
            self.data_value,
            self.local_date_time.format("%Y-%m-%d %H:%M:%S"),
            self.utc_offset,
            self.date_time_utc.format("%Y-%m-%d %H:%M:%S"),
            self.site_id,
            self.variable_id,
            self.qualifier_id,
            self.method_id,
            self.source_id,
            self.quality_control_level_id,
            self.censor_code.replace('\'', "''"),
        )
    }
}

fn reference_error(entity: &'static str, key: impl ToString) -> IdeamError {
    IdeamError::MissingReference {
        entity,
        key: key.to_string(),
    }
}

/// Rows for one station, daily mean first, then monthly max and min
pub fn station_rows(
    code: StationCode,
    record: &StationRecord,
    catalog: &dyn LookupCatalog,
    batch: &BatchParameters,
) -> Result<Vec<DataValueRow>> {
    let Some(series) = &record.series else {
        return Err(IdeamError::UnknownStation { code });
    };

    let site_id = catalog
        .site_id(code)
        .ok_or_else(|| reference_error("site", code))?;
    let method_id = catalog
        .method_id(&record.header.station_type)
        .ok_or_else(|| reference_error("method", &record.header.station_type))?;

    let noon = NaiveTime::from_hms_opt(LOCAL_OBSERVATION_HOUR, 0, 0).unwrap_or_default();
    let to_utc = Duration::hours(-i64::from(batch.utc_offset_hours));

    let mut rows = Vec::new();
    for kind in SeriesKind::ALL {
        let observations = series.get(kind);
        if observations.present_count() == 0 {
            continue;
        }

        let variable = record
            .header
            .variable
            .as_ref()
            .ok_or_else(|| reference_error("variable", format!("station {}", code)))?;
        let key = VariableKey::for_kind(variable, kind);
        let variable_id = key
            .resolve(catalog)
            .ok_or_else(|| reference_error("variable", &key))?;

        for (date, value) in observations.observations() {
            let Some(data_value) = value.value else {
                continue;
            };
            let quality = value.quality.unwrap_or(batch.default_qualifier_code);
            let qualifier_id = catalog
                .qualifier_id(quality)
                .ok_or_else(|| reference_error("qualifier", quality))?;

            let local_date_time = date.and_time(noon);
            rows.push(DataValueRow {
                data_value,
                local_date_time,
                utc_offset: batch.utc_offset_hours,
                date_time_utc: local_date_time + to_utc,
                site_id,
                variable_id,
                qualifier_id,
                method_id,
                source_id: batch.source_id,
                quality_control_level_id: batch.quality_control_level_id,
                censor_code: batch.censor_code.clone(),
            });
        }
    }

    debug!("Station {}: {} DataValues rows", code, rows.len());
    Ok(rows)
}

/// Rows for every station with allocated series
pub fn build_rows(
    database: &StationDatabase,
    catalog: &dyn LookupCatalog,
    batch: &BatchParameters,
) -> Result<Vec<DataValueRow>> {
    let mut rows = Vec::new();
    for (code, record) in database.iter() {
        if record.series.is_none() {
            continue;
        }
        rows.extend(station_rows(*code, record, catalog, batch)?);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MONTHS_PER_LINE;
    use crate::header::BlockValues;
    use crate::lookup::InMemoryCatalog;
    use crate::models::{DecodedValue, StationHeader};
    use crate::variable::{Aggregation, TimeResolution, VariableDescriptor};
    use chrono::NaiveDate;

    fn database() -> StationDatabase {
        let mut db = StationDatabase::new();
        db.merge_header(StationHeader {
            code: 12345678,
            name: "PUENTE REAL".to_string(),
            latitude: 6.0,
            longitude: -75.0,
            elevation: 1000,
            station_type: "LG".to_string(),
            river: None,
            department: "ANTIOQUIA".to_string(),
            municipality: "MEDELLIN".to_string(),
            variable: Some(VariableDescriptor {
                name: "Streamflow".to_string(),
                aggregation: Aggregation::Average,
                time_resolution: Some(TimeResolution::Day),
                unit: Some("m3/seg".to_string()),
            }),
            registration_years: [1990].into_iter().collect(),
        });
        db.allocate_series();

        let mut daily = [DecodedValue::MISSING; MONTHS_PER_LINE];
        daily[0] = DecodedValue::new(12.5, Some(3));
        daily[1] = DecodedValue::new(8.0, None);
        let mut max = [DecodedValue::MISSING; MONTHS_PER_LINE];
        max[1] = DecodedValue::new(30.0, None);
        db.apply_block(&BlockValues {
            code: 12345678,
            year: 1990,
            daily: vec![(1, daily)],
            monthly_max: Some(max),
            monthly_min: None,
        })
        .unwrap();
        db
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_site(12345678, 42)
            .with_variable(1, "Streamflow", Aggregation::Average, Some(TimeResolution::Day))
            .with_variable(2, "Streamflow", Aggregation::Maximum, Some(TimeResolution::Month))
            .with_method(3, "Limnigrafica LG")
    }

    #[test]
    fn test_rows_stamp_noon_and_utc() {
        let rows = build_rows(&database(), &catalog(), &BatchParameters::default()).unwrap();
        assert_eq!(rows.len(), 3);

        let first = &rows[0];
        let local = NaiveDate::from_ymd_opt(1990, 1, 1).unwrap().and_hms_opt(12, 0, 0).unwrap();
        assert_eq!(first.data_value, 12.5);
        assert_eq!(first.local_date_time, local);
        assert_eq!(first.utc_offset, -5);
        assert_eq!(first.date_time_utc, local + Duration::hours(5));
        assert_eq!(first.qualifier_id, 3);
        assert_eq!((first.site_id, first.variable_id, first.method_id), (42, 1, 3));
        assert_eq!(first.censor_code, "nc");

        // No quality digit falls back to the default qualifier
        assert_eq!(rows[1].qualifier_id, 1);

        let monthly = &rows[2];
        assert_eq!(monthly.variable_id, 2);
        assert_eq!(
            monthly.local_date_time,
            NaiveDate::from_ymd_opt(1990, 2, 28).unwrap().and_hms_opt(12, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_missing_variable_is_a_reference_error() {
        let catalog = InMemoryCatalog::new()
            .with_site(12345678, 42)
            .with_variable(1, "Streamflow", Aggregation::Average, Some(TimeResolution::Day))
            .with_method(3, "Limnigrafica LG");

        match build_rows(&database(), &catalog, &BatchParameters::default()) {
            Err(IdeamError::MissingReference { entity, key }) => {
                assert_eq!(entity, "variable");
                assert_eq!(key, "Streamflow (Maximum)");
            }
            other => panic!("expected missing reference, got {:?}", other),
        }
    }

    #[test]
    fn test_sql_insert_rendering() {
        let rows = build_rows(&database(), &catalog(), &BatchParameters {
            censor_code: "o'c".to_string(),
            ..BatchParameters::default()
        })
        .unwrap();

        let sql = rows[0].to_sql_insert();
        assert!(sql.starts_with("INSERT INTO \"DataValues\" (\"DataValue\", \"LocalDateTime\""));
        assert!(sql.contains("VALUES (12.5, '1990-01-01 12:00:00', -5, '1990-01-01 17:00:00', 42, 1, 3, 3, 1, 0, 'o''c');"));
    }
}
