//! Pre-flight validation of a batch against the lookup catalog.
//!
//! Runs on header scans only. Reports, per file and for the whole batch, how
//! many stations, variables, methods and qualifiers the bulletins reference
//! and which of them the catalog lacks. Import is refused unless every flag
//! is true.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::header::FileHeaderScan;
use crate::lookup::{LookupCatalog, VariableKey};
use crate::models::{SeriesKind, StationCode};

/// Exploration result for one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePreflight {
    pub path: PathBuf,
    pub station_count: usize,
    /// Resolved variable ids
    pub variables: Vec<i64>,
    /// Resolved method ids
    pub methods: Vec<i64>,
    pub missing_sites: Vec<StationCode>,
    pub missing_variables: Vec<String>,
    /// Station type codes without a matching method
    pub missing_methods: Vec<String>,
    /// Resolved qualifier ids
    pub qualifiers: Vec<i64>,
    /// Quality codes without a qualifier
    pub missing_qualifiers: Vec<u8>,
    pub all_sites_created: bool,
    pub all_vars_created: bool,
    pub all_methods_created: bool,
    pub all_qualifiers_created: bool,
}

/// Exploration result for a batch of files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreflightReport {
    pub station_count: usize,
    pub variable_count: usize,
    pub method_count: usize,
    pub variables: Vec<i64>,
    pub methods: Vec<i64>,
    pub missing_sites: Vec<StationCode>,
    pub missing_variables: Vec<String>,
    pub missing_methods: Vec<String>,
    pub qualifiers: Vec<i64>,
    pub missing_qualifiers: Vec<u8>,
    pub all_sites_created: bool,
    pub all_vars_created: bool,
    pub all_methods_created: bool,
    pub all_qualifiers_created: bool,
    pub files: Vec<FilePreflight>,
}

impl PreflightReport {
    pub fn is_importable(&self) -> bool {
        self.all_sites_created
            && self.all_vars_created
            && self.all_methods_created
            && self.all_qualifiers_created
    }

    /// One-line description for logs and error messages
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} stations, {} variables, {} methods",
            self.station_count, self.variable_count, self.method_count
        );
        if !self.missing_sites.is_empty() {
            let sites: Vec<String> = self.missing_sites.iter().map(|c| c.to_string()).collect();
            summary.push_str(&format!("; missing sites: {}", sites.join(", ")));
        }
        if !self.missing_variables.is_empty() {
            summary.push_str(&format!(
                "; missing variables: {}",
                self.missing_variables.join(", ")
            ));
        }
        if !self.missing_methods.is_empty() {
            summary.push_str(&format!(
                "; missing methods for station types: {}",
                self.missing_methods.join(", ")
            ));
        }
        if !self.missing_qualifiers.is_empty() {
            let codes: Vec<String> = self.missing_qualifiers.iter().map(|c| c.to_string()).collect();
            summary.push_str(&format!("; missing qualifiers: {}", codes.join(", ")));
        }
        summary
    }
}

/// Label for a block whose variable line could not be parsed
fn unparsed_variable(code: StationCode, year: i32) -> String {
    format!("unrecognised variable line (station {}, {})", code, year)
}

/// Explore one scanned file. Values without a quality digit are checked
/// against `default_qualifier`.
pub fn explore_file(
    scan: &FileHeaderScan,
    catalog: &dyn LookupCatalog,
    default_qualifier: u8,
) -> FilePreflight {
    let mut stations = BTreeSet::new();
    let mut missing_sites = BTreeSet::new();
    let mut variables = BTreeSet::new();
    let mut missing_variables = BTreeSet::new();
    let mut methods = BTreeSet::new();
    let mut missing_methods = BTreeSet::new();
    let mut quality_codes = BTreeSet::new();

    for block in &scan.blocks {
        quality_codes.extend(block.quality_codes.iter().copied());
        if block.has_unflagged {
            quality_codes.insert(default_qualifier);
        }

        if stations.insert(block.code) && catalog.site_id(block.code).is_none() {
            missing_sites.insert(block.code);
        }

        match catalog.method_id(&block.station_type) {
            Some(id) => {
                methods.insert(id);
            }
            None => {
                missing_methods.insert(block.station_type.clone());
            }
        }

        let Some(variable) = &block.variable else {
            missing_variables.insert(unparsed_variable(block.code, block.year));
            continue;
        };

        let mut required = vec![SeriesKind::DailyMean];
        if block.has_max {
            required.push(SeriesKind::MonthlyMax);
        }
        if block.has_min {
            required.push(SeriesKind::MonthlyMin);
        }
        for kind in required {
            let key = VariableKey::for_kind(variable, kind);
            match key.resolve(catalog) {
                Some(id) => {
                    variables.insert(id);
                }
                None => {
                    missing_variables.insert(key.to_string());
                }
            }
        }
    }

    let mut qualifiers = BTreeSet::new();
    let mut missing_qualifiers = BTreeSet::new();
    for code in quality_codes {
        match catalog.qualifier_id(code) {
            Some(id) => {
                qualifiers.insert(id);
            }
            None => {
                missing_qualifiers.insert(code);
            }
        }
    }

    FilePreflight {
        path: scan.path.clone(),
        station_count: stations.len(),
        variables: variables.into_iter().collect(),
        methods: methods.into_iter().collect(),
        all_sites_created: missing_sites.is_empty(),
        all_vars_created: missing_variables.is_empty(),
        all_methods_created: missing_methods.is_empty(),
        all_qualifiers_created: missing_qualifiers.is_empty(),
        missing_sites: missing_sites.into_iter().collect(),
        missing_variables: missing_variables.into_iter().collect(),
        missing_methods: missing_methods.into_iter().collect(),
        qualifiers: qualifiers.into_iter().collect(),
        missing_qualifiers: missing_qualifiers.into_iter().collect(),
    }
}

/// Explore a batch. Counts are of distinct stations, variables and methods
/// across all files.
pub fn explore_batch(
    scans: &[FileHeaderScan],
    catalog: &dyn LookupCatalog,
    default_qualifier: u8,
) -> PreflightReport {
    let files: Vec<FilePreflight> = scans
        .iter()
        .map(|scan| explore_file(scan, catalog, default_qualifier))
        .collect();

    let stations: BTreeSet<StationCode> = scans
        .iter()
        .flat_map(|scan| scan.blocks.iter().map(|block| block.code))
        .collect();
    let variables: BTreeSet<i64> = files.iter().flat_map(|f| f.variables.iter().copied()).collect();
    let methods: BTreeSet<i64> = files.iter().flat_map(|f| f.methods.iter().copied()).collect();
    let missing_sites: BTreeSet<StationCode> = files
        .iter()
        .flat_map(|f| f.missing_sites.iter().copied())
        .collect();
    let missing_variables: BTreeSet<String> = files
        .iter()
        .flat_map(|f| f.missing_variables.iter().cloned())
        .collect();
    let missing_methods: BTreeSet<String> = files
        .iter()
        .flat_map(|f| f.missing_methods.iter().cloned())
        .collect();
    let qualifiers: BTreeSet<i64> = files.iter().flat_map(|f| f.qualifiers.iter().copied()).collect();
    let missing_qualifiers: BTreeSet<u8> = files
        .iter()
        .flat_map(|f| f.missing_qualifiers.iter().copied())
        .collect();

    PreflightReport {
        station_count: stations.len(),
        variable_count: variables.len(),
        method_count: methods.len(),
        variables: variables.into_iter().collect(),
        methods: methods.into_iter().collect(),
        all_sites_created: files.iter().all(|f| f.all_sites_created),
        all_vars_created: files.iter().all(|f| f.all_vars_created),
        all_methods_created: files.iter().all(|f| f.all_methods_created),
        all_qualifiers_created: files.iter().all(|f| f.all_qualifiers_created),
        missing_sites: missing_sites.into_iter().collect(),
        missing_variables: missing_variables.into_iter().collect(),
        missing_methods: missing_methods.into_iter().collect(),
        qualifiers: qualifiers.into_iter().collect(),
        missing_qualifiers: missing_qualifiers.into_iter().collect(),
        files,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::BlockSummary;
    use crate::lookup::InMemoryCatalog;
    use crate::variable::{Aggregation, TimeResolution, VariableDescriptor};

    fn streamflow() -> Option<VariableDescriptor> {
        Some(VariableDescriptor {
            name: "Streamflow".to_string(),
            aggregation: Aggregation::Average,
            time_resolution: Some(TimeResolution::Day),
            unit: None,
        })
    }

    fn block(code: StationCode, year: i32, has_max: bool) -> BlockSummary {
        BlockSummary {
            code,
            year,
            variable: streamflow(),
            station_type: "LG".to_string(),
            has_max,
            has_min: false,
            quality_codes: [2].into_iter().collect(),
            has_unflagged: has_max,
        }
    }

    fn scan(name: &str, blocks: Vec<BlockSummary>) -> FileHeaderScan {
        FileHeaderScan {
            path: PathBuf::from(name),
            stations: Vec::new(),
            blocks,
        }
    }

    fn catalog() -> InMemoryCatalog {
        InMemoryCatalog::new()
            .with_site(1, 10)
            .with_site(2, 20)
            .with_variable(5, "Streamflow", Aggregation::Average, Some(TimeResolution::Day))
            .with_method(7, "Limnigrafica LG")
    }

    #[test]
    fn test_complete_catalog_is_importable() {
        let scans = vec![
            scan("a.txt", vec![block(1, 1990, false), block(1, 1991, false)]),
            scan("b.txt", vec![block(2, 1990, false), block(1, 1992, false)]),
        ];
        let report = explore_batch(&scans, &catalog(), 1);

        assert_eq!(report.station_count, 2);
        assert_eq!(report.variables, vec![5]);
        assert_eq!(report.methods, vec![7]);
        assert!(report.is_importable());
        assert_eq!(report.files[0].station_count, 1);
        assert_eq!(report.files[1].station_count, 2);
    }

    #[test]
    fn test_missing_extrema_variable_clears_vars_flag() {
        let scans = vec![scan("a.txt", vec![block(1, 1990, true)])];
        let report = explore_batch(&scans, &catalog(), 1);

        assert!(!report.all_vars_created);
        assert!(report.all_sites_created);
        assert!(report.all_methods_created);
        assert!(!report.is_importable());
        assert_eq!(report.missing_variables, vec!["Streamflow (Maximum)".to_string()]);
        assert!(report.summary().contains("missing variables: Streamflow (Maximum)"));
    }

    #[test]
    fn test_missing_site_and_method() {
        let mut unknown = block(3, 2001, false);
        unknown.station_type = "PM".to_string();
        let file = explore_file(&scan("c.txt", vec![unknown]), &catalog(), 1);

        assert_eq!(file.missing_sites, vec![3]);
        assert_eq!(file.missing_methods, vec!["PM".to_string()]);
        assert!(!file.all_sites_created);
        assert!(!file.all_methods_created);
        assert!(file.all_vars_created);
    }

    #[test]
    fn test_unparsed_variable_line_is_missing() {
        let mut unparsed = block(1, 1990, false);
        unparsed.variable = None;
        let file = explore_file(&scan("d.txt", vec![unparsed]), &catalog(), 1);
        assert!(!file.all_vars_created);
        assert_eq!(file.missing_variables.len(), 1);
    }

    #[test]
    fn test_unmapped_quality_code_clears_qualifiers_flag() {
        let catalog = catalog().with_qualifier(2, 20);
        let scans = vec![scan("a.txt", vec![block(1, 1990, false), block(1, 1991, true)])];

        // The maximum row carries no digit and needs the default code 3
        let report = explore_batch(&scans, &catalog, 3);
        assert_eq!(report.qualifiers, vec![20]);
        assert_eq!(report.missing_qualifiers, vec![3]);
        assert!(!report.all_qualifiers_created);
        assert!(!report.is_importable());
        assert!(report.summary().ends_with("missing qualifiers: 3"));

        let flagged_only = vec![scan("b.txt", vec![block(1, 1990, false)])];
        let report = explore_batch(&flagged_only, &catalog, 3);
        assert!(report.all_qualifiers_created);
    }

    #[test]
    fn test_report_serializes_with_camel_case_flags() {
        let report = explore_batch(&[scan("a.txt", vec![block(9, 1990, false)])], &catalog(), 1);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["allVarsCreated"], true);
        assert_eq!(json["allSitesCreated"], false);
        assert_eq!(json["stationCount"], 1);
        assert_eq!(json["missingSites"][0], 9);
        assert_eq!(json["allQualifiersCreated"], true);
    }
}
