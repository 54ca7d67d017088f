//! Identifier lookup against the hydrology store's catalog.
//!
//! The store itself is out of reach; callers supply its lookup tables through
//! `LookupCatalog`. `InMemoryCatalog` is the JSON-backed implementation used by
//! the CLI.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{IdeamError, Result};
use crate::models::{SeriesKind, StationCode};
use crate::variable::{Aggregation, TimeResolution, VariableDescriptor};

/// Lookup tables of the relational store
pub trait LookupCatalog {
    fn site_id(&self, code: StationCode) -> Option<i64>;

    /// Variable by name and aggregation. `None` resolution matches any.
    fn variable_id(
        &self,
        name: &str,
        aggregation: Aggregation,
        resolution: Option<TimeResolution>,
    ) -> Option<i64>;

    /// Method whose description ends with the station type code
    fn method_id(&self, station_type: &str) -> Option<i64>;

    /// Qualifier for a quality digit; quality digits are qualifier ids unless
    /// the catalog maps them
    fn qualifier_id(&self, code: u8) -> Option<i64> {
        Some(i64::from(code))
    }
}

/// Variable a series kind resolves to in the catalog
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableKey {
    pub name: String,
    pub aggregation: Aggregation,
    pub resolution: Option<TimeResolution>,
}

impl VariableKey {
    /// The daily series keeps the block's own statistic; monthly extrema map
    /// to the Maximum/Minimum variable of the same name.
    pub fn for_kind(variable: &VariableDescriptor, kind: SeriesKind) -> Self {
        let (aggregation, resolution) = match kind {
            SeriesKind::DailyMean => (variable.aggregation, variable.time_resolution),
            SeriesKind::MonthlyMax => (Aggregation::Maximum, None),
            SeriesKind::MonthlyMin => (Aggregation::Minimum, None),
        };
        Self {
            name: variable.name.clone(),
            aggregation,
            resolution,
        }
    }

    pub fn resolve(&self, catalog: &dyn LookupCatalog) -> Option<i64> {
        catalog.variable_id(&self.name, self.aggregation, self.resolution)
    }
}

impl std::fmt::Display for VariableKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}", self.name, self.aggregation.as_str())?;
        if let Some(resolution) = self.resolution {
            write!(f, ", {}", resolution.as_str())?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogVariable {
    pub id: i64,
    pub variable: String,
    #[serde(default)]
    pub time_resolution: Option<TimeResolution>,
    #[serde(rename = "type")]
    pub aggregation: Aggregation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogMethod {
    pub id: i64,
    pub description: String,
}

/// Catalog held in memory, loaded from JSON such as
///
/// ```json
/// {
///   "sites": { "12345678": 1 },
///   "variables": [
///     { "id": 1, "variable": "Streamflow", "timeResolution": "day", "type": "Average" }
///   ],
///   "methods": [ { "id": 1, "description": "Limnigrafica LG" } ]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryCatalog {
    pub sites: BTreeMap<StationCode, i64>,
    pub variables: Vec<CatalogVariable>,
    pub methods: Vec<CatalogMethod>,
    /// Empty means quality digits are used as qualifier ids directly
    pub qualifiers: BTreeMap<u8, i64>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| IdeamError::Configuration {
            message: format!("cannot read catalog {}: {}", path.display(), e),
        })?;
        let catalog: Self = serde_json::from_str(&contents)?;
        debug!(
            "Catalog {}: {} sites, {} variables, {} methods",
            path.display(),
            catalog.sites.len(),
            catalog.variables.len(),
            catalog.methods.len()
        );
        Ok(catalog)
    }

    pub fn with_site(mut self, code: StationCode, id: i64) -> Self {
        self.sites.insert(code, id);
        self
    }

    pub fn with_variable(
        mut self,
        id: i64,
        name: &str,
        aggregation: Aggregation,
        time_resolution: Option<TimeResolution>,
    ) -> Self {
        self.variables.push(CatalogVariable {
            id,
            variable: name.to_string(),
            time_resolution,
            aggregation,
        });
        self
    }

    pub fn with_method(mut self, id: i64, description: &str) -> Self {
        self.methods.push(CatalogMethod {
            id,
            description: description.to_string(),
        });
        self
    }

    pub fn with_qualifier(mut self, code: u8, id: i64) -> Self {
        self.qualifiers.insert(code, id);
        self
    }
}

impl LookupCatalog for InMemoryCatalog {
    fn site_id(&self, code: StationCode) -> Option<i64> {
        self.sites.get(&code).copied()
    }

    fn variable_id(
        &self,
        name: &str,
        aggregation: Aggregation,
        resolution: Option<TimeResolution>,
    ) -> Option<i64> {
        self.variables
            .iter()
            .find(|v| {
                v.variable == name
                    && v.aggregation == aggregation
                    && (resolution.is_none() || v.time_resolution == resolution)
            })
            .map(|v| v.id)
    }

    fn method_id(&self, station_type: &str) -> Option<i64> {
        let station_type = station_type.trim();
        if station_type.is_empty() {
            return None;
        }
        self.methods
            .iter()
            .find(|m| m.description.trim_end().ends_with(station_type))
            .map(|m| m.id)
    }

    fn qualifier_id(&self, code: u8) -> Option<i64> {
        if self.qualifiers.is_empty() {
            Some(i64::from(code))
        } else {
            self.qualifiers.get(&code).copied()
        }
    }
}
