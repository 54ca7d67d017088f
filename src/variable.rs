//! Variable description line parsing.
//!
//! The third line of each year-block names the measured variable, e.g.
//! `VALORES MEDIOS DIARIOS DE CAUDALES (m3/seg)`. The words are Spanish
//! bulletin vocabulary; they are mapped onto the controlled vocabulary used by
//! the hydrology store's variable catalog.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use tracing::debug;

static UNIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(([^)]*)\)").expect("unit pattern is a valid regex"));

/// Statistic a series value represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Aggregation {
    Average,
    Maximum,
    Minimum,
    Cumulative,
}

impl Aggregation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregation::Average => "Average",
            Aggregation::Maximum => "Maximum",
            Aggregation::Minimum => "Minimum",
            Aggregation::Cumulative => "Cumulative",
        }
    }

    fn from_bulletin_word(word: &str) -> Self {
        match word {
            "MEDIOS" | "MEDIA" => Aggregation::Average,
            "MAXIMOS" => Aggregation::Maximum,
            "MINIMOS" => Aggregation::Minimum,
            "TOTALES" => Aggregation::Cumulative,
            _ => Aggregation::Average,
        }
    }
}

/// Sampling interval of a series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeResolution {
    Day,
    Month,
}

impl TimeResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeResolution::Day => "day",
            TimeResolution::Month => "month",
        }
    }
}

/// Variable measured by a year-block
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VariableDescriptor {
    pub name: String,
    pub aggregation: Aggregation,
    pub time_resolution: Option<TimeResolution>,
    pub unit: Option<String>,
}

impl VariableDescriptor {
    /// Name reduced to a CSV-friendly identifier, e.g. `Water_depth`
    pub fn column_stem(&self) -> String {
        self.name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }
}

impl fmt::Display for VariableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.name, self.aggregation.as_str())?;
        if let Some(resolution) = self.time_resolution {
            write!(f, ", {}", resolution.as_str())?;
        }
        f.write_str(")")
    }
}

/// Parse a variable description line. Lines with fewer than five words
/// carry no usable description.
pub fn parse_variable_line(line: &str) -> Option<VariableDescriptor> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < 5 {
        debug!("Variable line too short to describe a variable: {:?}", line.trim());
        return None;
    }

    let aggregation = Aggregation::from_bulletin_word(words[1]);

    let time_resolution = match (words[1], words[2]) {
        (_, "DIARIOS" | "DIARIA") | ("DIARIO", _) => Some(TimeResolution::Day),
        (_, "MENSUALES") => Some(TimeResolution::Month),
        _ => None,
    };

    let name = match (words[0], words[4]) {
        (_, "CAUDALES") => "Streamflow".to_string(),
        (_, "PRECIPITACION") => "Precipitation".to_string(),
        (_, "NIVELES") => "Water depth".to_string(),
        (_, "SEDIMENTOS") => "Sediment, suspended".to_string(),
        ("TRANSPORTE", _) => "Solids, total suspended".to_string(),
        (_, other) => other.to_string(),
    };

    let unit = UNIT_PATTERN
        .captures(line)
        .and_then(|captures| captures.get(1))
        .map(|unit| unit.as_str().trim().to_string())
        .filter(|unit| !unit.is_empty());

    Some(VariableDescriptor {
        name,
        aggregation,
        time_resolution,
        unit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_mean_streamflow() {
        let variable =
            parse_variable_line("         VALORES MEDIOS DIARIOS DE CAUDALES (m3/seg)").unwrap();

        assert_eq!(variable.name, "Streamflow");
        assert_eq!(variable.aggregation, Aggregation::Average);
        assert_eq!(variable.time_resolution, Some(TimeResolution::Day));
        assert_eq!(variable.unit.as_deref(), Some("m3/seg"));
    }

    #[test]
    fn test_total_daily_precipitation() {
        let variable = parse_variable_line("VALORES TOTALES DIARIOS DE PRECIPITACION (mms)").unwrap();
        assert_eq!(variable.name, "Precipitation");
        assert_eq!(variable.aggregation, Aggregation::Cumulative);
    }

    #[test]
    fn test_monthly_levels_without_unit() {
        let variable = parse_variable_line("VALORES MAXIMOS MENSUALES DE NIVELES").unwrap();
        assert_eq!(variable.name, "Water depth");
        assert_eq!(variable.aggregation, Aggregation::Maximum);
        assert_eq!(variable.time_resolution, Some(TimeResolution::Month));
        assert_eq!(variable.unit, None);
        assert_eq!(variable.column_stem(), "Water_depth");
    }

    #[test]
    fn test_sediment_transport() {
        let variable =
            parse_variable_line("TRANSPORTE DIARIO DE SOLIDOS EN SUSPENSION (Kt/dia)").unwrap();
        assert_eq!(variable.name, "Solids, total suspended");
        assert_eq!(variable.time_resolution, Some(TimeResolution::Day));
        assert_eq!(variable.column_stem(), "Solids_total_suspended");
    }

    #[test]
    fn test_unknown_words_are_kept() {
        let variable = parse_variable_line("VALORES RAROS DIARIOS DE EVAPORACION (mm)").unwrap();
        assert_eq!(variable.name, "EVAPORACION");
        assert_eq!(variable.aggregation, Aggregation::Average);
    }

    #[test]
    fn test_short_line_is_rejected() {
        assert!(parse_variable_line("").is_none());
        assert!(parse_variable_line("FECHA DE PROCESO").is_none());
    }
}
