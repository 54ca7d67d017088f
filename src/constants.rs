//! Layout constants for IDEAM fixed-width station bulletins.
//!
//! Byte ranges are 0-indexed and end-exclusive. Line offsets count lines
//! since the most recent sentinel line, which itself sits at offset 0.

use std::ops::RangeInclusive;

// =============================================================================
// Block framing
// =============================================================================

/// Sentinel text opening every year-block, compared after collapsing runs of
/// whitespace to a single space.
pub const SENTINEL_LINE: &str =
    "I D E A M - INSTITUTO DE HIDROLOGIA, METEOROLOGIA Y ESTUDIOS AMBIENTALES";

/// Minimum width of a value line holding all twelve month fields
pub const MIN_RECORD_WIDTH: usize = 125;

/// Number of month fields per value line
pub const MONTHS_PER_LINE: usize = 12;

/// Line offsets within a year-block
pub mod offsets {
    /// Variable description, e.g. `VALORES MEDIOS DIARIOS DE CAUDALES (m3/seg)`
    pub const VARIABLE: usize = 2;
    /// Registration year, station code and station name
    pub const STATION: usize = 4;
    /// Latitude, station type and department
    pub const LATITUDE: usize = 6;
    /// Longitude and municipality
    pub const LONGITUDE: usize = 7;
    /// Elevation and river name; the block header is complete after this line
    pub const ELEVATION: usize = 8;
    /// First daily value row (day 1)
    pub const FIRST_DAY: usize = 14;
    /// Last daily value row (day 31)
    pub const LAST_DAY: usize = 44;
    /// Row where the monthly maximum (or, in some exports, minimum) lives
    pub const EXTREMA_PRIMARY: usize = 47;
    /// Row where the monthly minimum lives when the maximum row is present
    pub const EXTREMA_SECONDARY: usize = 48;
}

// =============================================================================
// Field positions
// =============================================================================

/// Month value fields, January through December
pub const MONTH_FIELD_RANGES: [(usize, usize); MONTHS_PER_LINE] = [
    (18, 26),
    (27, 35),
    (36, 44),
    (45, 53),
    (54, 62),
    (63, 71),
    (72, 80),
    (81, 89),
    (90, 98),
    (99, 107),
    (108, 116),
    (117, 125),
];

/// Byte ranges of block-header fields
pub mod fields {
    pub const YEAR: (usize, usize) = (59, 64);
    pub const STATION_CODE: (usize, usize) = (104, 113);
    /// Station name runs from this column to the end of the line
    pub const STATION_NAME_START: usize = 114;

    pub const DEGREES: (usize, usize) = (15, 17);
    pub const MINUTES: (usize, usize) = (17, 19);
    pub const DIRECTION: (usize, usize) = (20, 22);
    pub const STATION_TYPE: (usize, usize) = (48, 51);
    /// Department on the latitude line, municipality on the longitude line,
    /// river name on the elevation line
    pub const PLACE_NAME: (usize, usize) = (80, 104);
    pub const ELEVATION: (usize, usize) = (15, 20);

    pub const DAY: (usize, usize) = (11, 13);
    pub const EXTREMA_TAG: (usize, usize) = (0, 3);
}

/// Years a block header may carry; anything else is a corrupt header
pub const PLAUSIBLE_YEARS: RangeInclusive<i32> = 1800..=2200;

/// Tag opening the monthly maximum row
pub const MAX_TAG: &[u8] = b"MAX";

/// Tag opening the monthly minimum row
pub const MIN_TAG: &[u8] = b"MIN";

// =============================================================================
// Batch defaults
// =============================================================================

/// Colombia's offset from UTC in hours
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = -5;

/// Local hour stamped on every daily and monthly value
pub const LOCAL_OBSERVATION_HOUR: u32 = 12;

/// Qualifier code applied when a value carries no quality digit
pub const DEFAULT_QUALIFIER_CODE: u8 = 1;

/// Censor code term applied when the caller supplies none ("not censored")
pub const DEFAULT_CENSOR_CODE: &str = "nc";

/// Bulletin file name pattern
pub const DEFAULT_FILE_PATTERN: &str = "*.txt";

/// Output sub-directories for the per-station CSV export
pub const DAILY_MEAN_DIR: &str = "daily_mean";
pub const MONTHLY_MAX_DIR: &str = "monthly_max";
pub const MONTHLY_MIN_DIR: &str = "monthly_min";

/// Quality column name shared by every CSV export
pub const QUALITY_COLUMN: &str = "Data_Quality";
