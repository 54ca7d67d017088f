//! Fixed-width decoder for IDEAM value lines.
//!
//! A value line carries twelve month fields at fixed byte ranges. Each field
//! may be followed by a single quality digit. Malformed or blank fields decode
//! to missing values; decoding never fails as a whole.

use crate::constants::{MONTH_FIELD_RANGES, MONTHS_PER_LINE};
use crate::error::{IdeamError, Result};
use crate::models::DecodedValue;

/// Ordered byte ranges locating each month's value field within a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionTable {
    ranges: [(usize, usize); MONTHS_PER_LINE],
}

impl Default for PositionTable {
    fn default() -> Self {
        Self::ideam()
    }
}

impl PositionTable {
    /// The table used by IDEAM bulletins
    pub const fn ideam() -> Self {
        Self {
            ranges: MONTH_FIELD_RANGES,
        }
    }

    /// Build a custom table. Every range must be non-empty and the ranges
    /// must not overlap, including the quality column trailing each one.
    pub fn new(ranges: [(usize, usize); MONTHS_PER_LINE]) -> Result<Self> {
        let mut previous_end = None;
        for (month, &(start, end)) in ranges.iter().enumerate() {
            if start >= end {
                return Err(IdeamError::InvalidPositionTable {
                    reason: format!("month {} has empty range ({}, {})", month + 1, start, end),
                });
            }
            if let Some(previous) = previous_end {
                if start <= previous {
                    return Err(IdeamError::InvalidPositionTable {
                        reason: format!(
                            "month {} starts at {} inside the previous field or its quality column",
                            month + 1,
                            start
                        ),
                    });
                }
            }
            previous_end = Some(end);
        }
        Ok(Self { ranges })
    }

    pub fn ranges(&self) -> &[(usize, usize); MONTHS_PER_LINE] {
        &self.ranges
    }

    /// Width a line needs for every field to be fully present
    pub fn record_width(&self) -> usize {
        self.ranges[MONTHS_PER_LINE - 1].1
    }
}

/// Decode the twelve month fields of a value line, January first
pub fn decode_line(line: &[u8], table: &PositionTable) -> [DecodedValue; MONTHS_PER_LINE] {
    let mut decoded = [DecodedValue::MISSING; MONTHS_PER_LINE];
    for (slot, &(start, end)) in decoded.iter_mut().zip(table.ranges.iter()) {
        *slot = decode_field(line, start, end);
    }
    decoded
}

/// Decode one field. The quality digit is only read for a present value.
pub fn decode_field(line: &[u8], start: usize, end: usize) -> DecodedValue {
    let Some(value) = parse_number(slice(line, start, end)) else {
        return DecodedValue::MISSING;
    };

    let quality = line
        .get(end)
        .filter(|byte| byte.is_ascii_digit())
        .map(|byte| byte - b'0');

    DecodedValue::new(value, quality)
}

/// Byte slice with the forgiving bounds of positional text: ranges past the
/// end of the line shrink or become empty instead of failing.
pub fn slice(line: &[u8], start: usize, end: usize) -> &[u8] {
    let end = end.min(line.len());
    if start >= end { &[] } else { &line[start..end] }
}

/// Trimmed text of a byte range, with internal whitespace runs collapsed.
/// Bulletins are Latin-1, so every byte maps to exactly one char.
pub fn text_field(line: &[u8], start: usize, end: usize) -> String {
    let text: String = slice(line, start, end).iter().map(|&b| char::from(b)).collect();
    collapse_whitespace(&text)
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_number(field: &[u8]) -> Option<f64> {
    let text = std::str::from_utf8(field).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}
