//! Integration tests for the processor module
//!
//! Runs the full pipeline over synthetic IDEAM bulletins written to
//! temporary directories.

pub mod error_handling;

use crate::constants::{MONTH_FIELD_RANGES, SENTINEL_LINE};
use std::fs;
use std::path::{Path, PathBuf};

const BLOCK_LINES: usize = 50;

fn put(line: &mut Vec<u8>, column: usize, text: &str) {
    if line.len() < column + text.len() {
        line.resize(column + text.len(), b' ');
    }
    line[column..column + text.len()].copy_from_slice(text.as_bytes());
}

/// One synthetic year-block of a bulletin
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    code: u32,
    year: i32,
    name: String,
    variable_line: String,
    station_type: String,
    latitude: String,
    elevation: String,
    /// (day, month index, value text, quality digit)
    daily: Vec<(u32, usize, String, Option<char>)>,
    max_row: Option<Vec<(usize, String)>>,
    min_row: Option<Vec<(usize, String)>>,
    /// Put the MIN row where the MAX row usually sits
    min_at_primary: bool,
}

pub fn year_block(code: u32, year: i32) -> BlockBuilder {
    BlockBuilder {
        code,
        year,
        name: "PUENTE REAL [12345678]".to_string(),
        variable_line: "VALORES MEDIOS DIARIOS DE CAUDALES (m3/seg)".to_string(),
        station_type: "LG".to_string(),
        latitude: "0412 N".to_string(),
        elevation: " 1450".to_string(),
        daily: Vec::new(),
        max_row: None,
        min_row: None,
        min_at_primary: false,
    }
}

impl BlockBuilder {
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn variable_line(mut self, line: &str) -> Self {
        self.variable_line = line.to_string();
        self
    }

    pub fn station_type(mut self, station_type: &str) -> Self {
        self.station_type = station_type.to_string();
        self
    }

    pub fn elevation(mut self, text: &str) -> Self {
        self.elevation = text.to_string();
        self
    }

    /// Value for `day` of month `month` (1-based)
    pub fn daily(mut self, day: u32, month: usize, value: f64, quality: Option<char>) -> Self {
        self.daily
            .push((day, month - 1, format!("{:>8.2}", value), quality));
        self
    }

    /// Same value on every day row for every month, no quality digit
    pub fn every_day(mut self, value: f64) -> Self {
        for day in 1..=31 {
            for month in 0..12 {
                self.daily.push((day, month, format!("{:>8.2}", value), None));
            }
        }
        self
    }

    pub fn max_row(mut self, value: f64) -> Self {
        self.max_row = Some((0..12).map(|m| (m, format!("{:>8.2}", value))).collect());
        self
    }

    pub fn min_row(mut self, value: f64) -> Self {
        self.min_row = Some((0..12).map(|m| (m, format!("{:>8.2}", value))).collect());
        self
    }

    pub fn min_at_primary(mut self) -> Self {
        self.min_at_primary = true;
        self
    }

    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<Vec<u8>> = vec![Vec::new(); BLOCK_LINES];
        lines[0] = SENTINEL_LINE.as_bytes().to_vec();
        put(&mut lines[1], 0, "FECHA DE PROCESO : 1999/05/10");
        put(&mut lines[2], 9, &self.variable_line);
        put(&mut lines[4], 2, "ANO");
        put(&mut lines[4], 59, &format!("{:>5}", self.year));
        put(&mut lines[4], 104, &format!("{:>9}", self.code));
        put(&mut lines[4], 114, &self.name);
        put(&mut lines[6], 2, "LATITUD");
        put(&mut lines[6], 15, &self.latitude);
        put(&mut lines[6], 48, &self.station_type);
        put(&mut lines[6], 80, "ANTIOQUIA");
        put(&mut lines[7], 2, "LONGITUD");
        put(&mut lines[7], 15, "7530 W");
        put(&mut lines[7], 80, "MEDELLIN");
        put(&mut lines[8], 2, "ELEVACION");
        put(&mut lines[8], 15, &self.elevation);
        put(&mut lines[8], 80, "RIO PORCE");
        put(&mut lines[11], 3, "DIA");

        for day in 1..=31u32 {
            put(&mut lines[13 + day as usize], 11, &format!("{:02}", day));
        }
        for (day, month, text, quality) in &self.daily {
            let row = &mut lines[13 + *day as usize];
            let (start, end) = MONTH_FIELD_RANGES[*month];
            put(row, start, text);
            if let Some(q) = quality {
                put(row, end, &q.to_string());
            }
        }

        let (max_offset, min_offset) = if self.min_at_primary {
            (None, 47)
        } else {
            (Some(47), 48)
        };
        if let (Some(row), Some(offset)) = (&self.max_row, max_offset) {
            put(&mut lines[offset], 0, "MAXIMOS");
            for (month, text) in row {
                put(&mut lines[offset], MONTH_FIELD_RANGES[*month].0, text);
            }
        }
        if let Some(row) = &self.min_row {
            put(&mut lines[min_offset], 0, "MINIMOS");
            for (month, text) in row {
                put(&mut lines[min_offset], MONTH_FIELD_RANGES[*month].0, text);
            }
        }
        put(&mut lines[BLOCK_LINES - 1], 0, "TOTAL ANUAL");

        lines
            .into_iter()
            .map(|line| String::from_utf8(line).unwrap())
            .collect()
    }
}

/// Write a bulletin made of `blocks` to `dir/name`
pub fn write_bulletin(dir: &Path, name: &str, blocks: &[BlockBuilder]) -> PathBuf {
    let mut text = String::from("\n");
    for block in blocks {
        for line in block.lines() {
            text.push_str(&line);
            text.push('\n');
        }
    }
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}
