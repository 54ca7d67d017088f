//! Year-block scanning for IDEAM bulletins.
//!
//! A bulletin is a sequence of year-blocks, each opened by the sentinel line.
//! `BlockScanner` tracks the line offset since the last sentinel and maps it to
//! a `LineRole`; the two passes of the merger are built on top of it:
//!
//! - [`scan_headers`] extracts station identity and metadata per block and
//!   folds consecutive blocks of the same station into one `StationHeader`;
//!   it also notes the quality codes each block's values carry
//! - [`scan_values`] decodes the daily rows and the monthly extrema rows

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, trace};

use crate::calendar::assign_date;
use crate::constants::{
    MAX_TAG, MIN_TAG, MONTHS_PER_LINE, PLAUSIBLE_YEARS, SENTINEL_LINE, fields, offsets,
};
use crate::decoder::{PositionTable, collapse_whitespace, decode_line, slice, text_field};
use crate::error::{IdeamError, Result};
use crate::models::{DecodedValue, StationCode, StationHeader};
use crate::variable::{VariableDescriptor, parse_variable_line};

/// Scanner state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// No sentinel seen yet; lines are ignored
    AwaitSentinel,
    /// Inside a year-block, `offset` lines after its sentinel
    InBlock { offset: usize },
}

/// What a line means given its offset inside a year-block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Sentinel,
    Variable,
    Station,
    Latitude,
    Longitude,
    Elevation,
    Daily,
    ExtremaPrimary,
    ExtremaSecondary,
    Other,
}

impl LineRole {
    pub fn for_offset(offset: usize) -> Self {
        match offset {
            0 => LineRole::Sentinel,
            offsets::VARIABLE => LineRole::Variable,
            offsets::STATION => LineRole::Station,
            offsets::LATITUDE => LineRole::Latitude,
            offsets::LONGITUDE => LineRole::Longitude,
            offsets::ELEVATION => LineRole::Elevation,
            offsets::FIRST_DAY..=offsets::LAST_DAY => LineRole::Daily,
            offsets::EXTREMA_PRIMARY => LineRole::ExtremaPrimary,
            offsets::EXTREMA_SECONDARY => LineRole::ExtremaSecondary,
            _ => LineRole::Other,
        }
    }
}

/// Line-position state machine over one file
#[derive(Debug, Clone)]
pub struct BlockScanner {
    state: ScanState,
}

impl Default for BlockScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::AwaitSentinel,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Feed the next line. Returns its role, or `None` before the first sentinel.
    pub fn advance(&mut self, line: &[u8]) -> Option<LineRole> {
        if is_sentinel(line) {
            self.state = ScanState::InBlock { offset: 0 };
            return Some(LineRole::Sentinel);
        }

        match self.state {
            ScanState::AwaitSentinel => None,
            ScanState::InBlock { offset } => {
                let offset = offset + 1;
                self.state = ScanState::InBlock { offset };
                Some(LineRole::for_offset(offset))
            }
        }
    }
}

pub fn is_sentinel(line: &[u8]) -> bool {
    // Cheap length filter before allocating
    if line.len() < SENTINEL_LINE.len() {
        return false;
    }
    let text: String = line.iter().map(|&b| char::from(b)).collect();
    collapse_whitespace(&text) == SENTINEL_LINE
}

/// Split file contents into lines without their `\n` / `\r\n` terminators
fn split_lines(contents: &[u8]) -> impl Iterator<Item = &[u8]> {
    let contents = contents.strip_suffix(b"\n").unwrap_or(contents);
    contents
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(move |_| !contents.is_empty())
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| IdeamError::ProcessingFailed {
        path: path.to_path_buf(),
        reason: format!("cannot read file: {}", e),
    })
}

/// Location of a line, used to report header failures
struct LineContext<'a> {
    path: &'a Path,
    line_number: usize,
}

impl LineContext<'_> {
    fn number<T: FromStr>(&self, line: &[u8], range: (usize, usize), field: &'static str) -> Result<T> {
        let text = text_field(line, range.0, range.1);
        text.parse::<T>()
            .map_err(|_| IdeamError::HeaderParsingFailed {
                path: self.path.to_path_buf(),
                line: self.line_number,
                field,
                reason: format!("'{}' is not a number", text),
            })
    }

    fn year(&self, line: &[u8]) -> Result<i32> {
        let year: i32 = self.number(line, fields::YEAR, "year")?;
        if !PLAUSIBLE_YEARS.contains(&year) {
            return Err(IdeamError::HeaderParsingFailed {
                path: self.path.to_path_buf(),
                line: self.line_number,
                field: "year",
                reason: format!(
                    "{} is outside {}..={}",
                    year,
                    PLAUSIBLE_YEARS.start(),
                    PLAUSIBLE_YEARS.end()
                ),
            });
        }
        Ok(year)
    }

    /// Degrees and minutes packed as `DDMM`, returned as decimal degrees
    fn coordinate(&self, line: &[u8], field: &'static str) -> Result<f64> {
        let degrees: u32 = self.number(line, fields::DEGREES, field)?;
        let minutes: u32 = self.number(line, fields::MINUTES, field)?;
        Ok(f64::from(degrees) + f64::from(minutes) / 60.0)
    }

    fn missing(&self, field: &'static str) -> IdeamError {
        IdeamError::HeaderParsingFailed {
            path: self.path.to_path_buf(),
            line: self.line_number,
            field,
            reason: "block header line is missing".to_string(),
        }
    }
}

fn direction(line: &[u8]) -> String {
    text_field(line, fields::DIRECTION.0, fields::DIRECTION.1)
}

fn extrema_tag(line: &[u8]) -> &[u8] {
    slice(line, fields::EXTREMA_TAG.0, fields::EXTREMA_TAG.1)
}

// =============================================================================
// Header pass
// =============================================================================

/// Per-block facts needed by pre-flight validation
#[derive(Debug, Clone, PartialEq)]
pub struct BlockSummary {
    pub code: StationCode,
    pub year: i32,
    pub variable: Option<VariableDescriptor>,
    pub station_type: String,
    pub has_max: bool,
    pub has_min: bool,
    /// Quality digits of the block's present values
    pub quality_codes: BTreeSet<u8>,
    /// Some present value carries no quality digit
    pub has_unflagged: bool,
}

impl BlockSummary {
    fn note_quality(&mut self, value: &DecodedValue) {
        if value.is_missing() {
            return;
        }
        match value.quality {
            Some(code) => {
                self.quality_codes.insert(code);
            }
            None => self.has_unflagged = true,
        }
    }
}

/// Result of the header pass over one file
#[derive(Debug, Clone)]
pub struct FileHeaderScan {
    pub path: PathBuf,
    /// One entry per run of consecutive blocks sharing a station code
    pub stations: Vec<StationHeader>,
    pub blocks: Vec<BlockSummary>,
}

impl FileHeaderScan {
    pub fn station_codes(&self) -> impl Iterator<Item = StationCode> + '_ {
        self.stations.iter().map(|station| station.code)
    }
}

/// Fields collected from the header lines of the current block
#[derive(Debug, Default)]
struct BlockDraft {
    variable: Option<VariableDescriptor>,
    year: Option<i32>,
    code: Option<StationCode>,
    name: Option<String>,
    latitude: Option<f64>,
    station_type: Option<String>,
    department: Option<String>,
    longitude: Option<f64>,
    municipality: Option<String>,
    /// Index into `blocks` once the header is complete
    summary: Option<usize>,
}

struct HeaderAccumulator<'a> {
    path: &'a Path,
    table: &'a PositionTable,
    draft: BlockDraft,
    in_progress: Option<StationHeader>,
    stations: Vec<StationHeader>,
    blocks: Vec<BlockSummary>,
}

impl<'a> HeaderAccumulator<'a> {
    fn new(path: &'a Path, table: &'a PositionTable) -> Self {
        Self {
            path,
            table,
            draft: BlockDraft::default(),
            in_progress: None,
            stations: Vec::new(),
            blocks: Vec::new(),
        }
    }

    fn handle(&mut self, role: LineRole, line: &[u8], line_number: usize) -> Result<()> {
        let ctx = LineContext {
            path: self.path,
            line_number,
        };

        match role {
            LineRole::Sentinel => self.draft = BlockDraft::default(),
            LineRole::Variable => {
                let text: String = line.iter().map(|&b| char::from(b)).collect();
                self.draft.variable = parse_variable_line(&text);
            }
            LineRole::Station => {
                self.draft.year = Some(ctx.year(line)?);
                self.draft.code = Some(ctx.number(line, fields::STATION_CODE, "station code")?);
                self.draft.name = Some(text_field(line, fields::STATION_NAME_START, line.len()));
            }
            LineRole::Latitude => {
                let latitude = ctx.coordinate(line, "latitude")?;
                self.draft.latitude = Some(if direction(line) == "S" {
                    -latitude
                } else {
                    latitude
                });
                self.draft.station_type = Some(text_field(
                    line,
                    fields::STATION_TYPE.0,
                    fields::STATION_TYPE.1,
                ));
                self.draft.department =
                    Some(text_field(line, fields::PLACE_NAME.0, fields::PLACE_NAME.1));
            }
            LineRole::Longitude => {
                let longitude = ctx.coordinate(line, "longitude")?;
                self.draft.longitude = Some(if direction(line) == "E" {
                    longitude
                } else {
                    -longitude
                });
                self.draft.municipality =
                    Some(text_field(line, fields::PLACE_NAME.0, fields::PLACE_NAME.1));
            }
            LineRole::Elevation => {
                let elevation: i32 = ctx.number(line, fields::ELEVATION, "elevation")?;
                let river = text_field(line, fields::PLACE_NAME.0, fields::PLACE_NAME.1);
                let header = self.complete_block(&ctx, elevation, river)?;
                self.extend_run(header);
            }
            LineRole::Daily => {
                let Some(index) = self.draft.summary else {
                    return Ok(());
                };
                let Ok(day) = text_field(line, fields::DAY.0, fields::DAY.1).parse::<u32>() else {
                    return Ok(());
                };
                let block = &mut self.blocks[index];
                for (month0, value) in decode_line(line, self.table).iter().enumerate() {
                    if assign_date(block.year, month0 as u32 + 1, day).is_some() {
                        block.note_quality(value);
                    }
                }
            }
            LineRole::ExtremaPrimary | LineRole::ExtremaSecondary => {
                if let Some(index) = self.draft.summary {
                    let tag = extrema_tag(line);
                    let block = &mut self.blocks[index];
                    if role == LineRole::ExtremaPrimary && tag == MAX_TAG {
                        block.has_max = true;
                    } else if tag == MIN_TAG {
                        block.has_min = true;
                    } else {
                        return Ok(());
                    }
                    for value in decode_line(line, self.table).iter() {
                        block.note_quality(value);
                    }
                }
            }
            LineRole::Other => {}
        }
        Ok(())
    }

    /// Build the block's header once its last header line has been read
    fn complete_block(
        &mut self,
        ctx: &LineContext<'_>,
        elevation: i32,
        river: String,
    ) -> Result<StationHeader> {
        let draft = &mut self.draft;
        let year = draft.year.ok_or_else(|| ctx.missing("year"))?;
        let code = draft.code.ok_or_else(|| ctx.missing("station code"))?;
        let latitude = draft.latitude.ok_or_else(|| ctx.missing("latitude"))?;
        let longitude = draft.longitude.ok_or_else(|| ctx.missing("longitude"))?;
        let station_type = draft.station_type.take().unwrap_or_default();

        self.blocks.push(BlockSummary {
            code,
            year,
            variable: draft.variable.clone(),
            station_type: station_type.clone(),
            has_max: false,
            has_min: false,
            quality_codes: BTreeSet::new(),
            has_unflagged: false,
        });
        draft.summary = Some(self.blocks.len() - 1);

        Ok(StationHeader {
            code,
            name: draft.name.take().unwrap_or_default(),
            latitude,
            longitude,
            elevation,
            station_type,
            river: Some(river).filter(|river| !river.is_empty()),
            department: draft.department.take().unwrap_or_default(),
            municipality: draft.municipality.take().unwrap_or_default(),
            variable: draft.variable.clone(),
            registration_years: [year].into_iter().collect(),
        })
    }

    /// Consecutive blocks of one station extend its year list; a code change
    /// finalizes the previous station without the new block's year.
    fn extend_run(&mut self, header: StationHeader) {
        match self.in_progress.as_mut() {
            Some(current) if current.code == header.code => current.absorb_years(&header),
            _ => {
                if let Some(finished) = self.in_progress.replace(header) {
                    trace!("Station {} finalized with {} years", finished.code, finished.registration_years.len());
                    self.stations.push(finished);
                }
            }
        }
    }

    fn finish(mut self) -> FileHeaderScan {
        if let Some(finished) = self.in_progress.take() {
            self.stations.push(finished);
        }
        FileHeaderScan {
            path: self.path.to_path_buf(),
            stations: self.stations,
            blocks: self.blocks,
        }
    }
}

/// Header pass over one file
pub fn scan_headers(path: &Path, table: &PositionTable) -> Result<FileHeaderScan> {
    let contents = read_file(path)?;
    scan_headers_from(path, &contents, table)
}

/// Header pass over in-memory contents; `path` is only used in reports
pub fn scan_headers_from(path: &Path, contents: &[u8], table: &PositionTable) -> Result<FileHeaderScan> {
    let mut scanner = BlockScanner::new();
    let mut accumulator = HeaderAccumulator::new(path, table);

    for (index, line) in split_lines(contents).enumerate() {
        if let Some(role) = scanner.advance(line) {
            accumulator.handle(role, line, index + 1)?;
        }
    }

    let scan = accumulator.finish();
    debug!(
        "Scanned headers of {}: {} stations, {} blocks",
        path.display(),
        scan.stations.len(),
        scan.blocks.len()
    );
    Ok(scan)
}

// =============================================================================
// Value pass
// =============================================================================

/// Decoded rows of one year-block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockValues {
    pub code: StationCode,
    pub year: i32,
    /// (day of month, values January..December)
    pub daily: Vec<(u32, [DecodedValue; MONTHS_PER_LINE])>,
    pub monthly_max: Option<[DecodedValue; MONTHS_PER_LINE]>,
    pub monthly_min: Option<[DecodedValue; MONTHS_PER_LINE]>,
}

impl BlockValues {
    fn new(code: StationCode, year: i32) -> Self {
        Self {
            code,
            year,
            daily: Vec::new(),
            monthly_max: None,
            monthly_min: None,
        }
    }
}

/// Result of the value pass over one file
#[derive(Debug, Clone)]
pub struct FileValues {
    pub path: PathBuf,
    pub blocks: Vec<BlockValues>,
}

/// Value pass over one file
pub fn scan_values(path: &Path, table: &PositionTable) -> Result<FileValues> {
    let contents = read_file(path)?;
    scan_values_from(path, &contents, table)
}

/// Value pass over in-memory contents; `path` is only used in reports
pub fn scan_values_from(path: &Path, contents: &[u8], table: &PositionTable) -> Result<FileValues> {
    let mut scanner = BlockScanner::new();
    let mut blocks = Vec::new();
    let mut current: Option<BlockValues> = None;
    // Station line read, header not yet complete
    let mut opening: Option<(StationCode, i32)> = None;

    for (index, line) in split_lines(contents).enumerate() {
        let Some(role) = scanner.advance(line) else {
            continue;
        };
        let ctx = LineContext {
            path,
            line_number: index + 1,
        };

        match role {
            LineRole::Sentinel => {
                blocks.extend(current.take());
                opening = None;
            }
            LineRole::Station => {
                let year = ctx.year(line)?;
                let code = ctx.number(line, fields::STATION_CODE, "station code")?;
                opening = Some((code, year));
            }
            // Same rule as the header pass: a block counts once its
            // elevation line has been read
            LineRole::Elevation => {
                current = opening.take().map(|(code, year)| BlockValues::new(code, year));
            }
            LineRole::Daily => {
                let Some(block) = current.as_mut() else {
                    continue;
                };
                match text_field(line, fields::DAY.0, fields::DAY.1).parse::<u32>() {
                    Ok(day) => block.daily.push((day, decode_line(line, table))),
                    Err(_) => trace!("{}:{} has no day number, skipped", path.display(), index + 1),
                }
            }
            LineRole::ExtremaPrimary | LineRole::ExtremaSecondary => {
                let Some(block) = current.as_mut() else {
                    continue;
                };
                let tag = extrema_tag(line);
                if role == LineRole::ExtremaPrimary && tag == MAX_TAG {
                    block.monthly_max = Some(decode_line(line, table));
                } else if tag == MIN_TAG {
                    block.monthly_min = Some(decode_line(line, table));
                }
            }
            _ => {}
        }
    }
    blocks.extend(current);

    debug!("Decoded {} blocks from {}", blocks.len(), path.display());
    Ok(FileValues {
        path: path.to_path_buf(),
        blocks,
    })
}
