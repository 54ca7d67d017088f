//! Dense date-indexed series.
//!
//! Every date between the first and last index entry has a slot; missing
//! observations are `None` rather than absent keys.

use chrono::{Datelike, Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::calendar::month_end;
use crate::models::{DecodedValue, SeriesKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    /// One entry per month, indexed on the month's last day
    MonthEnd,
}

/// A value series with its parallel quality-code series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatedSeries {
    start: NaiveDate,
    frequency: Frequency,
    values: Vec<Option<f64>>,
    quality: Vec<Option<u8>>,
}

impl DatedSeries {
    /// Series covering Jan 1 of `first_year` to Dec 31 of `last_year`, all missing
    pub fn allocate(frequency: Frequency, first_year: i32, last_year: i32) -> Self {
        let (first_year, last_year) = (first_year.min(last_year), first_year.max(last_year));
        let (start, len) = match frequency {
            Frequency::Daily => {
                let start = NaiveDate::from_ymd_opt(first_year, 1, 1).unwrap_or_default();
                let end = NaiveDate::from_ymd_opt(last_year, 12, 31).unwrap_or(start);
                (start, (end - start).num_days() as usize + 1)
            }
            Frequency::MonthEnd => {
                let start = month_end(first_year, 1).unwrap_or_default();
                (start, (last_year - first_year + 1) as usize * 12)
            }
        };

        Self {
            start,
            frequency,
            values: vec![None; len],
            quality: vec![None; len],
        }
    }

    pub fn frequency(&self) -> Frequency {
        self.frequency
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first_date(&self) -> NaiveDate {
        self.start
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.date_at(self.len().checked_sub(1)?)
    }

    /// Date of the slot at `index`
    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        if index >= self.len() {
            return None;
        }
        match self.frequency {
            Frequency::Daily => self.start.checked_add_days(Days::new(index as u64)),
            Frequency::MonthEnd => {
                let months = self.start.month0() as usize + index;
                month_end(self.start.year() + (months / 12) as i32, (months % 12) as u32 + 1)
            }
        }
    }

    /// Slot holding `date`. Monthly series accept any day of the month.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        let index = match self.frequency {
            Frequency::Daily => (date - self.start).num_days(),
            Frequency::MonthEnd => {
                let months = |d: NaiveDate| i64::from(d.year()) * 12 + i64::from(d.month0());
                months(date) - months(self.start)
            }
        };
        usize::try_from(index).ok().filter(|&index| index < self.len())
    }

    pub fn get(&self, date: NaiveDate) -> Option<DecodedValue> {
        let index = self.index_of(date)?;
        Some(DecodedValue {
            value: self.values[index],
            quality: self.quality[index],
        })
    }

    /// Write a value and its quality code. Returns false when the date lies
    /// outside the allocated span.
    pub fn set(&mut self, date: NaiveDate, value: DecodedValue) -> bool {
        match self.index_of(date) {
            Some(index) => {
                self.values[index] = value.value;
                self.quality[index] = value.quality;
                true
            }
            None => false,
        }
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn quality(&self) -> &[Option<u8>] {
        &self.quality
    }

    /// Every slot in date order
    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, DecodedValue)> + '_ {
        (0..self.len()).filter_map(move |index| {
            let date = self.date_at(index)?;
            Some((
                date,
                DecodedValue {
                    value: self.values[index],
                    quality: self.quality[index],
                },
            ))
        })
    }

    /// Slots holding a value
    pub fn observations(&self) -> impl Iterator<Item = (NaiveDate, DecodedValue)> + '_ {
        self.iter().filter(|(_, value)| !value.is_missing())
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    /// Copy of this series over a wider span, keeping every written slot
    pub fn widened(&self, first_year: i32, last_year: i32) -> Self {
        let mut widened = Self::allocate(self.frequency, first_year, last_year);
        for (date, value) in self.observations() {
            widened.set(date, value);
        }
        widened
    }
}

/// The three series kept for every station, sharing one year span
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSeries {
    first_year: i32,
    last_year: i32,
    pub daily_mean: DatedSeries,
    pub monthly_max: DatedSeries,
    pub monthly_min: DatedSeries,
}

impl StationSeries {
    pub fn allocate(first_year: i32, last_year: i32) -> Self {
        Self {
            first_year,
            last_year,
            daily_mean: DatedSeries::allocate(Frequency::Daily, first_year, last_year),
            monthly_max: DatedSeries::allocate(Frequency::MonthEnd, first_year, last_year),
            monthly_min: DatedSeries::allocate(Frequency::MonthEnd, first_year, last_year),
        }
    }

    pub fn span(&self) -> (i32, i32) {
        (self.first_year, self.last_year)
    }

    pub fn get(&self, kind: SeriesKind) -> &DatedSeries {
        match kind {
            SeriesKind::DailyMean => &self.daily_mean,
            SeriesKind::MonthlyMax => &self.monthly_max,
            SeriesKind::MonthlyMin => &self.monthly_min,
        }
    }

    pub fn get_mut(&mut self, kind: SeriesKind) -> &mut DatedSeries {
        match kind {
            SeriesKind::DailyMean => &mut self.daily_mean,
            SeriesKind::MonthlyMax => &mut self.monthly_max,
            SeriesKind::MonthlyMin => &mut self.monthly_min,
        }
    }

    /// Copy over the union of this span and `[first_year, last_year]`
    pub fn widened(&self, first_year: i32, last_year: i32) -> Self {
        let first_year = first_year.min(self.first_year);
        let last_year = last_year.max(self.last_year);
        Self {
            first_year,
            last_year,
            daily_mean: self.daily_mean.widened(first_year, last_year),
            monthly_max: self.monthly_max.widened(first_year, last_year),
            monthly_min: self.monthly_min.widened(first_year, last_year),
        }
    }
}
