//! Date assignment for bulletin values.
//!
//! Daily rows list day `d` for all twelve months at once, so many
//! (year, month, day) triples do not exist. Validity is decided by the
//! proleptic Gregorian calendar, never by a fixed day threshold.

use chrono::{Datelike, NaiveDate};

/// Concrete date for (year, month, day), or `None` when that day does not
/// exist in that month of that year
pub fn assign_date(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Gregorian leap-year rule
pub fn is_leap_year(year: i32) -> bool {
    NaiveDate::from_ymd_opt(year, 2, 29).is_some()
}

/// Number of days in a month, `None` for an invalid month
pub fn days_in_month(year: i32, month: u32) -> Option<u32> {
    month_end(year, month).map(|date| date.day())
}

/// Last day of a month; monthly series are indexed on this date
pub fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    next_month.pred_opt().filter(|end| *end >= first)
}
