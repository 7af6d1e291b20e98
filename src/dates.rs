//! Source date parsing, defensive repair, and era classification.
//!
//! The catalogue stores covering dates as `YYYYMMDD` integers. Some of them
//! are not real calendar dates (29 February in a common year, 31 April);
//! those are repaired by clamping the day to the end of the month rather than
//! dropping the record.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Start of the medieval period; stands in for a missing start date since
/// nothing in the archive predates it.
pub const EARLIEST_DATE: (i32, u32, u32) = (974, 1, 1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DateError {
    #[error("expected an 8-digit YYYYMMDD value, got {0:?}")]
    Malformed(String),
    #[error("{year:04}-{month:02}-{day:02} is not a calendar date")]
    OutOfRange { year: i32, month: u32, day: u32 },
}

/// Structured form of a date, indexed alongside the ISO string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateParts {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub century: i32,
}

impl DateParts {
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
            century: date.year() / 100,
        }
    }

    pub fn to_date(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, self.day)
    }
}

/// A resolved date: the ISO string and its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDate {
    pub iso: String,
    pub parts: DateParts,
}

impl ResolvedDate {
    fn from_date(date: NaiveDate) -> Self {
        Self {
            iso: date.format("%Y-%m-%d").to_string(),
            parts: DateParts::from_date(date),
        }
    }
}

/// Render a source date integer as the 8-digit string the parser expects.
pub fn source_date_string(value: i64) -> String {
    format!("{:08}", value)
}

fn split_fields(value: &str) -> Result<(i32, u32, u32), DateError> {
    let malformed = || DateError::Malformed(value.to_string());
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let year = value[0..4].parse().map_err(|_| malformed())?;
    let month = value[4..6].parse().map_err(|_| malformed())?;
    let day = value[6..8].parse().map_err(|_| malformed())?;
    Ok((year, month, day))
}

/// Strict parse of a `YYYYMMDD` string.
pub fn parse_date(value: &str) -> Result<ResolvedDate, DateError> {
    let (year, month, day) = split_fields(value)?;
    if year == 0 {
        return Err(DateError::OutOfRange { year, month, day });
    }
    NaiveDate::from_ymd_opt(year, month, day)
        .map(ResolvedDate::from_date)
        .ok_or(DateError::OutOfRange { year, month, day })
}

/// Clamp the day-of-month to the last valid day and parse again.
///
/// Valid dates come back unchanged. Returns `None` when the value is still
/// unusable (bad month, non-numeric input).
pub fn repair_date(value: &str) -> Option<ResolvedDate> {
    let (year, month, day) = split_fields(value).ok()?;
    if year == 0 {
        return None;
    }
    let last = last_day_of_month(year, month)?;
    NaiveDate::from_ymd_opt(year, month, day.min(last)).map(ResolvedDate::from_date)
}

fn last_day_of_month(year: i32, month: u32) -> Option<u32> {
    (28..=31)
        .rev()
        .find(|&d| NaiveDate::from_ymd_opt(year, month, d).is_some())
}

/// Parse a source date, logging and repairing it when it is invalid.
///
/// `id` and `catalogue_ref` are only used for the log line. A value that
/// cannot be repaired resolves to `None` and the record carries no date.
pub fn resolve_date(value: &str, id: &str, catalogue_ref: Option<&str>) -> Option<ResolvedDate> {
    match parse_date(value) {
        Ok(date) => Some(date),
        Err(err) => {
            let repaired = repair_date(value);
            warn!(
                id,
                catalogue_ref = catalogue_ref.unwrap_or(""),
                date = value,
                repaired = repaired.as_ref().map(|d| d.iso.as_str()).unwrap_or("none"),
                error = %err,
                "invalid source date"
            );
            repaired
        }
    }
}

/// A named historical period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Era {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Whether `[start, end]` and `[era_start, era_end]` share at least one day.
///
/// A missing start is treated as [`EARLIEST_DATE`] and a missing end as
/// today.
pub fn era_overlap(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    era_start: NaiveDate,
    era_end: NaiveDate,
) -> bool {
    let (y, m, d) = EARLIEST_DATE;
    let start = start
        .or_else(|| NaiveDate::from_ymd_opt(y, m, d))
        .unwrap_or(NaiveDate::MIN);
    let end = end.unwrap_or_else(|| Utc::now().date_naive());

    let latest_start = start.max(era_start);
    let earliest_end = end.min(era_end);
    (earliest_end - latest_start).num_days() + 1 > 0
}

/// Names of every era overlapping the record's covering dates.
///
/// A record needs both bounds to be classified; with either missing it
/// belongs to no era.
pub fn identify_eras(
    eras: &[Era],
    start: Option<&DateParts>,
    end: Option<&DateParts>,
) -> BTreeSet<String> {
    let (Some(start), Some(end)) = (start.and_then(|s| s.to_date()), end.and_then(|e| e.to_date()))
    else {
        return BTreeSet::new();
    };
    eras.iter()
        .filter(|era| era_overlap(Some(start), Some(end), era.start, era.end))
        .map(|era| era.name.clone())
        .collect()
}
