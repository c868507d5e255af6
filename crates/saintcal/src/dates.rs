//! Date normalization for saint and milestone dates.
//!
//! Saint dates arrive from spreadsheets as free-form strings. This module
//! detects which of the accepted conventions a string uses and returns a typed
//! [`ParsedDate`], or a [`DateFormatError`] describing why it was rejected.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// YYYY-MM-DD, optionally followed by a time part ("T10:00:00Z", " 10:00").
static RE_ISO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})(?:[T ]\d{1,2}:\d{2}(?::\d{2}(?:\.\d+)?)?(?:Z|[+\-]\d{2}:?\d{2})?)?$")
        .unwrap()
});
static RE_ISO_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})/(\d{1,2})/(\d{1,2})$").unwrap());
static RE_US: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})([/\-.])(\d{1,2})([/\-.])(\d+)$").unwrap());
static RE_MONTH_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]+)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d+)$").unwrap());
static RE_DAY_MONTH_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})(?:st|nd|rd|th)?\s+([A-Za-z]+)\.?,?\s+(\d+)$").unwrap());
static RE_MONTH_DAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})[/\-](\d{1,2})$").unwrap());

/// Which input convention a date string was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFormat {
    /// `YYYY-MM-DD`, with an optional trailing time part.
    Iso,
    /// `YYYY/MM/DD`.
    IsoSlash,
    /// `MM/DD/YYYY` (also `-` or `.` separated).
    UsSlash,
    /// `March 17, 2024` / `Mar 17 2024`.
    MonthName,
    /// `17 March 2024`.
    DayMonthName,
    /// `MM/DD` or `MM-DD` without a year.
    MonthDay,
}

/// Why a date string could not be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateFormatError {
    #[error("date is empty")]
    Empty,

    #[error("unrecognized date format: '{0}'")]
    Unrecognized(String),

    /// Two-digit years are rejected rather than guessed at.
    #[error("ambiguous two-digit year in '{0}'")]
    AmbiguousYear(String),

    #[error("'{0}' is not a valid calendar date")]
    OutOfRange(String),
}

/// A normalized date. `year` is absent for month-day-only inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedDate {
    pub year: Option<i32>,
    pub month: u32,
    pub day: u32,
    pub format: DateFormat,
}

impl ParsedDate {
    /// Year-independent `MM * 100 + DD` value (e.g. March 17 -> 317).
    pub fn month_day(&self) -> u32 {
        self.month * 100 + self.day
    }

    /// Full `YYYYMMDD` encoding, if the input carried a year.
    pub fn event_date(&self) -> Option<i64> {
        self.year.map(|y| encode_event_date(y, self.month_day()))
    }
}

/// Parses a date string in any of the accepted conventions.
pub fn parse_date(input: &str) -> Result<ParsedDate, DateFormatError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(DateFormatError::Empty);
    }

    if let Some(caps) = RE_ISO.captures(s) {
        return build(input, Some(&caps[1]), &caps[2], &caps[3], DateFormat::Iso);
    }
    if let Some(caps) = RE_ISO_SLASH.captures(s) {
        return build(input, Some(&caps[1]), &caps[2], &caps[3], DateFormat::IsoSlash);
    }
    if let Some(caps) = RE_US.captures(s) {
        // Mixed separators ("03/17-2024") are not a convention anyone writes.
        if caps[2] != caps[4] {
            return Err(DateFormatError::Unrecognized(input.to_string()));
        }
        return build(input, Some(&caps[5]), &caps[1], &caps[3], DateFormat::UsSlash);
    }
    if let Some(caps) = RE_MONTH_NAME.captures(s) {
        let month = month_from_name(&caps[1])
            .ok_or_else(|| DateFormatError::Unrecognized(input.to_string()))?;
        return build(
            input,
            Some(&caps[3]),
            &month.to_string(),
            &caps[2],
            DateFormat::MonthName,
        );
    }
    if let Some(caps) = RE_DAY_MONTH_NAME.captures(s) {
        let month = month_from_name(&caps[2])
            .ok_or_else(|| DateFormatError::Unrecognized(input.to_string()))?;
        return build(
            input,
            Some(&caps[3]),
            &month.to_string(),
            &caps[1],
            DateFormat::DayMonthName,
        );
    }
    if let Some(caps) = RE_MONTH_DAY.captures(s) {
        return build(input, None, &caps[1], &caps[2], DateFormat::MonthDay);
    }

    Err(DateFormatError::Unrecognized(input.to_string()))
}

/// Normalizes a date string straight to its `MMDD` value.
pub fn normalize_month_day(input: &str) -> Result<u32, DateFormatError> {
    parse_date(input).map(|d| d.month_day())
}

/// Encodes `year * 10000 + month * 100 + day`.
///
/// February 29 in a non-leap year is placed on February 28.
pub fn encode_event_date(year: i32, month_day: u32) -> i64 {
    let month = month_day / 100;
    let mut day = month_day % 100;
    if month == 2 && day == 29 && NaiveDate::from_ymd_opt(year, 2, 29).is_none() {
        day = 28;
    }
    i64::from(year) * 10_000 + i64::from(month) * 100 + i64::from(day)
}

/// Splits a `YYYYMMDD` value back into `(year, month, day)`.
pub fn decode_event_date(date: i64) -> (i32, u32, u32) {
    let year = (date / 10_000) as i32;
    let month = ((date / 100) % 100) as u32;
    let day = (date % 100) as u32;
    (year, month, day)
}

fn build(
    input: &str,
    year: Option<&str>,
    month: &str,
    day: &str,
    format: DateFormat,
) -> Result<ParsedDate, DateFormatError> {
    let year = match year {
        Some(y) if y.len() == 4 => Some(
            y.parse::<i32>()
                .map_err(|_| DateFormatError::Unrecognized(input.to_string()))?,
        ),
        Some(y) if y.len() <= 2 => return Err(DateFormatError::AmbiguousYear(input.to_string())),
        Some(_) => return Err(DateFormatError::Unrecognized(input.to_string())),
        None => None,
    };
    let month: u32 = month
        .parse()
        .map_err(|_| DateFormatError::Unrecognized(input.to_string()))?;
    let day: u32 = day
        .parse()
        .map_err(|_| DateFormatError::Unrecognized(input.to_string()))?;

    // Without a year, validate against a leap year so Feb 29 is accepted.
    let check_year = year.unwrap_or(2000);
    if NaiveDate::from_ymd_opt(check_year, month, day).is_none() {
        return Err(DateFormatError::OutOfRange(input.to_string()));
    }

    Ok(ParsedDate {
        year,
        month,
        day,
        format,
    })
}

fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    MONTHS
        .iter()
        .position(|m| m.starts_with(&lower))
        .map(|i| i as u32 + 1)
}
