//! Date keys and spreadsheet date serials

use std::fmt;
use std::str::FromStr;

use chrono::{Local, NaiveDate};
use lazy_regex::{regex_captures, regex_is_match};

use crate::error::{Error, Result};

/// Day 0 of the spreadsheet serial date system.
///
/// Serial 1 is 1899-12-31 and serial 2 is 1900-01-01; counting from 1899-12-30
/// absorbs Excel's fictitious 1900-02-29 for every date after February 1900.
const SERIAL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// A calendar date in `YYYY-MM-DD` form.
///
/// Every snapshot, history artifact and reference lookup is keyed by one of
/// these. Keys sort chronologically, which is also their lexicographic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// Parse a strict `YYYY-MM-DD` key
    pub fn parse(s: &str) -> Result<Self> {
        if !regex_is_match!(r"^\d{4}-\d{2}-\d{2}$", s) {
            return Err(Error::InvalidDateKey(s.to_string()));
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Self)
            .map_err(|_| Error::InvalidDateKey(s.to_string()))
    }

    /// Today's date in the host's local time zone
    pub fn today() -> Self {
        Self(Local::now().date_naive())
    }

    /// Find a date embedded in an upload's file name.
    ///
    /// Only the first `20YY[-_]MM[-_]DD` run is considered; if it is not a real
    /// calendar date the name carries no date.
    pub fn from_filename(name: &str) -> Option<Self> {
        let (_, y, m, d) = regex_captures!(r"(20\d{2})[-_]?(\d{2})[-_]?(\d{2})", name)?;
        NaiveDate::from_ymd_opt(y.parse().ok()?, m.parse().ok()?, d.parse().ok()?).map(Self)
    }

    /// Days since 1899-12-30, the numeric encoding spreadsheets use for dates
    pub fn serial(&self) -> i64 {
        let (y, m, d) = SERIAL_EPOCH;
        let epoch = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
        (self.0 - epoch).num_days()
    }

    /// The same date as `DDMMYYYY`, the encoding used in report file names
    pub fn to_dmy_compact(&self) -> String {
        self.0.format("%d%m%Y").to_string()
    }

    /// The underlying calendar date
    pub fn date(&self) -> NaiveDate {
        self.0
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for DateKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for DateKey {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<DateKey> for String {
    fn from(key: DateKey) -> Self {
        key.to_string()
    }
}
