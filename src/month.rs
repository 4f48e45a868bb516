//! Month scope type used to bound a counting run
//!
//! A run is always scoped to exactly one calendar month; records outside the
//! scope are dropped by the counter, and the exit-list archive and cache file
//! are both keyed by the same `YYYY-MM` string this type renders to.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, FixedOffset, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from parsing a `YYYY-MM` month string
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum MonthParseError {
    #[error("month must be formatted as YYYY-MM, got '{0}'")]
    BadFormat(String),

    #[error("month number must be 1-12, got {0}")]
    OutOfRange(u32),
}

/// One calendar month, the unit a whole run is scoped to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Month {
    year: i32,
    month: u32,
}

impl Month {
    /// Create a month from its parts
    ///
    /// Returns an error if `month` is not in `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self, MonthParseError> {
        if !(1..=12).contains(&month) {
            return Err(MonthParseError::OutOfRange(month));
        }
        Ok(Self { year, month })
    }

    /// The month containing the current local date
    #[must_use]
    pub fn current() -> Self {
        let today = Local::now().date_naive();
        Self {
            year: today.year(),
            month: today.month(),
        }
    }

    /// The month immediately before this one
    #[must_use]
    pub fn previous(self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Year component
    #[must_use]
    #[inline]
    pub const fn year(self) -> i32 {
        self.year
    }

    /// Month component (1-12)
    #[must_use]
    #[inline]
    pub const fn month(self) -> u32 {
        self.month
    }

    /// Whether the given timestamp falls inside this month
    ///
    /// The comparison uses the timestamp's own local calendar components, the
    /// same way log rotation boundaries are drawn on the server.
    #[must_use]
    pub fn contains(self, timestamp: &DateTime<FixedOffset>) -> bool {
        (timestamp.year(), timestamp.month()) == (self.year, self.month)
    }

}

impl fmt::Display for Month {
    /// Renders as `YYYY-MM`, the key used for archives, cache files and the
    /// datafile alike
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = MonthParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| MonthParseError::BadFormat(s.to_string()))?;
        let year: i32 = year
            .parse()
            .map_err(|_| MonthParseError::BadFormat(s.to_string()))?;
        let month: u32 = month
            .parse()
            .map_err(|_| MonthParseError::BadFormat(s.to_string()))?;
        Self::new(year, month)
    }
}
