//! The bounded sync window.
//!
//! Only events dated inside `[start of current year, start of current
//! year + 2 years)` are ever pulled or pushed.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Number of years covered by the window.
pub const WINDOW_YEARS: i32 = 2;

/// Half-open date range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncWindow {
    /// January 1st of the current year (inclusive).
    pub start: NaiveDate,
    /// January 1st, two years later (exclusive).
    pub end: NaiveDate,
}

impl SyncWindow {
    /// Window for the year containing `today`.
    pub fn for_date(today: NaiveDate) -> Self {
        Self::for_year(today.year())
    }

    /// Window starting on January 1st of `year`.
    pub fn for_year(year: i32) -> Self {
        Self {
            start: january_first(year),
            end: january_first(year + WINDOW_YEARS),
        }
    }

    /// Window for the local date of `now` at `offset`.
    pub fn at(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self::for_date(now.with_timezone(&offset).date_naive())
    }

    /// Returns true if `date` falls inside the window.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    /// Lower bound as a timestamp at local midnight, for `timeMin` queries.
    pub fn time_min(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        local_midnight(self.start, offset)
    }

    /// Upper bound as a timestamp at local midnight, for `timeMax` queries.
    pub fn time_max(&self, offset: FixedOffset) -> DateTime<FixedOffset> {
        local_midnight(self.end, offset)
    }
}

fn january_first(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or(NaiveDate::MIN)
}

fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    offset
        .from_local_datetime(&midnight)
        .single()
        .unwrap_or_else(|| midnight.and_utc().fixed_offset())
}
