//! Inclusive calendar ranges and series granularity.
//!
//! A `DateRange` is always `from <= to`. An `Interval` turns a range into
//! the canonical calendar: the gap-free sequence of slots every aligned
//! series is reindexed onto.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors constructing ranges or parsing intervals.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("from_date {from} is after to_date {to}")]
    Inverted { from: NaiveDate, to: NaiveDate },

    #[error("invalid interval '{0}' (expected e.g. 15m, 1h, 1d, 1wk)")]
    InvalidInterval(String),
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, RangeError> {
        if from > to {
            return Err(RangeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    /// Single-day range.
    pub fn day(date: NaiveDate) -> Self {
        Self {
            from: date,
            to: date,
        }
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to
    }

    /// Number of calendar days, both ends included.
    pub fn num_days(&self) -> usize {
        (self.to - self.from).num_days() as usize + 1
    }

    /// Every calendar day in the range, ascending.
    pub fn days(&self) -> Vec<NaiveDate> {
        (0..self.num_days() as i64)
            .map(|offset| self.from + Duration::days(offset))
            .collect()
    }

    /// One single-day range per calendar day.
    pub fn day_windows(&self) -> Vec<DateRange> {
        self.days().into_iter().map(DateRange::day).collect()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// First instant of the range (midnight of `from`).
    pub fn start(&self) -> NaiveDateTime {
        self.from.and_time(NaiveTime::MIN)
    }

    /// Exclusive end instant (midnight after `to`).
    pub fn end_exclusive(&self) -> NaiveDateTime {
        (self.to + Duration::days(1)).and_time(NaiveTime::MIN)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.from, self.to)
    }
}

/// Granularity of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Minutes(u32),
    Hours(u32),
    Days(u32),
}

impl Interval {
    pub const DAILY: Interval = Interval::Days(1);

    pub fn step(&self) -> Duration {
        match *self {
            Interval::Minutes(n) => Duration::minutes(n as i64),
            Interval::Hours(n) => Duration::hours(n as i64),
            Interval::Days(n) => Duration::days(n as i64),
        }
    }

    pub fn is_intraday(&self) -> bool {
        self.step() < Duration::days(1)
    }

    /// Number of calendar slots in `range`.
    pub fn slot_count(&self, range: &DateRange) -> usize {
        let total = (range.end_exclusive() - range.start()).num_seconds();
        let step = self.step().num_seconds();
        ((total + step - 1) / step) as usize
    }

    /// The canonical calendar for `range`: slot start instants, ascending.
    pub fn calendar(&self, range: &DateRange) -> Vec<NaiveDateTime> {
        let start = range.start();
        let step = self.step();
        (0..self.slot_count(range) as i32)
            .map(|i| start + step * i)
            .collect()
    }

    /// Index of the calendar slot containing `at`, if it falls inside `range`.
    pub fn slot_of(&self, range: &DateRange, at: NaiveDateTime) -> Option<usize> {
        if at < range.start() || at >= range.end_exclusive() {
            return None;
        }
        let offset = (at - range.start()).num_seconds();
        Some((offset / self.step().num_seconds()) as usize)
    }
}

impl Default for Interval {
    fn default() -> Self {
        Interval::DAILY
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Interval::Minutes(n) => write!(f, "{n}m"),
            Interval::Hours(n) => write!(f, "{n}h"),
            Interval::Days(n) if n % 7 == 0 => write!(f, "{}wk", n / 7),
            Interval::Days(n) => write!(f, "{n}d"),
        }
    }
}

impl FromStr for Interval {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| RangeError::InvalidInterval(s.to_string()))?;
        let (count, unit) = trimmed.split_at(split);
        let n: u32 = count
            .parse()
            .map_err(|_| RangeError::InvalidInterval(s.to_string()))?;
        if n == 0 {
            return Err(RangeError::InvalidInterval(s.to_string()));
        }
        match unit {
            "m" => Ok(Interval::Minutes(n)),
            "h" => Ok(Interval::Hours(n)),
            "d" => Ok(Interval::Days(n)),
            "wk" => n
                .checked_mul(7)
                .map(Interval::Days)
                .ok_or_else(|| RangeError::InvalidInterval(s.to_string())),
            _ => Err(RangeError::InvalidInterval(s.to_string())),
        }
    }
}

impl TryFrom<String> for Interval {
    type Error = RangeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(interval: Interval) -> Self {
        interval.to_string()
    }
}
