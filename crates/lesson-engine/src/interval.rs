//! Lesson time windows and the overlap primitives everything else is built on.
//!
//! Times are wall-clock, minute precision, with no timezone attached: the date
//! and time are already resolved to the owner's local calendar day. Intervals
//! are half-open `[start, end)`, so a lesson ending at 10:00 and another
//! starting at 10:00 do NOT overlap.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, Result};

const MINUTES_PER_DAY: u16 = 24 * 60;

/// A wall-clock time of day with minute precision (`00:00`..=`23:59`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinuteOfDay(u16);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid time of day '{0}' (expected HH:MM)")]
pub struct ParseTimeError(String);

impl MinuteOfDay {
    pub const MIDNIGHT: MinuteOfDay = MinuteOfDay(0);

    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(MinuteOfDay((hour * 60 + minute) as u16))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        if minutes < u32::from(MINUTES_PER_DAY) {
            Some(MinuteOfDay(minutes as u16))
        } else {
            None
        }
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    /// Truncates seconds and below.
    pub fn from_naive_time(time: NaiveTime) -> Self {
        MinuteOfDay((time.hour() * 60 + time.minute()) as u16)
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl FromStr for MinuteOfDay {
    type Err = ParseTimeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseTimeError(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(err)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(err());
        }
        let hour: u32 = h.parse().map_err(|_| err())?;
        let minute: u32 = m.parse().map_err(|_| err())?;
        MinuteOfDay::new(hour, minute).ok_or_else(err)
    }
}

impl TryFrom<String> for MinuteOfDay {
    type Error = ParseTimeError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MinuteOfDay> for String {
    fn from(value: MinuteOfDay) -> Self {
        value.to_string()
    }
}

/// A lesson window without a date, e.g. "every lesson runs 14:00~15:00".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonWindow {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

impl LessonWindow {
    /// Validated constructor; fails with `InvalidInterval` when `start >= end`.
    pub fn new(start: MinuteOfDay, end: MinuteOfDay) -> Result<Self> {
        let window = LessonWindow { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<()> {
        if self.start >= self.end {
            return Err(EngineError::InvalidInterval {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Pin this window to a calendar date.
    pub fn on(&self, date: NaiveDate) -> TimeInterval {
        TimeInterval {
            date,
            start: self.start,
            end: self.end,
        }
    }
}

/// A half-open lesson interval `[start, end)` on one calendar date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub date: NaiveDate,
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
}

impl TimeInterval {
    /// Validated constructor; fails with `InvalidInterval` when `start >= end`.
    pub fn new(date: NaiveDate, start: MinuteOfDay, end: MinuteOfDay) -> Result<Self> {
        let interval = TimeInterval { date, start, end };
        validate(&interval)?;
        Ok(interval)
    }

    pub fn window(&self) -> LessonWindow {
        LessonWindow {
            start: self.start,
            end: self.end,
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        self.end.minutes().saturating_sub(self.start.minutes())
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        overlaps(self, other)
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}~{}", self.date, self.start, self.end)
    }
}

/// Two intervals overlap iff they share a date and `a.start < b.end && b.start < a.end`.
///
/// Adjacent intervals where one ends exactly when the other starts are NOT
/// overlapping, so back-to-back lessons are allowed.
pub fn overlaps(a: &TimeInterval, b: &TimeInterval) -> bool {
    a.date == b.date && a.start < b.end && b.start < a.end
}

/// Reject intervals whose start is not strictly before their end.
pub fn validate(interval: &TimeInterval) -> Result<()> {
    interval.window().validate()
}
