//! Weekly recurrence expansion -- turns "every Wednesday from A to B" into dates.
//!
//! The expansion is lazy: [`expand`] returns an iterator that aligns the start
//! date to the requested weekday and then steps by the cadence until the end
//! date is passed. Cloning a [`Recurrence`] restarts it from its current
//! position, so a fresh `expand` result can be walked any number of times.

use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::interval::LessonWindow;

/// Recurrence step size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    #[default]
    Weekly,
    Biweekly,
}

impl Cadence {
    pub fn step_days(self) -> u64 {
        match self {
            Cadence::Weekly => 7,
            Cadence::Biweekly => 14,
        }
    }
}

/// One bulk-generation request: which weekday, how often, over which range, at what time.
///
/// Lives only for the duration of a generation run; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceSpec {
    pub weekday: Weekday,
    pub cadence: Cadence,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub window: LessonWindow,
}

impl RecurrenceSpec {
    pub fn dates(&self) -> Recurrence {
        expand(self.date_from, self.date_to, self.weekday, self.cadence)
    }
}

/// Map an ISO weekday index (0 = Monday .. 6 = Sunday) to a [`Weekday`].
pub fn weekday_from_index(index: u8) -> Result<Weekday> {
    match index {
        0 => Ok(Weekday::Mon),
        1 => Ok(Weekday::Tue),
        2 => Ok(Weekday::Wed),
        3 => Ok(Weekday::Thu),
        4 => Ok(Weekday::Fri),
        5 => Ok(Weekday::Sat),
        6 => Ok(Weekday::Sun),
        other => Err(EngineError::InvalidWeekday(other)),
    }
}

/// Lazy sequence of occurrence dates produced by [`expand`].
#[derive(Debug, Clone)]
pub struct Recurrence {
    next: Option<NaiveDate>,
    until: NaiveDate,
    step: Days,
}

impl Iterator for Recurrence {
    type Item = NaiveDate;

    fn next(&mut self) -> Option<NaiveDate> {
        let current = self.next.filter(|d| *d <= self.until)?;
        self.next = current.checked_add_days(self.step);
        Some(current)
    }
}

/// Expand a weekly or biweekly recurrence into concrete dates.
///
/// The first occurrence is the first date on or after `date_from` that falls
/// on `weekday` (no advance if `date_from` already does). Later occurrences
/// follow every 7 or 14 days while `<= date_to`. An inverted or too-short
/// range yields an empty sequence, not an error.
pub fn expand(
    date_from: NaiveDate,
    date_to: NaiveDate,
    weekday: Weekday,
    cadence: Cadence,
) -> Recurrence {
    let target = weekday.num_days_from_monday();
    let ahead = (7 + target - date_from.weekday().num_days_from_monday()) % 7;
    Recurrence {
        next: date_from.checked_add_days(Days::new(u64::from(ahead))),
        until: date_to,
        step: Days::new(cadence.step_days()),
    }
}
