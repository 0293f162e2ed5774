//! Error types for lesson-engine operations.

use chrono::NaiveDate;
use thiserror::Error;

use crate::freebusy::SourceError;
use crate::interval::MinuteOfDay;
use crate::store::{ScheduleId, StoreError};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid interval: start {start} must be before end {end}")]
    InvalidInterval { start: MinuteOfDay, end: MinuteOfDay },

    #[error("Invalid weekday index {0} (expected 0=Monday..6=Sunday)")]
    InvalidWeekday(u8),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid slot query: {0}")]
    InvalidQuery(String),

    /// The window is that of `existing`, the lesson already holding the time.
    #[error("Schedule conflict: {date} {start}~{end} is already booked by lesson {existing}")]
    ScheduleConflict {
        date: NaiveDate,
        start: MinuteOfDay,
        end: MinuteOfDay,
        existing: ScheduleId,
    },

    #[error("Schedule not found: {0}")]
    NotFound(ScheduleId),

    #[error("Availability unknown: {0}")]
    ExternalSource(#[from] SourceError),

    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl EngineError {
    /// True for both the optimistic overlap rejection and a translated
    /// storage-level uniqueness violation.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::ScheduleConflict { .. })
    }

    /// True when the busy-interval source could not be consulted.
    pub fn is_availability_unknown(&self) -> bool {
        matches!(self, EngineError::ExternalSource(_))
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UniquenessViolation {
                date,
                start,
                end,
                existing,
                ..
            } => EngineError::ScheduleConflict {
                date,
                start,
                end,
                existing,
            },
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Storage(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
