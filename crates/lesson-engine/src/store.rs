//! Schedule records and the persistence seam the engine queries and writes through.
//!
//! The engine never owns schedule storage. It reads an owner's records for a
//! date, and on success hands a [`NewSchedule`] to [`ScheduleStore::insert_schedule`].
//! [`InMemoryStore`] is the reference implementation; it enforces a uniqueness
//! constraint on `(owner, date, start)` among non-cancelled records, which is
//! the last-resort guard against two writers racing past the same conflict check.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{EngineError, Result};
use crate::interval::{MinuteOfDay, TimeInterval};

/// The teacher whose schedule is checked or generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub u64);

/// The student on the other side of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterpartyId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub u64);

/// The subject a lesson teaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub u64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    #[default]
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl ScheduleStatus {
    /// Cancelled lessons free their slot immediately.
    pub fn is_active(self) -> bool {
        self != ScheduleStatus::Cancelled
    }
}

/// Who cancelled a lesson, when, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancelled_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_by: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A stored lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRecord {
    pub id: ScheduleId,
    pub owner_id: OwnerId,
    pub counterparty_id: CounterpartyId,
    #[serde(flatten)]
    pub interval: TimeInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<SubjectId>,
    #[serde(default)]
    pub status: ScheduleStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation: Option<Cancellation>,
}

/// A lesson about to be inserted; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSchedule {
    pub owner_id: OwnerId,
    pub counterparty_id: CounterpartyId,
    pub interval: TimeInterval,
    pub status: ScheduleStatus,
    pub subject_id: Option<SubjectId>,
    pub notes: Option<String>,
}

impl NewSchedule {
    pub fn confirmed(
        owner_id: OwnerId,
        counterparty_id: CounterpartyId,
        interval: TimeInterval,
    ) -> Self {
        NewSchedule {
            owner_id,
            counterparty_id,
            interval,
            status: ScheduleStatus::Confirmed,
            subject_id: None,
            notes: None,
        }
    }

    pub fn with_subject(mut self, subject_id: SubjectId) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Which records [`ScheduleStore::list_schedules`] returns.
///
/// Every `None` field matches anything; date bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleFilter {
    pub owner_id: OwnerId,
    pub counterparty_id: Option<CounterpartyId>,
    pub subject_id: Option<SubjectId>,
    pub status: Option<ScheduleStatus>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
}

impl ScheduleFilter {
    /// All of one owner's records.
    pub fn owner(owner_id: OwnerId) -> Self {
        ScheduleFilter {
            owner_id,
            counterparty_id: None,
            subject_id: None,
            status: None,
            date_from: None,
            date_to: None,
        }
    }

    pub fn between(mut self, date_from: NaiveDate, date_to: NaiveDate) -> Self {
        self.date_from = Some(date_from);
        self.date_to = Some(date_to);
        self
    }

    pub fn with_status(mut self, status: ScheduleStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, record: &ScheduleRecord) -> bool {
        record.owner_id == self.owner_id
            && self.counterparty_id.is_none_or(|c| record.counterparty_id == c)
            && self.subject_id.is_none_or(|s| record.subject_id == Some(s))
            && self.status.is_none_or(|s| record.status == s)
            && self.date_from.is_none_or(|d| record.interval.date >= d)
            && self.date_to.is_none_or(|d| record.interval.date <= d)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// `start` and `end` are the window of `existing`, the record holding the key.
    #[error("owner {owner_id} already has lesson {existing} starting {date} {start}")]
    UniquenessViolation {
        owner_id: OwnerId,
        date: NaiveDate,
        start: MinuteOfDay,
        end: MinuteOfDay,
        existing: ScheduleId,
    },

    #[error("schedule {0} not found")]
    NotFound(ScheduleId),

    #[error("invalid record {0}: {1}")]
    InvalidRecord(ScheduleId, String),

    #[error("{0}")]
    Backend(String),
}

/// The persistence collaborator.
///
/// Mutating methods take `&mut self`: a conflict check followed by an insert
/// through the same `&mut` borrow cannot interleave with another writer.
pub trait ScheduleStore {
    /// Every record for `owner_id` on `date`, cancelled ones included.
    fn schedules_on(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
    ) -> std::result::Result<Vec<ScheduleRecord>, StoreError>;

    /// Records for `owner_id` on `date` that still occupy their slot.
    fn query_active_schedules(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
    ) -> std::result::Result<Vec<ScheduleRecord>, StoreError> {
        let mut records = self.schedules_on(owner_id, date)?;
        records.retain(|r| r.status.is_active());
        Ok(records)
    }

    /// Records matching `filter`, ordered by date, then start time.
    fn list_schedules(
        &self,
        filter: &ScheduleFilter,
    ) -> std::result::Result<Vec<ScheduleRecord>, StoreError>;

    fn insert_schedule(
        &mut self,
        record: NewSchedule,
    ) -> std::result::Result<ScheduleId, StoreError>;

    fn get(&self, id: ScheduleId) -> std::result::Result<ScheduleRecord, StoreError>;

    fn update_status(
        &mut self,
        id: ScheduleId,
        status: ScheduleStatus,
        cancellation: Option<Cancellation>,
    ) -> std::result::Result<ScheduleRecord, StoreError>;
}

/// Ordered in-memory store with a `(owner, date, start)` uniqueness constraint.
///
/// Ids start at 1.
#[derive(Debug, Clone)]
pub struct InMemoryStore {
    records: BTreeMap<ScheduleId, ScheduleRecord>,
    next_id: u64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore {
            records: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from previously saved records.
    ///
    /// Rejects inverted intervals, duplicate ids and records that would break
    /// the uniqueness constraint.
    pub fn from_records(
        records: impl IntoIterator<Item = ScheduleRecord>,
    ) -> std::result::Result<Self, StoreError> {
        let mut store = InMemoryStore::new();
        for record in records {
            if record.interval.start >= record.interval.end {
                let reason = format!(
                    "start {} is not before end {}",
                    record.interval.start, record.interval.end
                );
                return Err(StoreError::InvalidRecord(record.id, reason));
            }
            if store.records.contains_key(&record.id) {
                return Err(StoreError::InvalidRecord(record.id, "duplicate id".to_string()));
            }
            if record.status.is_active() {
                store.check_unique(record.owner_id, &record.interval, None)?;
            }
            let after = record.id.0.checked_add(1).ok_or_else(|| {
                let reason = "id leaves no room for new records".to_string();
                StoreError::InvalidRecord(record.id, reason)
            })?;
            store.next_id = store.next_id.max(after);
            store.records.insert(record.id, record);
        }
        Ok(store)
    }

    /// All records in id order.
    pub fn records(&self) -> impl Iterator<Item = &ScheduleRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn check_unique(
        &self,
        owner_id: OwnerId,
        interval: &TimeInterval,
        ignore: Option<ScheduleId>,
    ) -> std::result::Result<(), StoreError> {
        let clash = self.records.values().find(|r| {
            Some(r.id) != ignore
                && r.status.is_active()
                && r.owner_id == owner_id
                && r.interval.date == interval.date
                && r.interval.start == interval.start
        });
        match clash {
            Some(existing) => Err(StoreError::UniquenessViolation {
                owner_id,
                date: existing.interval.date,
                start: existing.interval.start,
                end: existing.interval.end,
                existing: existing.id,
            }),
            None => Ok(()),
        }
    }
}

impl ScheduleStore for InMemoryStore {
    fn schedules_on(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
    ) -> std::result::Result<Vec<ScheduleRecord>, StoreError> {
        Ok(self
            .records
            .values()
            .filter(|r| r.owner_id == owner_id && r.interval.date == date)
            .cloned()
            .collect())
    }

    fn list_schedules(
        &self,
        filter: &ScheduleFilter,
    ) -> std::result::Result<Vec<ScheduleRecord>, StoreError> {
        let mut records: Vec<ScheduleRecord> = self
            .records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.interval.date, r.interval.start, r.id));
        Ok(records)
    }

    fn insert_schedule(
        &mut self,
        record: NewSchedule,
    ) -> std::result::Result<ScheduleId, StoreError> {
        if record.status.is_active() {
            self.check_unique(record.owner_id, &record.interval, None)?;
        }
        let id = ScheduleId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| StoreError::Backend("schedule ids exhausted".to_string()))?;
        self.records.insert(
            id,
            ScheduleRecord {
                id,
                owner_id: record.owner_id,
                counterparty_id: record.counterparty_id,
                interval: record.interval,
                subject_id: record.subject_id,
                status: record.status,
                notes: record.notes,
                cancellation: None,
            },
        );
        Ok(id)
    }

    fn get(&self, id: ScheduleId) -> std::result::Result<ScheduleRecord, StoreError> {
        self.records.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    fn update_status(
        &mut self,
        id: ScheduleId,
        status: ScheduleStatus,
        cancellation: Option<Cancellation>,
    ) -> std::result::Result<ScheduleRecord, StoreError> {
        let current = self.get(id)?;
        if status.is_active() && !current.status.is_active() {
            // Reactivating must not collide with a lesson booked in the meantime.
            self.check_unique(current.owner_id, &current.interval, Some(id))?;
        }
        let record = self.records.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        record.status = status;
        record.cancellation = cancellation;
        Ok(record.clone())
    }
}

/// A store shared between request handlers running on different threads.
pub type SharedStore<S> = Arc<Mutex<S>>;

pub fn shared<S>(store: S) -> SharedStore<S> {
    Arc::new(Mutex::new(store))
}

/// Run `f` with exclusive access to the shared store.
///
/// Everything `f` does, typically check-then-insert, is serialized against
/// other callers of `with_store` on the same store.
pub fn with_store<S, T>(
    shared: &SharedStore<S>,
    f: impl FnOnce(&mut S) -> Result<T>,
) -> Result<T> {
    let mut guard = shared.lock().map_err(|_| {
        EngineError::Storage(StoreError::Backend("schedule store lock poisoned".to_string()))
    })?;
    f(&mut guard)
}
