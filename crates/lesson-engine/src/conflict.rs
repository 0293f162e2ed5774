//! Detect double-booking of an owner's time.
//!
//! A candidate interval conflicts with an existing record when both belong to
//! the same owner, fall on the same date and overlap (half-open test, see
//! [`crate::interval::overlaps`]). Cancelled records are transparent.
//!
//! The detector validates the candidate itself: an interval with
//! `start >= end` is rejected with `InvalidInterval` before storage is read.

use crate::error::Result;
use crate::interval::{self, TimeInterval};
use crate::store::{OwnerId, ScheduleRecord, ScheduleStore};

/// Does any non-cancelled record of `owner_id` overlap `candidate`?
pub fn has_conflict<S: ScheduleStore + ?Sized>(
    store: &S,
    owner_id: OwnerId,
    candidate: &TimeInterval,
) -> Result<bool> {
    has_conflict_with(store, owner_id, candidate, true)
}

/// As [`has_conflict`], optionally letting cancelled records block too.
///
/// Linear existence check; stops at the first overlapping record.
pub fn has_conflict_with<S: ScheduleStore + ?Sized>(
    store: &S,
    owner_id: OwnerId,
    candidate: &TimeInterval,
    exclude_cancelled: bool,
) -> Result<bool> {
    Ok(first_overlap(store, owner_id, candidate, exclude_cancelled)?.is_some())
}

/// The record that blocks `candidate`, if any.
///
/// Separate from [`has_conflict`] for callers that need to report the
/// clashing window.
pub fn find_blocking<S: ScheduleStore + ?Sized>(
    store: &S,
    owner_id: OwnerId,
    candidate: &TimeInterval,
) -> Result<Option<ScheduleRecord>> {
    first_overlap(store, owner_id, candidate, true)
}

fn first_overlap<S: ScheduleStore + ?Sized>(
    store: &S,
    owner_id: OwnerId,
    candidate: &TimeInterval,
    exclude_cancelled: bool,
) -> Result<Option<ScheduleRecord>> {
    interval::validate(candidate)?;

    let records = if exclude_cancelled {
        store.query_active_schedules(owner_id, candidate.date)?
    } else {
        store.schedules_on(owner_id, candidate.date)?
    };

    Ok(records
        .into_iter()
        .find(|record| interval::overlaps(&record.interval, candidate)))
}
