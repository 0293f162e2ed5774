//! Single-lesson booking and cancellation.

use tracing::debug;

use crate::conflict;
use crate::error::{EngineError, Result};
use crate::store::{
    Cancellation, NewSchedule, ScheduleId, ScheduleRecord, ScheduleStatus, ScheduleStore,
};

/// Book one lesson after checking the owner's calendar.
///
/// Check and insert run through the same `&mut` borrow of the store. If the
/// store still reports a uniqueness violation (another writer got there
/// first), it surfaces as the same `ScheduleConflict` an overlap produces.
pub fn create_schedule<S: ScheduleStore + ?Sized>(
    store: &mut S,
    record: NewSchedule,
) -> Result<ScheduleId> {
    if let Some(existing) = conflict::find_blocking(&*store, record.owner_id, &record.interval)? {
        debug!(
            owner = %record.owner_id,
            requested = %record.interval,
            blocking = %existing.interval,
            "booking rejected"
        );
        return Err(EngineError::ScheduleConflict {
            date: existing.interval.date,
            start: existing.interval.start,
            end: existing.interval.end,
            existing: existing.id,
        });
    }

    let id = store.insert_schedule(record)?;
    debug!(%id, "lesson booked");
    Ok(id)
}

/// Cancel a lesson, freeing its slot immediately.
///
/// Records are never deleted. Cancelling twice keeps the first cancellation.
pub fn cancel_schedule<S: ScheduleStore + ?Sized>(
    store: &mut S,
    id: ScheduleId,
    cancellation: Cancellation,
) -> Result<ScheduleRecord> {
    let current = store.get(id)?;
    if current.status == ScheduleStatus::Cancelled {
        return Ok(current);
    }
    let record = store.update_status(id, ScheduleStatus::Cancelled, Some(cancellation))?;
    debug!(%id, "lesson cancelled");
    Ok(record)
}
