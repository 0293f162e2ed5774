//! Bulk generation of recurring lessons.
//!
//! Walks the dates of a [`RecurrenceSpec`] in order and books one lesson per
//! date through a caller-supplied factory. Dates that are already occupied
//! are skipped rather than failing the batch: bulk generation fills the free
//! occurrences and leaves the rest untouched. The skip shows up in the
//! returned count, never as a swallowed error.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::conflict;
use crate::error::Result;
use crate::expander::RecurrenceSpec;
use crate::interval::TimeInterval;
use crate::store::{NewSchedule, OwnerId, ScheduleId, ScheduleStore, StoreError};

/// What a generation run did, date by date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub created: Vec<(NaiveDate, ScheduleId)>,
    pub skipped: Vec<NaiveDate>,
}

impl BulkReport {
    pub fn created_count(&self) -> usize {
        self.created.len()
    }

    /// Length of the expansion, created and skipped together.
    pub fn expected(&self) -> usize {
        self.created.len() + self.skipped.len()
    }
}

/// Create a lesson on every free occurrence of `recurrence`; returns how many were created.
///
/// See [`generate_report`] for the per-date breakdown.
pub fn generate<S, F>(
    store: &mut S,
    owner_id: OwnerId,
    recurrence: &RecurrenceSpec,
    record_factory: F,
) -> Result<usize>
where
    S: ScheduleStore + ?Sized,
    F: FnMut(&TimeInterval) -> NewSchedule,
{
    Ok(generate_report(store, owner_id, recurrence, record_factory)?.created_count())
}

/// Create a lesson on every free occurrence of `recurrence`.
///
/// Per date: conflict check, then insert through `record_factory`. A conflict
/// (or a uniqueness violation from the store) skips the date. Any other
/// storage error stops the run and propagates; lessons created earlier in the
/// run stay in place.
pub fn generate_report<S, F>(
    store: &mut S,
    owner_id: OwnerId,
    recurrence: &RecurrenceSpec,
    mut record_factory: F,
) -> Result<BulkReport>
where
    S: ScheduleStore + ?Sized,
    F: FnMut(&TimeInterval) -> NewSchedule,
{
    recurrence.window.validate()?;

    let mut report = BulkReport::default();
    for date in recurrence.dates() {
        let candidate = recurrence.window.on(date);

        if conflict::has_conflict(&*store, owner_id, &candidate)? {
            debug!(owner = %owner_id, %date, "occurrence occupied, skipping");
            report.skipped.push(date);
            continue;
        }

        match store.insert_schedule(record_factory(&candidate)) {
            Ok(id) => {
                debug!(owner = %owner_id, %date, %id, "occurrence created");
                report.created.push((date, id));
            }
            Err(StoreError::UniquenessViolation { .. }) => {
                debug!(owner = %owner_id, %date, "lost insert race, skipping");
                report.skipped.push(date);
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(
        owner = %owner_id,
        created = report.created.len(),
        skipped = report.skipped.len(),
        "bulk generation finished"
    );
    Ok(report)
}
