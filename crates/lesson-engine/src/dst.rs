//! DST handling when a local wall-clock slot is pinned to a UTC instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Longest spring-forward gap we step across when shifting.
const MAX_GAP_MINUTES: i64 = 180;

/// Policy for local times that do not exist (spring-forward gap).
///
/// Ambiguous local times (fall-back overlap) always resolve to the earlier instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Drop slots whose start or end falls in the gap.
    #[default]
    Skip,
    /// Move the instant to the first valid local minute after the gap.
    ShiftForward,
}

/// Resolve a local wall-clock time in `tz` to UTC under `policy`.
pub fn resolve_local(tz: Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => match policy {
            DstPolicy::Skip => None,
            DstPolicy::ShiftForward => (1..=MAX_GAP_MINUTES).find_map(|m| {
                tz.from_local_datetime(&(local + Duration::minutes(m)))
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
        },
    }
}
