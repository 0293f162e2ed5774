//! Find open lesson slots by checking working hours against a remote calendar's busy intervals.
//!
//! One search makes exactly one call to the [`BusySource`] for the whole
//! horizon, padded by the safety gap on both ends, then walks each local
//! calendar day's working hours in slot-sized steps aligned to `work_start`.
//! Every candidate is widened by the safety gap on both sides before it is
//! tested against the busy list, but is reported without the gap.
//!
//! Slots are stepped in local wall-clock time. Slot boundaries that fall in a
//! spring-forward gap follow the query's [`DstPolicy`].

use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::dst::{resolve_local, DstPolicy};
use crate::error::{EngineError, Result};
use crate::interval::MinuteOfDay;

/// Longest search horizon accepted, in days.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// A busy period reported by the remote calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Why the busy-interval source could not answer.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("calendar request failed: {0}")]
    Transport(String),

    #[error("calendar API error: {0}")]
    Api(String),

    #[error("malformed calendar response: {0}")]
    Parse(String),

    #[error("calendar request timed out after {0:?}")]
    Timeout(StdDuration),
}

/// Remote calendar that reports when the owner is busy.
#[async_trait]
pub trait BusySource: Send + Sync {
    /// Busy intervals intersecting `[start, end)`.
    async fn busy_intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<Vec<BusyInterval>, SourceError>;
}

#[async_trait]
impl<T: BusySource + ?Sized> BusySource for Box<T> {
    async fn busy_intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<Vec<BusyInterval>, SourceError> {
        (**self).busy_intervals(start, end).await
    }
}

#[async_trait]
impl<T: BusySource + ?Sized> BusySource for std::sync::Arc<T> {
    async fn busy_intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<Vec<BusyInterval>, SourceError> {
        (**self).busy_intervals(start, end).await
    }
}

/// A fixed list of busy intervals, e.g. loaded from a file.
#[derive(Debug, Clone, Default)]
pub struct StaticBusySource {
    intervals: Vec<BusyInterval>,
}

impl StaticBusySource {
    pub fn new(intervals: Vec<BusyInterval>) -> Self {
        Self { intervals }
    }
}

#[async_trait]
impl BusySource for StaticBusySource {
    async fn busy_intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> std::result::Result<Vec<BusyInterval>, SourceError> {
        Ok(self
            .intervals
            .iter()
            .filter(|b| b.start < end && start < b.end)
            .copied()
            .collect())
    }
}

/// Parameters of one slot search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlotQuery {
    /// IANA timezone the owner works in.
    pub timezone: String,
    pub horizon_days: u32,
    pub work_start: MinuteOfDay,
    pub work_end: MinuteOfDay,
    pub slot_minutes: u32,
    pub safety_gap_minutes: u32,
    pub max_candidates: usize,
    pub include_weekends: bool,
    pub dst_policy: DstPolicy,
}

impl Default for SlotQuery {
    fn default() -> Self {
        Self {
            timezone: "Asia/Seoul".to_string(),
            horizon_days: 7,
            work_start: MinuteOfDay::new(18, 0).unwrap_or(MinuteOfDay::MIDNIGHT),
            work_end: MinuteOfDay::new(21, 0).unwrap_or(MinuteOfDay::MIDNIGHT),
            slot_minutes: 60,
            safety_gap_minutes: 5,
            max_candidates: 3,
            include_weekends: true,
            dst_policy: DstPolicy::Skip,
        }
    }
}

impl SlotQuery {
    /// Check the query and resolve its timezone.
    pub fn validate(&self) -> Result<Tz> {
        let tz: Tz = self
            .timezone
            .parse()
            .map_err(|_| EngineError::InvalidTimezone(self.timezone.clone()))?;
        if self.work_start >= self.work_end {
            return Err(EngineError::InvalidInterval {
                start: self.work_start,
                end: self.work_end,
            });
        }
        if self.slot_minutes == 0 {
            return Err(EngineError::InvalidQuery("slot length must be positive".to_string()));
        }
        if self.horizon_days == 0 || self.horizon_days > MAX_HORIZON_DAYS {
            return Err(EngineError::InvalidQuery(format!(
                "horizon must be between 1 and {MAX_HORIZON_DAYS} days, got {}",
                self.horizon_days
            )));
        }
        Ok(tz)
    }
}

/// An open slot in the owner's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub date: NaiveDate,
    pub time: MinuteOfDay,
}

/// The `[now, now + horizon]` span a search covers, in local and UTC terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub tz: Tz,
    pub start_local: NaiveDateTime,
    pub end_local: NaiveDateTime,
    pub start_utc: DateTime<Utc>,
    pub end_utc: DateTime<Utc>,
}

impl SearchWindow {
    /// Anchor a window at `now`, truncated to the minute.
    pub fn new(tz: Tz, now: DateTime<Utc>, horizon_days: u32) -> Self {
        let now = now
            .with_nanosecond(0)
            .and_then(|t| t.with_second(0))
            .unwrap_or(now);
        let start_local = now.with_timezone(&tz).naive_local();
        let end_local = start_local + Duration::days(i64::from(horizon_days));
        let end_utc = resolve_local(tz, end_local, DstPolicy::ShiftForward)
            .unwrap_or(now + Duration::days(i64::from(horizon_days)));
        Self {
            tz,
            start_local,
            end_local,
            start_utc: now,
            end_utc,
        }
    }
}

/// Slot search over an injected busy-interval source.
///
/// Construct once and share; it holds no per-search state.
pub struct SlotFinder<B> {
    source: B,
    timeout: Option<StdDuration>,
}

impl<B: BusySource> SlotFinder<B> {
    pub fn new(source: B) -> Self {
        Self { source, timeout: None }
    }

    /// Fail the search with `SourceError::Timeout` when the fetch takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn source(&self) -> &B {
        &self.source
    }

    /// Search starting from the current time.
    pub async fn find_slots(&self, query: &SlotQuery) -> Result<Vec<CandidateSlot>> {
        self.find_slots_at(query, Utc::now()).await
    }

    /// Search starting from `now`. Identical inputs give identical output.
    ///
    /// # Errors
    /// `InvalidTimezone`, `InvalidInterval` or `InvalidQuery` for a bad query;
    /// `ExternalSource` when the busy intervals could not be fetched. A failed
    /// fetch is never reported as "no slots".
    pub async fn find_slots_at(
        &self,
        query: &SlotQuery,
        now: DateTime<Utc>,
    ) -> Result<Vec<CandidateSlot>> {
        let tz = query.validate()?;
        if query.max_candidates == 0 {
            return Ok(Vec::new());
        }

        let window = SearchWindow::new(tz, now, query.horizon_days);
        // Busy time within the gap outside the window still rules out edge slots.
        let gap = Duration::minutes(i64::from(query.safety_gap_minutes));
        let busy = self.fetch(window.start_utc - gap, window.end_utc + gap).await?;
        let slots = collect_slots(query, &window, &busy);

        info!(
            timezone = %tz,
            busy = busy.len(),
            found = slots.len(),
            "slot search finished"
        );
        Ok(slots)
    }

    async fn fetch(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<BusyInterval>> {
        let request = self.source.busy_intervals(start, end);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(outcome) => outcome,
                Err(_) => Err(SourceError::Timeout(limit)),
            },
            None => request.await,
        };
        outcome.map_err(|err| {
            warn!(error = %err, "busy intervals unavailable");
            EngineError::ExternalSource(err)
        })
    }
}

/// Walk the working hours of every day in `window` and keep the slots clear of `busy`.
///
/// Pure computation; `query` is assumed validated. Returns at most
/// `query.max_candidates` slots in chronological order.
pub fn collect_slots(
    query: &SlotQuery,
    window: &SearchWindow,
    busy: &[BusyInterval],
) -> Vec<CandidateSlot> {
    let step = Duration::minutes(i64::from(query.slot_minutes));
    let gap = Duration::minutes(i64::from(query.safety_gap_minutes));
    let mut slots = Vec::new();
    let mut last_start: Option<DateTime<Utc>> = None;

    let mut day = window.start_local.date();
    while day <= window.end_local.date() && slots.len() < query.max_candidates {
        if query.include_weekends || !is_weekend(day) {
            let day_start = day.and_time(query.work_start.to_naive_time());
            let day_end = day.and_time(query.work_end.to_naive_time());

            // First slot on or after now, keeping the work_start + k * step grid.
            let mut slot_start = day_start;
            if slot_start < window.start_local {
                let behind = (window.start_local - day_start).num_minutes();
                let steps = (behind + step.num_minutes() - 1) / step.num_minutes();
                slot_start = day_start + Duration::minutes(steps * step.num_minutes());
            }

            while slots.len() < query.max_candidates {
                let slot_end = slot_start + step;
                if slot_end > day_end || slot_end > window.end_local {
                    break;
                }

                let resolved = resolve_local(window.tz, slot_start, query.dst_policy)
                    .zip(resolve_local(window.tz, slot_end, query.dst_policy));
                if let Some((start_utc, end_utc)) = resolved {
                    let fresh = last_start.is_none_or(|prev| start_utc > prev);
                    if fresh && start_utc < end_utc {
                        last_start = Some(start_utc);
                        let (lo, hi) = (start_utc - gap, end_utc + gap);
                        if !busy.iter().any(|b| lo < b.end && b.start < hi) {
                            let local = start_utc.with_timezone(&window.tz).naive_local();
                            slots.push(CandidateSlot {
                                date: local.date(),
                                time: MinuteOfDay::from_naive_time(local.time()),
                            });
                        }
                    }
                }

                slot_start = slot_end;
            }
        }

        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    slots
}

fn is_weekend(day: NaiveDate) -> bool {
    matches!(day.weekday(), Weekday::Sat | Weekday::Sun)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_truncates_seconds_and_spans_horizon() {
        let tz: Tz = "Asia/Seoul".parse().unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 0, 30, 42).unwrap();
        let window = SearchWindow::new(tz, now, 7);
        assert_eq!(window.start_utc, Utc.with_ymd_and_hms(2025, 3, 3, 0, 30, 0).unwrap());
        assert_eq!(window.end_utc, Utc.with_ymd_and_hms(2025, 3, 10, 0, 30, 0).unwrap());
        assert_eq!(window.start_local.to_string(), "2025-03-03 09:30:00");
    }

    #[test]
    fn first_day_rounds_up_to_grid_and_window_end_cuts_last_day() {
        let tz: Tz = "UTC".parse().unwrap();
        // 18:20 local; with 60-minute slots from 18:00 the first candidate is 19:00.
        // The window closes at 18:20 the next day, before that day's first slot ends.
        let now = Utc.with_ymd_and_hms(2025, 3, 3, 18, 20, 0).unwrap();
        let query = SlotQuery {
            timezone: "UTC".to_string(),
            horizon_days: 1,
            max_candidates: 10,
            ..SlotQuery::default()
        };
        let window = SearchWindow::new(tz, now, 1);
        let slots = collect_slots(&query, &window, &[]);
        let times: Vec<String> = slots.iter().map(|s| format!("{} {}", s.date, s.time)).collect();
        assert_eq!(
            times,
            vec!["2025-03-03 19:00", "2025-03-03 20:00"]
        );
    }

    #[test]
    fn validate_rejects_bad_queries() {
        let bad_tz = SlotQuery {
            timezone: "Mars/Olympus".to_string(),
            ..SlotQuery::default()
        };
        assert!(matches!(bad_tz.validate(), Err(EngineError::InvalidTimezone(_))));

        let inverted = SlotQuery {
            work_start: MinuteOfDay::new(21, 0).unwrap(),
            work_end: MinuteOfDay::new(18, 0).unwrap(),
            ..SlotQuery::default()
        };
        assert!(matches!(inverted.validate(), Err(EngineError::InvalidInterval { .. })));

        let zero_slot = SlotQuery {
            slot_minutes: 0,
            ..SlotQuery::default()
        };
        assert!(matches!(zero_slot.validate(), Err(EngineError::InvalidQuery(_))));

        let zero_horizon = SlotQuery {
            horizon_days: 0,
            ..SlotQuery::default()
        };
        assert!(matches!(zero_horizon.validate(), Err(EngineError::InvalidQuery(_))));
    }
}
