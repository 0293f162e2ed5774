//! # lesson-engine
//!
//! Scheduling core for a private-tutoring backend.
//!
//! Everything around it (HTTP handlers, auth, billing) is plain integration
//! glue; this crate holds the parts with real invariants: no double-booking
//! of a teacher, recurring lessons that skip occupied weeks, and free-slot
//! search against a remote calendar across timezones.
//!
//! ## Modules
//!
//! - [`interval`]: `[start, end)` lesson windows and the overlap test
//! - [`store`]: schedule records and the persistence seam
//! - [`conflict`]: is an owner's time already taken?
//! - [`booking`]: book or cancel a single lesson
//! - [`expander`]: weekly/biweekly recurrence to concrete dates
//! - [`bulk`]: materialize a recurrence, skipping occupied dates
//! - [`freebusy`]: open-slot search over busy intervals
//! - [`google`]: Google Calendar `freeBusy` busy-interval source
//! - [`dst`]: local wall-clock to UTC resolution around DST transitions
//! - [`error`]: error types

pub mod booking;
pub mod bulk;
pub mod conflict;
pub mod dst;
pub mod error;
pub mod expander;
pub mod freebusy;
pub mod google;
pub mod interval;
pub mod store;

pub use booking::{cancel_schedule, create_schedule};
pub use bulk::{generate, generate_report, BulkReport};
pub use conflict::{find_blocking, has_conflict, has_conflict_with};
pub use error::{EngineError, Result};
pub use expander::{expand, weekday_from_index, Cadence, Recurrence, RecurrenceSpec};
pub use freebusy::{
    BusyInterval, BusySource, CandidateSlot, SlotFinder, SlotQuery, SourceError,
    StaticBusySource,
};
pub use interval::{overlaps, validate, LessonWindow, MinuteOfDay, TimeInterval};
pub use store::{
    CounterpartyId, InMemoryStore, NewSchedule, OwnerId, ScheduleFilter, ScheduleId, ScheduleRecord,
    ScheduleStatus, ScheduleStore, StoreError, SubjectId,
};
