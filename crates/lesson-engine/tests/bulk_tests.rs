//! Tests for bulk generation of recurring lessons.

use chrono::{NaiveDate, Weekday};
use lesson_engine::store::{
    Cancellation, CounterpartyId, InMemoryStore, NewSchedule, OwnerId, ScheduleFilter, ScheduleId,
    ScheduleRecord, ScheduleStatus, ScheduleStore, StoreError, SubjectId,
};
use lesson_engine::{
    generate, generate_report, Cadence, EngineError, LessonWindow, RecurrenceSpec, TimeInterval,
};

const TEACHER: OwnerId = OwnerId(1);
const STUDENT: CounterpartyId = CounterpartyId(10);

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn window(start: &str, end: &str) -> LessonWindow {
    LessonWindow {
        start: start.parse().unwrap(),
        end: end.parse().unwrap(),
    }
}

fn mondays_in_march() -> RecurrenceSpec {
    RecurrenceSpec {
        weekday: Weekday::Mon,
        cadence: Cadence::Weekly,
        date_from: date(2025, 3, 1),
        date_to: date(2025, 3, 22),
        window: window("14:00", "15:00"),
    }
}

fn lesson_for(student: CounterpartyId) -> impl FnMut(&TimeInterval) -> NewSchedule {
    move |interval| NewSchedule::confirmed(TEACHER, student, *interval)
}

fn book(store: &mut InMemoryStore, interval: TimeInterval, status: ScheduleStatus) -> ScheduleId {
    store
        .insert_schedule(NewSchedule {
            status,
            ..NewSchedule::confirmed(TEACHER, CounterpartyId(99), interval)
        })
        .unwrap()
}

#[test]
fn fills_every_occurrence_of_an_empty_schedule() {
    let mut store = InMemoryStore::new();
    let created = generate(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap();

    assert_eq!(created, 3);
    let dates: Vec<NaiveDate> = store.records().map(|r| r.interval.date).collect();
    assert_eq!(dates, vec![date(2025, 3, 3), date(2025, 3, 10), date(2025, 3, 17)]);
    assert!(store
        .records()
        .all(|r| r.counterparty_id == STUDENT && r.status == ScheduleStatus::Confirmed));
}

#[test]
fn skips_the_occupied_occurrence() {
    // Teacher already teaches 2025-03-03 14:00-15:00.
    let mut store = InMemoryStore::new();
    book(&mut store, window("14:00", "15:00").on(date(2025, 3, 3)), ScheduleStatus::Confirmed);

    let report =
        generate_report(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap();

    assert_eq!(report.expected(), 3);
    assert_eq!(report.created_count(), 2);
    assert_eq!(report.skipped, vec![date(2025, 3, 3)]);
    let created: Vec<NaiveDate> = report.created.iter().map(|(d, _)| *d).collect();
    assert_eq!(created, vec![date(2025, 3, 10), date(2025, 3, 17)]);
    assert_eq!(store.len(), 3);
}

#[test]
fn conflict_on_second_of_three_occurrences_creates_two() {
    let spec = RecurrenceSpec {
        weekday: Weekday::Wed,
        cadence: Cadence::Weekly,
        date_from: date(2025, 1, 1),
        date_to: date(2025, 1, 15),
        window: window("09:00", "10:00"),
    };
    let mut store = InMemoryStore::new();
    book(&mut store, window("09:30", "10:30").on(date(2025, 1, 8)), ScheduleStatus::Confirmed);

    let created = generate(&mut store, TEACHER, &spec, lesson_for(STUDENT)).unwrap();
    assert_eq!(created, 2);
}

#[test]
fn cancelled_lessons_do_not_cause_skips() {
    let mut store = InMemoryStore::new();
    book(&mut store, window("14:00", "15:00").on(date(2025, 3, 10)), ScheduleStatus::Cancelled);

    let created = generate(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap();
    assert_eq!(created, 3);
}

#[test]
fn adjacent_lessons_do_not_cause_skips() {
    let mut store = InMemoryStore::new();
    book(&mut store, window("13:00", "14:00").on(date(2025, 3, 3)), ScheduleStatus::Confirmed);
    book(&mut store, window("15:00", "16:00").on(date(2025, 3, 10)), ScheduleStatus::Confirmed);

    let created = generate(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap();
    assert_eq!(created, 3);
}

#[test]
fn biweekly_generation() {
    let spec = RecurrenceSpec {
        cadence: Cadence::Biweekly,
        ..mondays_in_march()
    };
    let mut store = InMemoryStore::new();
    let report = generate_report(&mut store, TEACHER, &spec, lesson_for(STUDENT)).unwrap();
    let created: Vec<NaiveDate> = report.created.iter().map(|(d, _)| *d).collect();
    assert_eq!(created, vec![date(2025, 3, 3), date(2025, 3, 17)]);
}

#[test]
fn empty_recurrence_creates_nothing() {
    let spec = RecurrenceSpec {
        date_from: date(2025, 1, 1),
        date_to: date(2024, 12, 31),
        ..mondays_in_march()
    };
    let mut store = InMemoryStore::new();
    let created = generate(&mut store, TEACHER, &spec, lesson_for(STUDENT)).unwrap();
    assert_eq!(created, 0);
    assert!(store.is_empty());
}

#[test]
fn invalid_window_fails_before_any_insert() {
    let spec = RecurrenceSpec {
        window: window("15:00", "14:00"),
        ..mondays_in_march()
    };
    let mut store = InMemoryStore::new();
    let err = generate(&mut store, TEACHER, &spec, lesson_for(STUDENT)).unwrap_err();
    assert!(matches!(err, EngineError::InvalidInterval { .. }));
    assert!(store.is_empty());
}

#[test]
fn second_run_over_same_range_creates_nothing() {
    let mut store = InMemoryStore::new();
    assert_eq!(generate(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap(), 3);
    assert_eq!(generate(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap(), 0);
    assert_eq!(store.len(), 3);
}

/// Store that accepts a fixed number of inserts, then fails like a dropped connection.
struct FlakyStore {
    inner: InMemoryStore,
    inserts_left: usize,
}

impl ScheduleStore for FlakyStore {
    fn schedules_on(
        &self,
        owner_id: OwnerId,
        date: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>, StoreError> {
        self.inner.schedules_on(owner_id, date)
    }

    fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<ScheduleRecord>, StoreError> {
        self.inner.list_schedules(filter)
    }

    fn insert_schedule(&mut self, record: NewSchedule) -> Result<ScheduleId, StoreError> {
        if self.inserts_left == 0 {
            return Err(StoreError::Backend("connection reset".to_string()));
        }
        self.inserts_left -= 1;
        self.inner.insert_schedule(record)
    }

    fn get(&self, id: ScheduleId) -> Result<ScheduleRecord, StoreError> {
        self.inner.get(id)
    }

    fn update_status(
        &mut self,
        id: ScheduleId,
        status: ScheduleStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<ScheduleRecord, StoreError> {
        self.inner.update_status(id, status, cancellation)
    }
}

#[test]
fn storage_failure_propagates_and_keeps_earlier_inserts() {
    let mut store = FlakyStore {
        inner: InMemoryStore::new(),
        inserts_left: 1,
    };
    let err = generate(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap_err();

    assert!(matches!(err, EngineError::Storage(StoreError::Backend(_))));
    assert_eq!(store.inner.len(), 1, "the first occurrence stays created");
}

/// Store whose conflict query sees nothing, so only the unique key can stop a duplicate.
struct BlindStore(InMemoryStore);

impl ScheduleStore for BlindStore {
    fn schedules_on(
        &self,
        _owner_id: OwnerId,
        _date: NaiveDate,
    ) -> Result<Vec<ScheduleRecord>, StoreError> {
        Ok(Vec::new())
    }

    fn list_schedules(&self, filter: &ScheduleFilter) -> Result<Vec<ScheduleRecord>, StoreError> {
        self.0.list_schedules(filter)
    }

    fn insert_schedule(&mut self, record: NewSchedule) -> Result<ScheduleId, StoreError> {
        self.0.insert_schedule(record)
    }

    fn get(&self, id: ScheduleId) -> Result<ScheduleRecord, StoreError> {
        self.0.get(id)
    }

    fn update_status(
        &mut self,
        id: ScheduleId,
        status: ScheduleStatus,
        cancellation: Option<Cancellation>,
    ) -> Result<ScheduleRecord, StoreError> {
        self.0.update_status(id, status, cancellation)
    }
}

#[test]
fn uniqueness_violation_is_treated_as_a_skip() {
    let mut inner = InMemoryStore::new();
    inner
        .insert_schedule(NewSchedule::confirmed(
            TEACHER,
            STUDENT,
            window("14:00", "15:00").on(date(2025, 3, 10)),
        ))
        .unwrap();
    let mut store = BlindStore(inner);

    let report =
        generate_report(&mut store, TEACHER, &mondays_in_march(), lesson_for(STUDENT)).unwrap();
    assert_eq!(report.created_count(), 2);
    assert_eq!(report.skipped, vec![date(2025, 3, 10)]);
}

#[test]
fn factory_carries_subject_and_notes_onto_every_lesson() {
    let mut store = InMemoryStore::new();
    let created = generate(&mut store, TEACHER, &mondays_in_march(), |interval| {
        NewSchedule::confirmed(TEACHER, STUDENT, *interval)
            .with_subject(SubjectId(3))
            .with_notes("grammar unit")
    })
    .unwrap();
    assert_eq!(created, 3);

    let listed = store
        .list_schedules(&ScheduleFilter {
            subject_id: Some(SubjectId(3)),
            ..ScheduleFilter::owner(TEACHER)
        })
        .unwrap();
    assert_eq!(listed.len(), 3);
    assert!(listed.iter().all(|r| r.notes.as_deref() == Some("grammar unit")));
}
