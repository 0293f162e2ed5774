//! `lesson` CLI: check conflicts, book and cancel lessons, generate recurring
//! lessons and find open slots from the command line.
//!
//! ## Usage
//!
//! ```sh
//! # List every second Wednesday in a range
//! lesson expand --from 2025-01-01 --to 2025-03-31 --weekday 2 --cadence biweekly
//!
//! # Would 14:00~15:00 on 2025-03-03 clash with the teacher's lessons?
//! lesson check --store schedules.json --owner 1 --date 2025-03-03 --start 14:00 --end 15:00
//!
//! # Book or cancel a single lesson
//! lesson book --store schedules.json --owner 1 --counterparty 10 --date 2025-03-03 \
//!     --start 14:00 --end 15:00 --subject 4 --notes "chapter 3"
//! lesson cancel --store schedules.json --id 3 --reason "student is sick"
//!
//! # A teacher's confirmed lessons in March, by date and start time
//! lesson list --store schedules.json --owner 1 --from 2025-03-01 --to 2025-03-31 \
//!     --status confirmed
//!
//! # Every Monday 14:00~15:00 in March, skipping occupied dates
//! lesson bulk --store schedules.json --owner 1 --counterparty 10 --weekday 0 \
//!     --start 14:00 --end 15:00 --from 2025-03-01 --to 2025-03-31
//!
//! # Open slots against a busy list exported to JSON
//! lesson slots --busy busy.json --config lesson.toml
//!
//! # Open slots against Google Calendar (token from GOOGLE_ACCESS_TOKEN)
//! lesson slots --google
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `warn`); logs go to stderr so
//! stdout stays machine-readable JSON.

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use lesson_engine::google::GoogleCalendarSource;
use lesson_engine::store::Cancellation;
use lesson_engine::{
    cancel_schedule, create_schedule, expand, find_blocking, generate_report, weekday_from_index,
    BusyInterval, BusySource, Cadence, CounterpartyId, InMemoryStore, LessonWindow, MinuteOfDay,
    NewSchedule, OwnerId, RecurrenceSpec, ScheduleFilter, ScheduleId, ScheduleRecord,
    ScheduleStatus, ScheduleStore, SlotFinder, SlotQuery, StaticBusySource, SubjectId,
    TimeInterval,
};
use serde_json::json;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::LessonConfig;

#[derive(Parser)]
#[command(
    name = "lesson",
    version,
    about = "Tutoring schedule engine: conflicts, recurring lessons and open slots"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum CadenceArg {
    Weekly,
    Biweekly,
}

impl From<CadenceArg> for Cadence {
    fn from(arg: CadenceArg) -> Self {
        match arg {
            CadenceArg::Weekly => Cadence::Weekly,
            CadenceArg::Biweekly => Cadence::Biweekly,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl From<StatusArg> for ScheduleStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Confirmed => ScheduleStatus::Confirmed,
            StatusArg::Cancelled => ScheduleStatus::Cancelled,
            StatusArg::Completed => ScheduleStatus::Completed,
            StatusArg::NoShow => ScheduleStatus::NoShow,
        }
    }
}

/// Optional details stored on every lesson a command creates.
#[derive(Args)]
struct LessonDetails {
    #[arg(long)]
    subject: Option<u64>,
    #[arg(long)]
    notes: Option<String>,
}

impl LessonDetails {
    fn apply(&self, mut lesson: NewSchedule) -> NewSchedule {
        if let Some(subject) = self.subject {
            lesson = lesson.with_subject(SubjectId(subject));
        }
        if let Some(notes) = &self.notes {
            lesson = lesson.with_notes(notes.clone());
        }
        lesson
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the dates of a weekly or biweekly recurrence
    Expand {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        /// Weekday index, 0=Monday..6=Sunday
        #[arg(long)]
        weekday: u8,
        #[arg(long, value_enum, default_value = "weekly")]
        cadence: CadenceArg,
    },
    /// Check whether a candidate lesson overlaps the owner's active lessons
    Check {
        /// JSON file holding the schedule records
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        start: MinuteOfDay,
        #[arg(long)]
        end: MinuteOfDay,
    },
    /// Book a single lesson, refusing overlaps
    Book {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        counterparty: u64,
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        start: MinuteOfDay,
        #[arg(long)]
        end: MinuteOfDay,
        #[command(flatten)]
        details: LessonDetails,
    },
    /// List an owner's lessons ordered by date, then start time
    List {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        owner: u64,
        /// First date to include
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Last date to include
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long, value_enum)]
        status: Option<StatusArg>,
        #[arg(long)]
        counterparty: Option<u64>,
        #[arg(long)]
        subject: Option<u64>,
    },
    /// Cancel a lesson, freeing its slot
    Cancel {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        id: u64,
        /// User id of whoever cancels
        #[arg(long)]
        by: Option<u64>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Create a lesson on every matching date, skipping occupied ones
    Bulk {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        owner: u64,
        #[arg(long)]
        counterparty: u64,
        /// Weekday index, 0=Monday..6=Sunday
        #[arg(long)]
        weekday: u8,
        #[arg(long)]
        start: MinuteOfDay,
        #[arg(long)]
        end: MinuteOfDay,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
        #[arg(long, value_enum, default_value = "weekly")]
        cadence: CadenceArg,
        #[command(flatten)]
        details: LessonDetails,
    },
    /// Find open slots within working hours
    Slots(SlotsArgs),
}

#[derive(Args)]
#[command(group(ArgGroup::new("source").required(true).args(["busy", "google"])))]
struct SlotsArgs {
    /// TOML config file
    #[arg(long)]
    config: Option<PathBuf>,
    /// JSON file with busy intervals (`[{"start": RFC3339, "end": RFC3339}]`)
    #[arg(long)]
    busy: Option<PathBuf>,
    /// Query Google Calendar free/busy using GOOGLE_ACCESS_TOKEN
    #[arg(long)]
    google: bool,
    /// Search from this instant instead of the current time
    #[arg(long)]
    now: Option<DateTime<Utc>>,
    #[arg(long)]
    timezone: Option<String>,
    #[arg(long)]
    days: Option<u32>,
    #[arg(long)]
    work_start: Option<MinuteOfDay>,
    #[arg(long)]
    work_end: Option<MinuteOfDay>,
    #[arg(long)]
    slot_minutes: Option<u32>,
    #[arg(long)]
    gap_minutes: Option<u32>,
    #[arg(long)]
    max: Option<usize>,
    /// Only consider Monday through Friday
    #[arg(long)]
    no_weekends: bool,
}

impl SlotsArgs {
    fn apply(&self, mut query: SlotQuery) -> SlotQuery {
        if let Some(timezone) = &self.timezone {
            query.timezone = timezone.clone();
        }
        if let Some(days) = self.days {
            query.horizon_days = days;
        }
        if let Some(start) = self.work_start {
            query.work_start = start;
        }
        if let Some(end) = self.work_end {
            query.work_end = end;
        }
        if let Some(minutes) = self.slot_minutes {
            query.slot_minutes = minutes;
        }
        if let Some(gap) = self.gap_minutes {
            query.safety_gap_minutes = gap;
        }
        if let Some(max) = self.max {
            query.max_candidates = max;
        }
        if self.no_weekends {
            query.include_weekends = false;
        }
        query
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Expand {
            from,
            to,
            weekday,
            cadence,
        } => {
            let weekday = weekday_from_index(weekday)?;
            let dates: Vec<NaiveDate> = expand(from, to, weekday, cadence.into()).collect();
            print_json(&json!(dates))?;
        }
        Commands::Check {
            store,
            owner,
            date,
            start,
            end,
        } => {
            let schedules = load_store(&store)?;
            let candidate = TimeInterval::new(date, start, end)?;
            let blocking = find_blocking(&schedules, OwnerId(owner), &candidate)?;
            print_json(&json!({
                "conflict": blocking.is_some(),
                "blocking": blocking,
            }))?;
        }
        Commands::Book {
            store,
            owner,
            counterparty,
            date,
            start,
            end,
            details,
        } => {
            let mut schedules = load_store(&store)?;
            let interval = TimeInterval::new(date, start, end)?;
            let lesson = details.apply(NewSchedule::confirmed(
                OwnerId(owner),
                CounterpartyId(counterparty),
                interval,
            ));
            let id = create_schedule(&mut schedules, lesson)
                .with_context(|| format!("Could not book {interval}"))?;
            save_store(&store, &schedules)?;
            print_json(&json!({ "schedule_id": id }))?;
        }
        Commands::List {
            store,
            owner,
            from,
            to,
            status,
            counterparty,
            subject,
        } => {
            let schedules = load_store(&store)?;
            let filter = ScheduleFilter {
                counterparty_id: counterparty.map(CounterpartyId),
                subject_id: subject.map(SubjectId),
                status: status.map(ScheduleStatus::from),
                date_from: from,
                date_to: to,
                ..ScheduleFilter::owner(OwnerId(owner))
            };
            let records = schedules.list_schedules(&filter)?;
            print_json(&json!(records))?;
        }
        Commands::Cancel { store, id, by, reason } => {
            let mut schedules = load_store(&store)?;
            let cancellation = Cancellation {
                cancelled_at: Utc::now(),
                cancelled_by: by,
                reason,
            };
            let record = cancel_schedule(&mut schedules, ScheduleId(id), cancellation)?;
            save_store(&store, &schedules)?;
            print_json(&json!(record))?;
        }
        Commands::Bulk {
            store,
            owner,
            counterparty,
            weekday,
            start,
            end,
            from,
            to,
            cadence,
            details,
        } => {
            let mut schedules = load_store(&store)?;
            let recurrence = RecurrenceSpec {
                weekday: weekday_from_index(weekday)?,
                cadence: cadence.into(),
                date_from: from,
                date_to: to,
                window: LessonWindow::new(start, end)?,
            };
            let owner_id = OwnerId(owner);
            let counterparty_id = CounterpartyId(counterparty);
            let report = generate_report(&mut schedules, owner_id, &recurrence, |interval| {
                details.apply(NewSchedule::confirmed(owner_id, counterparty_id, *interval))
            })?;
            save_store(&store, &schedules)?;
            print_json(&json!({
                "created": report.created_count(),
                "expected": report.expected(),
                "skipped": report.skipped,
            }))?;
        }
        Commands::Slots(args) => run_slots(args).await?,
    }

    Ok(())
}

async fn run_slots(args: SlotsArgs) -> Result<()> {
    let config = LessonConfig::load(args.config.as_deref())?;
    let query = args.apply(config.slot_query());
    let now = args.now.unwrap_or_else(Utc::now);

    let source: Box<dyn BusySource> = match &args.busy {
        Some(path) => Box::new(StaticBusySource::new(load_busy(path)?)),
        None => {
            let token = std::env::var("GOOGLE_ACCESS_TOKEN")
                .context("--google requires the GOOGLE_ACCESS_TOKEN environment variable")?;
            let mut google = GoogleCalendarSource::new(token)
                .with_calendar(config.google.calendar_id.clone());
            if let Some(endpoint) = &config.google.endpoint {
                google = google.with_endpoint(endpoint.clone());
            }
            Box::new(google)
        }
    };

    let finder = SlotFinder::new(source).with_timeout(config.fetch_timeout());
    let slots = finder.find_slots_at(&query, now).await.map_err(|err| {
        if err.is_availability_unknown() {
            anyhow::Error::new(err).context("Availability currently unknown; no slots offered")
        } else {
            anyhow::Error::new(err)
        }
    })?;

    let rendered: Vec<String> = slots
        .iter()
        .map(|slot| format!("{} {}", slot.date, slot.time))
        .collect();
    print_json(&json!(rendered))
}

/// Load the schedule file; a missing file is an empty store.
fn load_store(path: &Path) -> Result<InMemoryStore> {
    if !path.exists() {
        return Ok(InMemoryStore::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read store file: {}", path.display()))?;
    let records: Vec<ScheduleRecord> = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse store file: {}", path.display()))?;
    InMemoryStore::from_records(records)
        .with_context(|| format!("Inconsistent store file: {}", path.display()))
}

fn save_store(path: &Path, store: &InMemoryStore) -> Result<()> {
    let records: Vec<&ScheduleRecord> = store.records().collect();
    let text = serde_json::to_string_pretty(&records)?;
    std::fs::write(path, text)
        .with_context(|| format!("Failed to write store file: {}", path.display()))?;
    info!(path = %path.display(), records = records.len(), "store saved");
    Ok(())
}

fn load_busy(path: &Path) -> Result<Vec<BusyInterval>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read busy file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse busy file: {}", path.display()))
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
