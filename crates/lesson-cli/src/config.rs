//! TOML configuration for the `lesson` CLI.
//!
//! Every section and field is optional; anything missing falls back to the
//! engine's [`SlotQuery`] defaults. Credentials never live here: the Google
//! access token comes from the `GOOGLE_ACCESS_TOKEN` environment variable.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use lesson_engine::dst::DstPolicy;
use lesson_engine::{MinuteOfDay, SlotQuery};
use serde::Deserialize;

/// Teacher working-hour settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkingHoursConfig {
    pub start: MinuteOfDay,
    pub end: MinuteOfDay,
    pub include_weekends: bool,
}

impl Default for WorkingHoursConfig {
    fn default() -> Self {
        let query = SlotQuery::default();
        Self {
            start: query.work_start,
            end: query.work_end,
            include_weekends: query.include_weekends,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlotsConfig {
    pub timezone: String,
    pub horizon_days: u32,
    pub slot_minutes: u32,
    pub safety_gap_minutes: u32,
    pub max_candidates: usize,
    pub fetch_timeout_secs: u64,
    pub dst_policy: DstPolicy,
}

impl Default for SlotsConfig {
    fn default() -> Self {
        let query = SlotQuery::default();
        Self {
            timezone: query.timezone,
            horizon_days: query.horizon_days,
            slot_minutes: query.slot_minutes,
            safety_gap_minutes: query.safety_gap_minutes,
            max_candidates: query.max_candidates,
            fetch_timeout_secs: 10,
            dst_policy: query.dst_policy,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GoogleConfig {
    pub calendar_id: String,
    /// Override of the `freeBusy` endpoint, for proxies and tests.
    pub endpoint: Option<String>,
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            calendar_id: "primary".to_string(),
            endpoint: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LessonConfig {
    pub working_hours: WorkingHoursConfig,
    pub slots: SlotsConfig,
    pub google: GoogleConfig,
}

impl LessonConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn slot_query(&self) -> SlotQuery {
        SlotQuery {
            timezone: self.slots.timezone.clone(),
            horizon_days: self.slots.horizon_days,
            work_start: self.working_hours.start,
            work_end: self.working_hours.end,
            slot_minutes: self.slots.slot_minutes,
            safety_gap_minutes: self.slots.safety_gap_minutes,
            max_candidates: self.slots.max_candidates,
            include_weekends: self.working_hours.include_weekends,
            dst_policy: self.slots.dst_policy,
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.slots.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_matches_engine_defaults() {
        let config: LessonConfig = toml::from_str("").unwrap();
        assert_eq!(config.slot_query(), SlotQuery::default());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(10));
        assert_eq!(config.google.calendar_id, "primary");
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: LessonConfig = toml::from_str(
            r#"
            [working_hours]
            start = "15:30"
            include_weekends = false

            [slots]
            timezone = "Europe/Berlin"
            dst_policy = "shift_forward"
            "#,
        )
        .unwrap();
        let query = config.slot_query();
        assert_eq!(query.work_start.to_string(), "15:30");
        assert_eq!(query.work_end.to_string(), "21:00");
        assert!(!query.include_weekends);
        assert_eq!(query.timezone, "Europe/Berlin");
        assert_eq!(query.dst_policy, DstPolicy::ShiftForward);
        assert_eq!(query.slot_minutes, 60);
    }

    #[test]
    fn malformed_time_is_rejected() {
        let result: Result<LessonConfig, _> =
            toml::from_str("[working_hours]\nstart = \"25:00\"\n");
        assert!(result.is_err());
    }
}
