//! Google Calendar v3 `freeBusy` as a [`BusySource`].
//!
//! The caller supplies an OAuth access token; obtaining and refreshing it is
//! not this module's concern.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::freebusy::{BusyInterval, BusySource, SourceError};

pub const FREEBUSY_ENDPOINT: &str = "https://www.googleapis.com/calendar/v3/freeBusy";

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<CalendarError>,
}

#[derive(Debug, Deserialize)]
struct CalendarError {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    reason: String,
}

/// Busy intervals of one Google calendar.
///
/// Holds one `reqwest::Client` for its whole lifetime; build it once per
/// process and share it.
#[derive(Debug, Clone)]
pub struct GoogleCalendarSource {
    client: Client,
    endpoint: String,
    calendar_id: String,
    access_token: String,
}

impl GoogleCalendarSource {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: FREEBUSY_ENDPOINT.to_string(),
            calendar_id: "primary".to_string(),
            access_token: access_token.into(),
        }
    }

    pub fn with_calendar(mut self, calendar_id: impl Into<String>) -> Self {
        self.calendar_id = calendar_id.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn calendar_id(&self) -> &str {
        &self.calendar_id
    }
}

#[async_trait]
impl BusySource for GoogleCalendarSource {
    async fn busy_intervals(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<BusyInterval>, SourceError> {
        let body = json!({
            "timeMin": start.to_rfc3339(),
            "timeMax": end.to_rfc3339(),
            "items": [{ "id": self.calendar_id }],
        });

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(SourceError::Api(format!("HTTP {status}: {text}")));
        }

        parse_freebusy(&text, &self.calendar_id)
    }
}

/// Extract `calendars.<calendar_id>.busy` from a `freeBusy` response body.
///
/// A top-level `error` object, per-calendar `errors`, or a missing calendar
/// entry are all failures: an absent busy list must not read as "free".
pub fn parse_freebusy(body: &str, calendar_id: &str) -> Result<Vec<BusyInterval>, SourceError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| SourceError::Parse(e.to_string()))?;
    if let Some(err) = value.get("error") {
        return Err(SourceError::Api(err.to_string()));
    }

    let mut resp: FreeBusyResponse =
        serde_json::from_value(value).map_err(|e| SourceError::Parse(e.to_string()))?;
    let calendar = resp
        .calendars
        .remove(calendar_id)
        .ok_or_else(|| {
            SourceError::Parse(format!("calendar '{calendar_id}' missing from response"))
        })?;

    if let Some(first) = calendar.errors.first() {
        return Err(SourceError::Api(format!("{}: {}", first.domain, first.reason)));
    }

    Ok(calendar.busy)
}
