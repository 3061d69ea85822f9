//! The calendar service, as seen by the HTTP layer.
//!
//! [`CalendarService`] is consumed with an access token obtained from the
//! credential manager; it never touches credentials itself.

use calbridge_core::{EventDraft, UpcomingEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::BoxFuture;
use crate::error::ProviderResult;

/// Calendar used when none is configured.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Number of events returned by default.
pub const DEFAULT_MAX_RESULTS: usize = 10;

/// Parameters for listing upcoming events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    /// Calendar identifier.
    pub calendar_id: String,
    /// Only events ending after this instant are returned.
    pub time_min: DateTime<Utc>,
    /// Maximum number of events.
    pub max_results: usize,
    /// Expand recurring events into single instances.
    pub single_events: bool,
    /// Ordering key understood by the service (`startTime` or `updated`).
    pub order_by: String,
}

impl ListQuery {
    /// Upcoming events on `calendar_id`, starting now.
    pub fn upcoming(calendar_id: impl Into<String>) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            time_min: Utc::now(),
            max_results: DEFAULT_MAX_RESULTS,
            single_events: true,
            order_by: "startTime".to_string(),
        }
    }

    /// Builder method to set max results.
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }

    /// Builder method to set the lower time bound.
    pub fn with_time_min(mut self, time_min: DateTime<Utc>) -> Self {
        self.time_min = time_min;
        self
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self::upcoming(PRIMARY_CALENDAR)
    }
}

/// An event record as returned by the service after insertion.
///
/// The common fields are typed; everything else the service sends back is
/// kept in `extra` so the record can be relayed unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    /// Service-assigned identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Link to the event in the calendar UI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A calendar backend.
pub trait CalendarService: Send + Sync {
    /// Returns the service name (e.g. "google").
    fn name(&self) -> &str;

    /// Lists upcoming events.
    fn list_upcoming<'a>(
        &'a self,
        access_token: &'a str,
        query: &'a ListQuery,
    ) -> BoxFuture<'a, ProviderResult<Vec<UpcomingEvent>>>;

    /// Inserts an event and returns the created record.
    fn insert_event<'a>(
        &'a self,
        access_token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<CreatedEvent>>;
}
