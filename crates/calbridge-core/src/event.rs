//! Event shapes shared by the calendar providers and the HTTP surface.
//!
//! - [`UpcomingEvent`] is the reduced `{start, summary}` record returned by
//!   `GET /get-events`.
//! - [`EventDraft`] is a validated event about to be inserted, built from the
//!   loosely typed `POST /add-event` body.

use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Placeholder summary for events without a title.
pub const NO_TITLE: &str = "No title";

/// Event length used when the request does not carry a duration.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Timezone attached to drafted events unless configured otherwise.
pub const DEFAULT_TIMEZONE: &str = "UTC";

/// Accepted layouts for start times without a UTC offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Reasons an event draft cannot be built from request input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DraftError {
    /// `title` or `start_time` is absent or empty.
    #[error("Missing title or start_time")]
    MissingField,

    /// `start_time` is not an ISO-8601 timestamp.
    #[error("invalid start_time '{0}': expected ISO-8601 such as 2024-01-01T09:00:00")]
    InvalidStart(String),

    /// `duration` is not a positive number of minutes.
    #[error("invalid duration '{0}': expected a positive number of minutes")]
    InvalidDuration(String),
}

/// An upcoming event as exposed by the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpcomingEvent {
    /// Start as sent by the calendar: a date-time, or a date for all-day events.
    pub start: String,
    /// Event title, [`NO_TITLE`] when the calendar has none.
    pub summary: String,
}

impl UpcomingEvent {
    /// Creates an upcoming event, substituting the placeholder for a missing title.
    pub fn new(start: impl Into<String>, summary: Option<String>) -> Self {
        Self {
            start: start.into(),
            summary: summary.unwrap_or_else(|| NO_TITLE.to_string()),
        }
    }
}

/// A wall-clock timestamp with an optional UTC offset.
///
/// Requests may send either `2024-01-01T09:00:00` or
/// `2024-01-01T09:00:00+02:00`; the offset, when present, is preserved on
/// every timestamp derived from this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventTimestamp {
    local: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl EventTimestamp {
    /// Wraps a naive wall-clock time.
    pub fn naive(local: NaiveDateTime) -> Self {
        Self {
            local,
            offset: None,
        }
    }

    /// Wraps a time carrying an explicit offset.
    pub fn with_offset(dt: DateTime<FixedOffset>) -> Self {
        Self {
            local: dt.naive_local(),
            offset: Some(*dt.offset()),
        }
    }

    /// Parses an ISO-8601 timestamp.
    ///
    /// Accepts RFC 3339 (with `Z` or `±HH:MM`), naive date-times with `T` or a
    /// space separator, optional seconds and fractions, and bare dates
    /// (midnight).
    pub fn parse(input: &str) -> Result<Self, DraftError> {
        let trimmed = input.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::with_offset(dt));
        }

        for format in NAIVE_FORMATS {
            if let Ok(local) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self::naive(local));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            return Ok(Self::naive(date.and_time(NaiveTime::MIN)));
        }

        Err(DraftError::InvalidStart(input.to_string()))
    }

    /// Returns the wall-clock part.
    pub fn local(&self) -> NaiveDateTime {
        self.local
    }

    /// Returns the UTC offset, if the input carried one.
    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// Returns this timestamp shifted by `delta`, keeping the offset.
    pub fn checked_add(&self, delta: TimeDelta) -> Option<Self> {
        Some(Self {
            local: self.local.checked_add_signed(delta)?,
            offset: self.offset,
        })
    }
}

impl fmt::Display for EventTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.local.format("%Y-%m-%dT%H:%M:%S"))?;
        if let Some(offset) = self.offset {
            write!(f, "{}", offset)?;
        }
        Ok(())
    }
}

/// A validated event ready to be inserted into a calendar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    /// Event title.
    pub summary: String,
    /// Start time.
    pub start: EventTimestamp,
    /// End time, always after `start`.
    pub end: EventTimestamp,
    /// IANA timezone attached to both start and end.
    pub timezone: String,
}

impl EventDraft {
    /// Builds a draft lasting `duration_minutes` from `start`.
    pub fn new(
        summary: impl Into<String>,
        start: EventTimestamp,
        duration_minutes: i64,
        timezone: impl Into<String>,
    ) -> Result<Self, DraftError> {
        let invalid = || DraftError::InvalidDuration(duration_minutes.to_string());
        if duration_minutes <= 0 {
            return Err(invalid());
        }

        let delta = TimeDelta::try_minutes(duration_minutes).ok_or_else(invalid)?;
        let end = start.checked_add(delta).ok_or_else(invalid)?;

        Ok(Self {
            summary: summary.into(),
            start,
            end,
            timezone: timezone.into(),
        })
    }

    /// Builds a draft from raw request fields.
    ///
    /// Missing fields are reported before the start time is parsed, so a body
    /// with neither a title nor a valid timestamp yields
    /// [`DraftError::MissingField`].
    pub fn from_request(
        title: Option<&str>,
        start_time: Option<&str>,
        duration_minutes: Option<i64>,
        timezone: &str,
    ) -> Result<Self, DraftError> {
        let (title, start_time) = match (title, start_time) {
            (Some(t), Some(s)) if !t.is_empty() && !s.is_empty() => (t, s),
            _ => return Err(DraftError::MissingField),
        };

        let start = EventTimestamp::parse(start_time)?;
        Self::new(
            title,
            start,
            duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES),
            timezone,
        )
    }

    /// Returns the length of the event.
    pub fn duration(&self) -> TimeDelta {
        self.end.local() - self.start.local()
    }
}
