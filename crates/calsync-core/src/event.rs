//! Local calendar events.
//!
//! A [`CalendarEvent`] lives in the local store. When it has been synced it
//! carries a [`RemoteLink`] pointing at the remote item it mirrors.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::calendar::EventColor;

/// Last valid minute of a day (23:59).
pub const LAST_MINUTE_OF_DAY: u16 = 1439;

/// Validation errors for local events.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// Minute offset outside 0..=1439.
    #[error("time of day out of range: {0} (expected 0..=1439)")]
    MinuteOutOfRange(u16),

    /// End time earlier than start time.
    #[error("end time {end} is before start time {start}")]
    EndBeforeStart { start: u16, end: u16 },

    /// Unparseable `HH:MM` string.
    #[error("invalid time of day: {0:?} (expected HH:MM)")]
    InvalidTimeOfDay(String),

    /// Color not in the palette.
    #[error("unknown color: {0:?}")]
    UnknownColor(String),
}

/// Linkage between a local event and the remote item it mirrors.
///
/// The calendar id is always present alongside the event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteLink {
    /// Remote calendar holding the item.
    pub calendar_id: String,
    /// Remote event identifier.
    pub event_id: String,
    /// Opaque version tag (etag) of the remote item as last seen.
    pub version_tag: Option<String>,
}

impl RemoteLink {
    pub fn new(
        calendar_id: impl Into<String>,
        event_id: impl Into<String>,
        version_tag: Option<String>,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            event_id: event_id.into(),
            version_tag,
        }
    }
}

/// A calendar event in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    /// Locally unique opaque identifier.
    pub id: String,
    /// Calendar day of the event.
    pub date: NaiveDate,
    /// Start time as minutes since midnight.
    pub start_minute: Option<u16>,
    /// End time as minutes since midnight.
    pub end_minute: Option<u16>,
    pub title: String,
    pub color: EventColor,
    /// Present once the event has been pushed to or pulled from the remote.
    pub remote: Option<RemoteLink>,
    /// Advanced on every local mutation.
    pub updated_at: DateTime<Utc>,
}

impl CalendarEvent {
    /// Creates a new all-day, unlinked event with a fresh id.
    pub fn new(date: NaiveDate, title: impl Into<String>, color: EventColor) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            start_minute: None,
            end_minute: None,
            title: title.into(),
            color,
            remote: None,
            updated_at: Utc::now(),
        }
    }

    /// Sets the time-of-day range, validating it.
    pub fn with_times(mut self, start: Option<u16>, end: Option<u16>) -> Result<Self, EventError> {
        validate_times(start, end)?;
        self.start_minute = start;
        self.end_minute = end;
        Ok(self)
    }

    pub fn with_remote(mut self, link: RemoteLink) -> Self {
        self.remote = Some(link);
        self
    }

    pub fn with_updated_at(mut self, updated_at: DateTime<Utc>) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Returns true if the event mirrors a remote item.
    pub fn is_remote_linked(&self) -> bool {
        self.remote.is_some()
    }

    /// Remote calendar id, if linked.
    pub fn remote_calendar_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.calendar_id.as_str())
    }

    /// Remote event id, if linked.
    pub fn remote_event_id(&self) -> Option<&str> {
        self.remote.as_ref().map(|r| r.event_id.as_str())
    }

    /// Returns true if the event has no time of day.
    pub fn is_all_day(&self) -> bool {
        self.start_minute.is_none()
    }

    /// Checks the time-of-day invariants.
    pub fn validate(&self) -> Result<(), EventError> {
        validate_times(self.start_minute, self.end_minute)
    }

    /// Advances `updated_at` to `now`, or one millisecond past its current
    /// value if the clock has not moved forward.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + Duration::milliseconds(1)
        };
    }
}

/// Partial update applied through the repository's `update`.
///
/// Each `Some` field replaces the stored value. Nested options distinguish
/// "leave alone" from "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventPatch {
    pub date: Option<NaiveDate>,
    pub start_minute: Option<Option<u16>>,
    pub end_minute: Option<Option<u16>>,
    pub title: Option<String>,
    pub color: Option<EventColor>,
    pub remote: Option<Option<RemoteLink>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl EventPatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Patch that only replaces the remote linkage.
    pub fn link(link: RemoteLink) -> Self {
        Self {
            remote: Some(Some(link)),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the patch to `event` in place and re-validates it.
    pub fn apply(&self, event: &mut CalendarEvent) -> Result<(), EventError> {
        let start = self.start_minute.unwrap_or(event.start_minute);
        let end = self.end_minute.unwrap_or(event.end_minute);
        validate_times(start, end)?;

        if let Some(date) = self.date {
            event.date = date;
        }
        event.start_minute = start;
        event.end_minute = end;
        if let Some(ref title) = self.title {
            event.title.clone_from(title);
        }
        if let Some(color) = self.color {
            event.color = color;
        }
        if let Some(ref remote) = self.remote {
            event.remote.clone_from(remote);
        }
        if let Some(updated_at) = self.updated_at {
            event.updated_at = updated_at;
        }
        Ok(())
    }
}

/// Checks that both minutes are in range and that end is not before start.
pub fn validate_times(start: Option<u16>, end: Option<u16>) -> Result<(), EventError> {
    for minute in [start, end].into_iter().flatten() {
        if minute > LAST_MINUTE_OF_DAY {
            return Err(EventError::MinuteOutOfRange(minute));
        }
    }
    if let (Some(start), Some(end)) = (start, end)
        && end < start
    {
        return Err(EventError::EndBeforeStart { start, end });
    }
    Ok(())
}

/// Parses `HH:MM` into minutes since midnight.
pub fn parse_time_of_day(input: &str) -> Result<u16, EventError> {
    let invalid = || EventError::InvalidTimeOfDay(input.to_string());
    let (hours, minutes) = input.trim().split_once(':').ok_or_else(invalid)?;
    let hours: u16 = hours.parse().map_err(|_| invalid())?;
    let minutes: u16 = minutes.parse().map_err(|_| invalid())?;
    if hours > 23 || minutes > 59 {
        return Err(invalid());
    }
    Ok(hours * 60 + minutes)
}

/// Formats minutes since midnight as `HH:MM`.
pub fn format_time_of_day(minute: u16) -> String {
    format!("{:02}:{:02}", minute / 60, minute % 60)
}
