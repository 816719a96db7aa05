//! The remote calendar surface consumed by the sync engine.
//!
//! [`CalendarApi`] is the seam between the engine and the HTTP world. The
//! Google implementation lives in [`crate::google`]; tests substitute an
//! in-memory fake.
//!
//! Every method takes the bearer token explicitly so that the caller (the
//! engine, through the token manager) controls when it is refreshed.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// A boxed future for object-safe async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The account's access role on a calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessRole {
    Owner,
    Writer,
    Reader,
    FreeBusyReader,
    /// A role this client does not know; treated as read-only.
    Unknown,
}

impl AccessRole {
    /// Parses the API's role string.
    pub fn parse(role: &str) -> Self {
        match role {
            "owner" => Self::Owner,
            "writer" => Self::Writer,
            "reader" => Self::Reader,
            "freeBusyReader" => Self::FreeBusyReader,
            _ => Self::Unknown,
        }
    }

    /// Returns true if events may be created, updated, and deleted.
    pub fn can_write(&self) -> bool {
        matches!(self, Self::Owner | Self::Writer)
    }
}

/// One entry of the remote calendar directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCalendar {
    pub id: String,
    pub name: String,
    pub access_role: AccessRole,
    pub primary: bool,
}

/// One page of the calendar directory.
#[derive(Debug, Clone, Default)]
pub struct CalendarPage {
    pub calendars: Vec<RemoteCalendar>,
    pub next_page_token: Option<String>,
}

/// Start or end of a remote event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteEventTime {
    /// All-day boundary (end dates are exclusive).
    Date(NaiveDate),
    /// A specific instant, with the offset it was reported in.
    DateTime(DateTime<FixedOffset>),
}

impl RemoteEventTime {
    /// Calendar date at `offset`.
    pub fn local_date(&self, offset: FixedOffset) -> NaiveDate {
        match self {
            Self::Date(date) => *date,
            Self::DateTime(dt) => dt.with_timezone(&offset).date_naive(),
        }
    }

    /// Minutes since midnight at `offset`; `None` for all-day boundaries.
    pub fn local_minute(&self, offset: FixedOffset) -> Option<u16> {
        use chrono::Timelike;
        match self {
            Self::Date(_) => None,
            Self::DateTime(dt) => {
                let local = dt.with_timezone(&offset);
                Some((local.hour() * 60 + local.minute()) as u16)
            }
        }
    }
}

/// An event as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEvent {
    pub id: String,
    /// Deleted on the remote side (`status: "cancelled"`).
    pub cancelled: bool,
    pub summary: String,
    /// Absent on most cancelled items.
    pub start: Option<RemoteEventTime>,
    pub end: Option<RemoteEventTime>,
    /// Last modification time on the remote side.
    pub updated: Option<DateTime<Utc>>,
    /// Opaque version tag.
    pub etag: Option<String>,
}

impl RemoteEvent {
    /// Calendar date of the event's start at `offset`.
    pub fn local_date(&self, offset: FixedOffset) -> Option<NaiveDate> {
        self.start.map(|start| start.local_date(offset))
    }
}

/// How a page of events is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventQuery {
    /// Changes since the given cursor.
    Incremental { sync_token: String },
    /// Everything overlapping `[time_min, time_max)`.
    Window {
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
    },
}

impl EventQuery {
    pub fn is_incremental(&self) -> bool {
        matches!(self, Self::Incremental { .. })
    }
}

/// Request for one page of events.
#[derive(Debug, Clone)]
pub struct EventPageRequest {
    pub query: EventQuery,
    pub page_token: Option<String>,
    pub max_results: u32,
}

/// One page of events.
#[derive(Debug, Clone, Default)]
pub struct EventPage {
    pub items: Vec<RemoteEvent>,
    pub next_page_token: Option<String>,
    /// Only present on the last page.
    pub next_sync_token: Option<String>,
}

/// Fields written to the remote side on create and update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub summary: String,
    pub start: RemoteEventTime,
    pub end: RemoteEventTime,
}

/// Result of a remote delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The item did not exist (or was already deleted).
    AlreadyGone,
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => f.write_str("deleted"),
            Self::AlreadyGone => f.write_str("already gone"),
        }
    }
}

/// Remote calendar service operations used by the sync engine.
pub trait CalendarApi: Send + Sync {
    /// Fetches one page of the calendar directory.
    fn list_calendars<'a>(
        &'a self,
        token: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<CalendarPage>>;

    /// Fetches one page of events. A rejected cursor surfaces as
    /// [`crate::ProviderErrorCode::CursorExpired`].
    fn list_events<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        request: &'a EventPageRequest,
    ) -> BoxFuture<'a, ProviderResult<EventPage>>;

    /// Creates an event and returns the stored item.
    fn create_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>>;

    /// Updates an event's fields and returns the stored item.
    fn patch_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>>;

    /// Deletes an event. A missing item is not an error.
    fn delete_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<DeleteOutcome>>;
}
