//! Field mapping between local events and remote items.
//!
//! Local events are single-day with minute-of-day times, so remote items are
//! folded onto the date they start on at the configured offset.

use calsync_core::{CalendarEvent, EventPatch};
use calsync_providers::{EventDraft, RemoteEvent, RemoteEventTime};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};

const LAST_MINUTE: u16 = 24 * 60 - 1;

/// Local shape of a remote item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFields {
    pub date: NaiveDate,
    pub start_minute: Option<u16>,
    pub end_minute: Option<u16>,
    pub title: String,
}

/// Maps a remote item onto local fields. `None` if it has no start.
///
/// All-day items have no times. A timed item ending on a later day is
/// clamped to the last minute of its start day; an end equal to the start
/// is dropped.
pub fn local_fields(remote: &RemoteEvent, offset: FixedOffset) -> Option<LocalFields> {
    let start = remote.start?;
    let date = start.local_date(offset);
    let (start_minute, end_minute) = match start.local_minute(offset) {
        None => (None, None),
        Some(start_minute) => {
            let end_minute = remote.end.and_then(|end| match end {
                RemoteEventTime::Date(_) => None,
                RemoteEventTime::DateTime(_) => {
                    let end_date = end.local_date(offset);
                    let minute = end.local_minute(offset)?;
                    if end_date > date {
                        Some(LAST_MINUTE)
                    } else if end_date < date || minute < start_minute {
                        Some(start_minute)
                    } else {
                        Some(minute)
                    }
                }
            });
            (
                Some(start_minute),
                end_minute.filter(|&end| end != start_minute),
            )
        }
    };

    Some(LocalFields {
        date,
        start_minute,
        end_minute,
        title: remote.summary.clone(),
    })
}

impl LocalFields {
    /// Patch turning `event` into these fields; empty if nothing differs.
    pub fn diff(&self, event: &CalendarEvent) -> EventPatch {
        let mut patch = EventPatch::new();
        if event.date != self.date {
            patch.date = Some(self.date);
        }
        if event.start_minute != self.start_minute {
            patch.start_minute = Some(self.start_minute);
        }
        if event.end_minute != self.end_minute {
            patch.end_minute = Some(self.end_minute);
        }
        if event.title != self.title {
            patch.title = Some(self.title.clone());
        }
        patch
    }
}

/// Builds the remote payload for a local event.
///
/// All-day events span `[date, date + 1)`. Timed events without an end get
/// a zero-length range.
pub fn draft_for(event: &CalendarEvent, offset: FixedOffset) -> EventDraft {
    let (start, end) = match event.start_minute {
        None => (
            RemoteEventTime::Date(event.date),
            RemoteEventTime::Date(event.date + Duration::days(1)),
        ),
        Some(start_minute) => {
            let end_minute = event.end_minute.unwrap_or(start_minute);
            (
                RemoteEventTime::DateTime(at_minute(event.date, start_minute, offset)),
                RemoteEventTime::DateTime(at_minute(event.date, end_minute, offset)),
            )
        }
    };
    EventDraft {
        summary: event.title.clone(),
        start,
        end,
    }
}

fn at_minute(date: NaiveDate, minute: u16, offset: FixedOffset) -> DateTime<FixedOffset> {
    let naive = date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(minute));
    DateTime::from_naive_utc_and_offset(naive - offset, offset)
}
