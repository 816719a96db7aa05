//! User-driven mutations of local events.
//!
//! Every create and edit stamps `updated_at`, which is what the sync engine
//! compares against remote update times. Deleting a linked event leaves a
//! tombstone so the next pass deletes the remote item too.

use std::sync::Arc;

use calsync_core::{CalendarEvent, EventColor, EventPatch};
use chrono::{NaiveDate, Utc};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::{CalendarRegistry, EventRepository, TombstoneStore};
use crate::tombstones::DeletionTracker;

/// Fields for a new local event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub date: NaiveDate,
    pub title: String,
    pub start_minute: Option<u16>,
    pub end_minute: Option<u16>,
}

impl NewEvent {
    pub fn all_day(date: NaiveDate, title: impl Into<String>) -> Self {
        Self {
            date,
            title: title.into(),
            start_minute: None,
            end_minute: None,
        }
    }

    pub fn with_times(mut self, start: Option<u16>, end: Option<u16>) -> Self {
        self.start_minute = start;
        self.end_minute = end;
        self
    }
}

/// Local event operations for interactive use.
pub struct LocalEvents {
    events: Arc<dyn EventRepository>,
    calendars: Arc<dyn CalendarRegistry>,
    tracker: DeletionTracker,
}

impl LocalEvents {
    pub fn new(
        events: Arc<dyn EventRepository>,
        calendars: Arc<dyn CalendarRegistry>,
        tombstones: Arc<dyn TombstoneStore>,
    ) -> Self {
        Self {
            events,
            calendars,
            tracker: DeletionTracker::new(tombstones),
        }
    }

    pub fn with_store<S>(store: Arc<S>) -> Self
    where
        S: EventRepository + CalendarRegistry + TombstoneStore + 'static,
    {
        Self::new(store.clone(), store.clone(), store)
    }

    pub fn list(&self) -> StoreResult<Vec<CalendarEvent>> {
        self.events.list()
    }

    pub fn get(&self, id: &str) -> StoreResult<Option<CalendarEvent>> {
        self.events.get(id)
    }

    /// Creates an unlinked event with `color`. It is pushed to the calendar
    /// carrying that color on the next pass.
    pub fn create(&self, new: NewEvent, color: EventColor) -> StoreResult<CalendarEvent> {
        let event = CalendarEvent::new(new.date, new.title, color)
            .with_times(new.start_minute, new.end_minute)?;
        self.events.insert(event.clone())?;
        info!(event_id = %event.id, date = %event.date, %color, "created event");
        Ok(event)
    }

    /// Creates an event destined for `calendar_id`.
    pub fn create_in_calendar(&self, calendar_id: &str, new: NewEvent) -> StoreResult<CalendarEvent> {
        let calendar = self
            .calendars
            .get(calendar_id)?
            .ok_or_else(|| StoreError::CalendarNotFound(calendar_id.to_string()))?;
        self.create(new, calendar.color)
    }

    /// Applies a user edit. Remote linkage cannot be changed this way.
    pub fn edit(&self, id: &str, patch: &EventPatch) -> StoreResult<CalendarEvent> {
        let mut current = self
            .events
            .get(id)?
            .ok_or_else(|| StoreError::EventNotFound(id.to_string()))?;
        current.touch(Utc::now());

        let patch = EventPatch {
            remote: None,
            updated_at: Some(current.updated_at),
            ..patch.clone()
        };
        let updated = self.events.update(id, &patch)?;
        debug!(event_id = %id, "edited event");
        Ok(updated)
    }

    /// Deletes an event, recording a tombstone first when it is linked to a
    /// calendar the remote side lets us write to. Read-only copies are only
    /// dropped locally and come back on the next full pull.
    pub fn delete(&self, id: &str) -> StoreResult<Option<CalendarEvent>> {
        let Some(event) = self.events.get(id)? else {
            return Ok(None);
        };
        if let Some(link) = &event.remote
            && self
                .calendars
                .get(&link.calendar_id)?
                .is_none_or(|calendar| calendar.can_write)
        {
            self.tracker.record(&link.calendar_id, &link.event_id)?;
        }
        let deleted = self.events.delete(id)?;
        info!(event_id = %id, linked = event.is_remote_linked(), "deleted event");
        Ok(deleted)
    }
}
