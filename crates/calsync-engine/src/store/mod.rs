//! Local persistence interfaces consumed by the sync engine.
//!
//! Implementations must apply each call as one atomic mutation: a reader
//! never observes a half-applied insert, update or delete.

mod file;

pub use file::FileStore;

use calsync_core::{CalendarEvent, CalendarRecord, DeletionTombstone, EventPatch};
use chrono::{DateTime, Utc};

use crate::error::StoreResult;

/// Persistent collection of local events.
pub trait EventRepository: Send + Sync {
    /// The event linked to `remote_event_id` on `calendar_id`.
    fn find_by_remote_id(
        &self,
        calendar_id: &str,
        remote_event_id: &str,
    ) -> StoreResult<Option<CalendarEvent>>;

    /// Events linked to `calendar_id` with `updated_at` strictly after `after`.
    fn find_updated_after(
        &self,
        calendar_id: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<CalendarEvent>>;

    /// Events with no remote linkage.
    fn find_missing_remote_link(&self) -> StoreResult<Vec<CalendarEvent>>;

    fn get(&self, id: &str) -> StoreResult<Option<CalendarEvent>>;

    /// All events ordered by date, then start time.
    fn list(&self) -> StoreResult<Vec<CalendarEvent>>;

    /// Fails if the id exists or the event links to an unknown calendar.
    fn insert(&self, event: CalendarEvent) -> StoreResult<()>;

    /// Applies `patch` and returns the updated event.
    fn update(&self, id: &str, patch: &EventPatch) -> StoreResult<CalendarEvent>;

    /// Removes the event, returning it if it existed.
    fn delete(&self, id: &str) -> StoreResult<Option<CalendarEvent>>;
}

/// Persistent set of known remote calendars.
pub trait CalendarRegistry: Send + Sync {
    /// All calendars in discovery order.
    fn list(&self) -> StoreResult<Vec<CalendarRecord>>;

    fn get(&self, remote_calendar_id: &str) -> StoreResult<Option<CalendarRecord>>;

    /// Inserts or replaces the record with the same remote id.
    fn upsert(&self, record: CalendarRecord) -> StoreResult<()>;

    fn set_enabled(&self, remote_calendar_id: &str, enabled: bool) -> StoreResult<()>;

    /// Records the outcome of a successful pass.
    fn update_sync_state(
        &self,
        remote_calendar_id: &str,
        cursor: Option<String>,
        last_sync_at: DateTime<Utc>,
    ) -> StoreResult<()>;
}

/// Durable pending remote deletions.
pub trait TombstoneStore: Send + Sync {
    /// Adds the tombstone, replacing any existing one for the same pair.
    fn record(&self, tombstone: DeletionTombstone) -> StoreResult<()>;

    fn list(&self, calendar_id: &str) -> StoreResult<Vec<DeletionTombstone>>;

    fn contains(&self, calendar_id: &str, event_id: &str) -> StoreResult<bool>;

    /// Removes the tombstone; returns false if there was none.
    fn clear(&self, calendar_id: &str, event_id: &str) -> StoreResult<bool>;
}
