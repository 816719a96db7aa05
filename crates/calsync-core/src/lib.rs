//! Core types: events, calendars, tombstones, sync window, conflict policy

pub mod calendar;
pub mod conflict;
pub mod event;
pub mod tombstone;
pub mod tracing;
pub mod window;

pub use calendar::{CalendarRecord, EventColor};
pub use conflict::{Resolution, resolve};
pub use event::{
    CalendarEvent, EventError, EventPatch, RemoteLink, format_time_of_day, parse_time_of_day,
    validate_times,
};
pub use tombstone::DeletionTombstone;
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use window::SyncWindow;
