//! Remote calendar records and the color palette.
//!
//! A [`CalendarRecord`] is the local view of one remote calendar: its
//! assigned display color, whether the engine should sync it, whether the
//! account may write to it, and the incremental sync state left behind by
//! the last successful pass.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::EventError;

/// Color tag shared by calendars and the events they own.
///
/// Local-only events are attached to a calendar by color: an unlinked event
/// is pushed to the calendar whose assigned color matches its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventColor {
    Blue,
    Green,
    Red,
    Yellow,
    Purple,
    Orange,
    Teal,
}

impl EventColor {
    /// The fixed palette, in assignment order.
    pub const PALETTE: [EventColor; 7] = [
        Self::Blue,
        Self::Green,
        Self::Red,
        Self::Yellow,
        Self::Purple,
        Self::Orange,
        Self::Teal,
    ];

    /// Returns the lowercase name of this color.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blue => "blue",
            Self::Green => "green",
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Purple => "purple",
            Self::Orange => "orange",
            Self::Teal => "teal",
        }
    }

    /// Picks the color for a newly discovered calendar.
    ///
    /// Returns the first palette entry not present in `taken`. Once every
    /// color is in use the palette cycles, indexed by how many colors are
    /// already assigned.
    pub fn next_available(taken: &[EventColor]) -> EventColor {
        Self::PALETTE
            .iter()
            .copied()
            .find(|color| !taken.contains(color))
            .unwrap_or(Self::PALETTE[taken.len() % Self::PALETTE.len()])
    }
}

impl fmt::Display for EventColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventColor {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::PALETTE
            .iter()
            .copied()
            .find(|color| color.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| EventError::UnknownColor(s.to_string()))
    }
}

/// Local record of a remote calendar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRecord {
    /// Remote calendar identifier (unique).
    pub remote_calendar_id: String,
    /// Display name reported by the remote directory.
    pub name: String,
    /// Assigned color, stable once chosen.
    pub color: EventColor,
    /// Whether the sync engine processes this calendar.
    pub enabled: bool,
    /// Derived from the remote access role at discovery time.
    pub can_write: bool,
    /// Opaque incremental sync cursor. `None` forces a full bounded resync.
    pub sync_cursor: Option<String>,
    /// Start time of the last successful pass.
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl CalendarRecord {
    /// Creates a record for a newly discovered calendar.
    ///
    /// Read-only calendars start disabled; writable ones start enabled.
    pub fn discovered(
        remote_calendar_id: impl Into<String>,
        name: impl Into<String>,
        color: EventColor,
        can_write: bool,
    ) -> Self {
        Self {
            remote_calendar_id: remote_calendar_id.into(),
            name: name.into(),
            color,
            enabled: can_write,
            can_write,
            sync_cursor: None,
            last_sync_at: None,
        }
    }

    /// Returns true if the next pass has to do a full bounded-window pull.
    pub fn needs_full_sync(&self) -> bool {
        self.sync_cursor.is_none()
    }
}
