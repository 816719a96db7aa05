//! Pending remote deletions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable marker for a remote deletion that has not been acknowledged yet.
///
/// At most one tombstone exists per `(calendar_id, event_id)` pair;
/// recording the same pair again only moves `deleted_at` forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionTombstone {
    pub calendar_id: String,
    pub event_id: String,
    pub deleted_at: DateTime<Utc>,
}

impl DeletionTombstone {
    pub fn new(
        calendar_id: impl Into<String>,
        event_id: impl Into<String>,
        deleted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            calendar_id: calendar_id.into(),
            event_id: event_id.into(),
            deleted_at,
        }
    }

    /// Identity of the tombstone.
    pub fn key(&self) -> (&str, &str) {
        (&self.calendar_id, &self.event_id)
    }
}
