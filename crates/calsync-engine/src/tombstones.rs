//! Pending remote deletions.

use std::sync::Arc;

use calsync_core::DeletionTombstone;
use calsync_providers::CalendarApi;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::{StoreResult, SyncError, SyncResult};
use crate::store::TombstoneStore;

/// Counts from one flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub cleared: usize,
    pub retained: usize,
}

/// Records local deletions of linked events and replays them remotely.
pub struct DeletionTracker {
    store: Arc<dyn TombstoneStore>,
}

impl DeletionTracker {
    pub fn new(store: Arc<dyn TombstoneStore>) -> Self {
        Self { store }
    }

    /// Remembers that `event_id` was deleted locally and must be deleted on
    /// `calendar_id`. Recording an existing pair refreshes its timestamp.
    pub fn record(&self, calendar_id: &str, event_id: &str) -> StoreResult<()> {
        self.record_at(calendar_id, event_id, Utc::now())
    }

    pub fn record_at(
        &self,
        calendar_id: &str,
        event_id: &str,
        deleted_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        debug!(calendar_id, event_id, "recording pending remote deletion");
        self.store
            .record(DeletionTombstone::new(calendar_id, event_id, deleted_at))
    }

    pub fn list(&self, calendar_id: &str) -> StoreResult<Vec<DeletionTombstone>> {
        self.store.list(calendar_id)
    }

    pub fn is_pending(&self, calendar_id: &str, event_id: &str) -> StoreResult<bool> {
        self.store.contains(calendar_id, event_id)
    }

    pub fn clear(&self, calendar_id: &str, event_id: &str) -> StoreResult<bool> {
        self.store.clear(calendar_id, event_id)
    }

    /// Issues a remote delete for every tombstone of `calendar_id`.
    ///
    /// Deleted and already-gone items are cleared. Any other remote failure
    /// keeps the tombstone for the next pass, except auth failures which
    /// abort the flush.
    #[instrument(skip(self, api, token))]
    pub async fn flush(
        &self,
        api: &dyn CalendarApi,
        token: &str,
        calendar_id: &str,
    ) -> SyncResult<FlushReport> {
        let mut report = FlushReport::default();
        for tombstone in self.store.list(calendar_id)? {
            match api
                .delete_event(token, calendar_id, &tombstone.event_id)
                .await
            {
                Ok(outcome) => {
                    debug!(event_id = %tombstone.event_id, %outcome, "remote delete acknowledged");
                    self.store.clear(calendar_id, &tombstone.event_id)?;
                    report.cleared += 1;
                }
                Err(e) if e.is_auth() => return Err(SyncError::Provider(e)),
                Err(e) => {
                    warn!(
                        event_id = %tombstone.event_id,
                        error = %e,
                        "remote delete failed, keeping tombstone"
                    );
                    report.retained += 1;
                }
            }
        }
        Ok(report)
    }
}
