//! Discovery of remote calendars.

use std::sync::Arc;

use calsync_core::{CalendarRecord, EventColor};
use calsync_providers::{CalendarApi, RemoteCalendar};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::error::SyncResult;
use crate::store::CalendarRegistry;

/// Outcome of a directory refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryReport {
    /// Calendars seen for the first time.
    pub discovered: Vec<String>,
    /// Known calendars whose name or write access changed.
    pub updated: Vec<String>,
    /// Calendars reported by the remote side in this refresh.
    pub total: usize,
}

/// Keeps the local calendar registry in step with the remote directory.
pub struct CalendarDirectory {
    api: Arc<dyn CalendarApi>,
    registry: Arc<dyn CalendarRegistry>,
}

impl CalendarDirectory {
    pub fn new(api: Arc<dyn CalendarApi>, registry: Arc<dyn CalendarRegistry>) -> Self {
        Self { api, registry }
    }

    /// Pulls every page of the remote directory and upserts the registry.
    ///
    /// New calendars get the next free palette color and start enabled only
    /// if writable. Known calendars keep their color, enabled flag and sync
    /// state. Calendars missing from the remote listing are left in place.
    #[instrument(skip_all)]
    pub async fn refresh(&self, token: &str) -> SyncResult<DirectoryReport> {
        let mut remote = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let page = self
                .api
                .list_calendars(token, page_token.as_deref())
                .await?;
            debug!(count = page.calendars.len(), "fetched calendar page");
            remote.extend(page.calendars);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        let mut report = DirectoryReport {
            total: remote.len(),
            ..DirectoryReport::default()
        };
        let mut taken: Vec<EventColor> = self.registry.list()?.iter().map(|c| c.color).collect();

        for calendar in remote {
            match self.registry.get(&calendar.id)? {
                Some(existing) => {
                    if let Some(changed) = refreshed(&existing, &calendar) {
                        self.registry.upsert(changed)?;
                        report.updated.push(calendar.id);
                    }
                }
                None => {
                    let color = EventColor::next_available(&taken);
                    taken.push(color);
                    let can_write = calendar.access_role.can_write();
                    info!(
                        calendar_id = %calendar.id,
                        name = %calendar.name,
                        %color,
                        can_write,
                        "discovered calendar"
                    );
                    self.registry.upsert(CalendarRecord::discovered(
                        calendar.id.clone(),
                        calendar.name,
                        color,
                        can_write,
                    ))?;
                    report.discovered.push(calendar.id);
                }
            }
        }

        Ok(report)
    }
}

fn refreshed(existing: &CalendarRecord, remote: &RemoteCalendar) -> Option<CalendarRecord> {
    let can_write = remote.access_role.can_write();
    if existing.name == remote.name && existing.can_write == can_write {
        return None;
    }
    Some(CalendarRecord {
        name: remote.name.clone(),
        can_write,
        ..existing.clone()
    })
}
