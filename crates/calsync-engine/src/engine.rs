//! The sync engine: one pass per enabled calendar.
//!
//! A pass flushes pending deletions, pulls remote changes (incrementally
//! when a cursor is stored), reconciles each pulled item with its local
//! counterpart, then pushes trailing local edits and local-only events.
//! Calendars are processed one after another and their sync state is
//! persisted as soon as each pass completes.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use calsync_core::{
    CalendarEvent, CalendarRecord, EventPatch, RemoteLink, Resolution, SyncWindow, resolve,
};
use calsync_providers::google::TokenManager;
use calsync_providers::{CalendarApi, EventPageRequest, EventQuery, RemoteEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use crate::config::EngineConfig;
use crate::directory::{CalendarDirectory, DirectoryReport};
use crate::error::{StoreError, SyncError, SyncResult};
use crate::mapping::{draft_for, local_fields};
use crate::store::{CalendarRegistry, EventRepository, TombstoneStore};
use crate::tombstones::DeletionTracker;

/// What a sync run should cover.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ignore stored cursors and pull the whole window.
    pub force_full: bool,
    /// Restrict the run to one calendar.
    pub calendar: Option<String>,
}

/// Outcome of one calendar pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarSyncReport {
    pub calendar_id: String,
    /// Remote items returned by the pull.
    pub pulled: usize,
    pub inserted: usize,
    pub updated_local: usize,
    pub deleted_local: usize,
    pub pushed_updates: usize,
    pub pushed_creates: usize,
    /// Remotely cancelled items brought back because the local copy was newer.
    pub recreated_remote: usize,
    /// Linked events whose remote item vanished; they are pushed again as creates.
    pub unlinked: usize,
    pub tombstones_flushed: usize,
    pub tombstones_retained: usize,
    /// The pull was a full window pull.
    pub full_pull: bool,
    /// The stored cursor was rejected and the pull restarted.
    pub cursor_reset: bool,
    /// Cursor to store for the next pass.
    pub cursor: Option<String>,
    /// Start time of this pass.
    pub last_sync_at: DateTime<Utc>,
}

impl CalendarSyncReport {
    fn new(calendar_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            calendar_id: calendar_id.to_string(),
            pulled: 0,
            inserted: 0,
            updated_local: 0,
            deleted_local: 0,
            pushed_updates: 0,
            pushed_creates: 0,
            recreated_remote: 0,
            unlinked: 0,
            tombstones_flushed: 0,
            tombstones_retained: 0,
            full_pull: false,
            cursor_reset: false,
            cursor: None,
            last_sync_at: started_at,
        }
    }

    /// Number of local and remote writes made by the pass.
    pub fn changes(&self) -> usize {
        self.inserted
            + self.updated_local
            + self.deleted_local
            + self.pushed_updates
            + self.pushed_creates
            + self.recreated_remote
            + self.tombstones_flushed
    }
}

impl fmt::Display for CalendarSyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: pulled {} ({}), +{} ~{} -{} local, pushed {} updates {} creates",
            self.calendar_id,
            self.pulled,
            if self.full_pull { "full" } else { "incremental" },
            self.inserted,
            self.updated_local,
            self.deleted_local,
            self.pushed_updates,
            self.pushed_creates,
        )?;
        if self.recreated_remote > 0 {
            write!(f, ", recreated {}", self.recreated_remote)?;
        }
        if self.tombstones_flushed > 0 || self.tombstones_retained > 0 {
            write!(
                f,
                ", deletions {} sent {} pending",
                self.tombstones_flushed, self.tombstones_retained
            )?;
        }
        if self.cursor_reset {
            f.write_str(", cursor reset")?;
        }
        Ok(())
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// `None` when the run skipped the directory refresh.
    pub directory: Option<DirectoryReport>,
    pub calendars: Vec<CalendarSyncReport>,
}

impl SyncSummary {
    pub fn changes(&self) -> usize {
        self.calendars.iter().map(CalendarSyncReport::changes).sum()
    }
}

struct Pull {
    items: Vec<RemoteEvent>,
    cursor: Option<String>,
    full: bool,
    cursor_reset: bool,
}

/// State threaded through one calendar pass.
struct Pass<'a> {
    token: &'a str,
    calendar: &'a CalendarRecord,
    window: SyncWindow,
    started_at: DateTime<Utc>,
    report: CalendarSyncReport,
    /// Local event ids already handled by reconciliation.
    reconciled: HashSet<String>,
}

impl Pass<'_> {
    fn calendar_id(&self) -> &str {
        &self.calendar.remote_calendar_id
    }

    fn link(&self, remote: &RemoteEvent) -> RemoteLink {
        RemoteLink::new(self.calendar_id(), remote.id.clone(), remote.etag.clone())
    }

    /// Timestamp given to pulled local state, never later than the pass
    /// start so the next pass does not mistake it for a local edit.
    fn pulled_at(&self, remote: &RemoteEvent) -> DateTime<Utc> {
        remote
            .updated
            .map_or(self.started_at, |updated| updated.min(self.started_at))
    }
}

/// Two-way sync between the local store and the remote calendars.
pub struct SyncEngine {
    api: Arc<dyn CalendarApi>,
    tokens: Arc<TokenManager>,
    events: Arc<dyn EventRepository>,
    calendars: Arc<dyn CalendarRegistry>,
    tracker: DeletionTracker,
    directory: CalendarDirectory,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn CalendarApi>,
        tokens: Arc<TokenManager>,
        events: Arc<dyn EventRepository>,
        calendars: Arc<dyn CalendarRegistry>,
        tombstones: Arc<dyn TombstoneStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            directory: CalendarDirectory::new(api.clone(), calendars.clone()),
            tracker: DeletionTracker::new(tombstones),
            api,
            tokens,
            events,
            calendars,
            config,
        }
    }

    /// Builds an engine over one store implementing all three interfaces.
    pub fn with_store<S>(
        api: Arc<dyn CalendarApi>,
        tokens: Arc<TokenManager>,
        store: Arc<S>,
        config: EngineConfig,
    ) -> Self
    where
        S: EventRepository + CalendarRegistry + TombstoneStore + 'static,
    {
        Self::new(api, tokens, store.clone(), store.clone(), store, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Gets a token, refreshes the calendar directory, then syncs.
    ///
    /// Auth failures abort at once. A failed directory refresh or calendar
    /// pass is logged and the run continues; the first such error is
    /// returned once every calendar has been attempted.
    #[instrument(skip(self), fields(force_full = options.force_full))]
    pub async fn run(&self, options: &SyncOptions) -> SyncResult<SyncSummary> {
        let token = self.tokens.ensure_valid_token().await?;

        let mut first_error = None;
        let directory = match self.directory.refresh(&token).await {
            Ok(report) => {
                if !report.discovered.is_empty() {
                    info!(discovered = ?report.discovered, "new calendars found");
                }
                Some(report)
            }
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "calendar directory refresh failed, using known calendars");
                first_error = Some(e);
                None
            }
        };

        let calendars = self.sync_enabled(&token, options, &mut first_error).await?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(SyncSummary {
                directory,
                calendars,
            }),
        }
    }

    /// Syncs every enabled calendar in registry order.
    pub async fn sync_all(
        &self,
        token: &str,
        options: &SyncOptions,
    ) -> SyncResult<Vec<CalendarSyncReport>> {
        let mut first_error = None;
        let reports = self.sync_enabled(token, options, &mut first_error).await?;
        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn sync_enabled(
        &self,
        token: &str,
        options: &SyncOptions,
        first_error: &mut Option<SyncError>,
    ) -> SyncResult<Vec<CalendarSyncReport>> {
        let calendars: Vec<CalendarRecord> = self
            .calendars
            .list()?
            .into_iter()
            .filter(|c| c.enabled)
            .filter(|c| {
                options
                    .calendar
                    .as_deref()
                    .is_none_or(|id| c.remote_calendar_id == id)
            })
            .collect();

        if let Some(id) = &options.calendar
            && calendars.is_empty()
        {
            return Err(SyncError::CalendarUnavailable(id.clone()));
        }

        let mut reports = Vec::with_capacity(calendars.len());
        for calendar in &calendars {
            match self.sync_and_persist(token, calendar, options.force_full).await {
                Ok(report) => {
                    info!(
                        calendar_id = %report.calendar_id,
                        pulled = report.pulled,
                        changes = report.changes(),
                        cursor_reset = report.cursor_reset,
                        "calendar synced"
                    );
                    reports.push(report);
                }
                Err(e) if e.is_fatal() => {
                    error!(calendar_id = %calendar.remote_calendar_id, error = %e, "sync aborted");
                    return Err(e);
                }
                Err(e) => {
                    error!(calendar_id = %calendar.remote_calendar_id, error = %e, "calendar sync failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        Ok(reports)
    }

    async fn sync_and_persist(
        &self,
        token: &str,
        calendar: &CalendarRecord,
        force_full: bool,
    ) -> SyncResult<CalendarSyncReport> {
        let report = self.sync_calendar(token, calendar, force_full).await?;
        self.calendars.update_sync_state(
            &calendar.remote_calendar_id,
            report.cursor.clone(),
            report.last_sync_at,
        )?;
        Ok(report)
    }

    /// Runs one pass over `calendar` and returns the cursor and pass start
    /// time to persist. Does not write the calendar's sync state.
    #[instrument(
        skip(self, token, calendar),
        fields(calendar_id = %calendar.remote_calendar_id, can_write = calendar.can_write)
    )]
    pub async fn sync_calendar(
        &self,
        token: &str,
        calendar: &CalendarRecord,
        force_full: bool,
    ) -> SyncResult<CalendarSyncReport> {
        let started_at = Utc::now();
        let mut pass = Pass {
            token,
            calendar,
            window: SyncWindow::at(started_at, self.config.utc_offset),
            started_at,
            report: CalendarSyncReport::new(&calendar.remote_calendar_id, started_at),
            reconciled: HashSet::new(),
        };

        if calendar.can_write {
            let flushed = self
                .tracker
                .flush(self.api.as_ref(), token, pass.calendar_id())
                .await?;
            pass.report.tombstones_flushed = flushed.cleared;
            pass.report.tombstones_retained = flushed.retained;
        }

        let cursor = if force_full {
            None
        } else {
            calendar.sync_cursor.clone()
        };
        let pull = self.pull(&pass, cursor).await?;
        pass.report.pulled = pull.items.len();
        pass.report.full_pull = pull.full;
        pass.report.cursor_reset = pull.cursor_reset;
        pass.report.cursor = pull.cursor;

        for item in &pull.items {
            self.reconcile(&mut pass, item).await?;
        }

        if calendar.can_write {
            match calendar.last_sync_at {
                Some(last_sync_at) => self.push_local_edits(&mut pass, last_sync_at).await?,
                None => debug!("first pass, no trailing edits to push"),
            }
            self.push_local_creates(&mut pass).await?;
        }

        Ok(pass.report)
    }

    /// Collects every page of changes. A rejected cursor restarts the pull
    /// from the first page of a window query.
    async fn pull(&self, pass: &Pass<'_>, cursor: Option<String>) -> SyncResult<Pull> {
        let offset = self.config.utc_offset;
        let window_query = EventQuery::Window {
            time_min: pass.window.time_min(offset),
            time_max: pass.window.time_max(offset),
        };
        let mut query = match cursor {
            Some(sync_token) => EventQuery::Incremental { sync_token },
            None => window_query.clone(),
        };
        let mut cursor_reset = false;

        'restart: loop {
            let mut items = Vec::new();
            let mut page_token = None;
            loop {
                let request = EventPageRequest {
                    query: query.clone(),
                    page_token: page_token.take(),
                    max_results: self.config.max_results,
                };
                match self
                    .api
                    .list_events(pass.token, pass.calendar_id(), &request)
                    .await
                {
                    Ok(page) => {
                        debug!(items = page.items.len(), "fetched event page");
                        items.extend(page.items);
                        match page.next_page_token {
                            Some(next) => page_token = Some(next),
                            None => {
                                if page.next_sync_token.is_none() {
                                    warn!("pull finished without a sync cursor");
                                }
                                return Ok(Pull {
                                    items,
                                    cursor: page.next_sync_token,
                                    full: !query.is_incremental(),
                                    cursor_reset,
                                });
                            }
                        }
                    }
                    Err(e) if e.is_cursor_expired() && query.is_incremental() => {
                        warn!(fetched = items.len(), "sync cursor expired, restarting with a full pull");
                        cursor_reset = true;
                        query = window_query.clone();
                        continue 'restart;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    async fn reconcile(&self, pass: &mut Pass<'_>, item: &RemoteEvent) -> SyncResult<()> {
        let local = self
            .events
            .find_by_remote_id(pass.calendar_id(), &item.id)?;

        if item.cancelled {
            return self.reconcile_cancelled(pass, item, local).await;
        }

        let offset = self.config.utc_offset;
        let Some(fields) = local_fields(item, offset) else {
            warn!(remote_event_id = %item.id, "remote item has no start, skipping");
            return Ok(());
        };

        if !pass.window.contains(fields.date) {
            if let Some(local) = local {
                debug!(event_id = %local.id, date = %fields.date, "remote item left the sync window");
                self.events.delete(&local.id)?;
                pass.reconciled.insert(local.id);
                pass.report.deleted_local += 1;
            }
            return Ok(());
        }

        let Some(local) = local else {
            if self.tracker.is_pending(pass.calendar_id(), &item.id)? {
                if pass.calendar.can_write {
                    debug!(remote_event_id = %item.id, "local deletion pending, not importing");
                    return Ok(());
                }
                // Never flushed for a read-only calendar, so it would block forever.
                debug!(remote_event_id = %item.id, "dropping deletion queued on read-only calendar");
                self.tracker.clear(pass.calendar_id(), &item.id)?;
            }
            let event = CalendarEvent::new(fields.date, fields.title, pass.calendar.color)
                .with_times(fields.start_minute, fields.end_minute)?
                .with_remote(pass.link(item))
                .with_updated_at(pass.pulled_at(item));
            debug!(event_id = %event.id, remote_event_id = %item.id, "importing remote item");
            pass.reconciled.insert(event.id.clone());
            self.events.insert(event)?;
            pass.report.inserted += 1;
            return Ok(());
        };

        pass.reconciled.insert(local.id.clone());
        match resolution(&local, item, pass.calendar.can_write) {
            Resolution::PushLocal => {
                debug!(event_id = %local.id, "local copy is newer, pushing");
                let draft = draft_for(&local, offset);
                let stored = self
                    .api
                    .patch_event(pass.token, pass.calendar_id(), &item.id, &draft)
                    .await?;
                if self.link_written(pass, &local.id, &stored)? {
                    pass.report.pushed_updates += 1;
                }
            }
            Resolution::PullRemote => {
                let mut patch = fields.diff(&local);
                if local.color != pass.calendar.color {
                    patch.color = Some(pass.calendar.color);
                }
                let content_changed = !patch.is_empty();
                let tag_changed = local
                    .remote
                    .as_ref()
                    .is_none_or(|link| link.version_tag != item.etag);
                if !content_changed && !tag_changed {
                    return Ok(());
                }
                patch.remote = Some(Some(pass.link(item)));
                if content_changed {
                    debug!(event_id = %local.id, "remote copy is newer, pulling");
                    patch.updated_at = Some(pass.pulled_at(item).max(local.updated_at));
                    pass.report.updated_local += 1;
                }
                self.events.update(&local.id, &patch)?;
            }
        }
        Ok(())
    }

    async fn reconcile_cancelled(
        &self,
        pass: &mut Pass<'_>,
        item: &RemoteEvent,
        local: Option<CalendarEvent>,
    ) -> SyncResult<()> {
        if self.tracker.clear(pass.calendar_id(), &item.id)? {
            debug!(remote_event_id = %item.id, "remote deletion confirmed by pull");
        }
        let Some(local) = local else {
            return Ok(());
        };
        pass.reconciled.insert(local.id.clone());

        let resolution = resolution(&local, item, pass.calendar.can_write);
        if resolution == Resolution::PushLocal && pass.window.contains(local.date) {
            info!(event_id = %local.id, "remote item was deleted but local copy is newer, recreating");
            let draft = draft_for(&local, self.config.utc_offset);
            let stored = self
                .api
                .create_event(pass.token, pass.calendar_id(), &draft)
                .await?;
            if self.link_written(pass, &local.id, &stored)? {
                pass.report.recreated_remote += 1;
            }
        } else {
            debug!(event_id = %local.id, "remote item was deleted, removing local copy");
            self.events.delete(&local.id)?;
            pass.report.deleted_local += 1;
        }
        Ok(())
    }

    /// Pushes local edits made since the previous pass that the pull did
    /// not already settle.
    async fn push_local_edits(
        &self,
        pass: &mut Pass<'_>,
        last_sync_at: DateTime<Utc>,
    ) -> SyncResult<()> {
        let edited = self
            .events
            .find_updated_after(pass.calendar_id(), last_sync_at)?;
        for event in edited {
            if pass.reconciled.contains(&event.id) {
                continue;
            }
            let Some(remote_event_id) = event.remote_event_id() else {
                continue;
            };
            let draft = draft_for(&event, self.config.utc_offset);
            match self
                .api
                .patch_event(pass.token, pass.calendar_id(), remote_event_id, &draft)
                .await
            {
                Ok(stored) => {
                    if self.link_written(pass, &event.id, &stored)? {
                        debug!(event_id = %event.id, "pushed local edit");
                        pass.report.pushed_updates += 1;
                    }
                }
                Err(e) if e.is_not_found() => {
                    warn!(event_id = %event.id, remote_event_id, "remote item vanished, unlinking");
                    let unlink = EventPatch {
                        remote: Some(None),
                        ..EventPatch::default()
                    };
                    self.events.update(&event.id, &unlink)?;
                    pass.report.unlinked += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Creates remote items for unlinked local events carrying this
    /// calendar's color.
    async fn push_local_creates(&self, pass: &mut Pass<'_>) -> SyncResult<()> {
        let candidates = self.events.find_missing_remote_link()?;
        for event in candidates {
            if event.color != pass.calendar.color || !pass.window.contains(event.date) {
                continue;
            }
            let draft = draft_for(&event, self.config.utc_offset);
            let stored = self
                .api
                .create_event(pass.token, pass.calendar_id(), &draft)
                .await?;
            if self.link_written(pass, &event.id, &stored)? {
                debug!(event_id = %event.id, remote_event_id = %stored.id, "created remote item");
                pass.report.pushed_creates += 1;
            }
        }
        Ok(())
    }

    /// Links a local event to the remote item just written for it. If the
    /// event was deleted locally while the write was in flight, the remote
    /// item is queued for deletion instead and `false` is returned.
    fn link_written(
        &self,
        pass: &Pass<'_>,
        event_id: &str,
        stored: &RemoteEvent,
    ) -> SyncResult<bool> {
        match self
            .events
            .update(event_id, &EventPatch::link(pass.link(stored)))
        {
            Ok(_) => Ok(true),
            Err(StoreError::EventNotFound(_)) => {
                info!(event_id, remote_event_id = %stored.id, "deleted locally during remote write, queueing remote deletion");
                self.tracker.record(pass.calendar_id(), &stored.id)?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Conflict policy for a linked pair. A remote item without an update
/// time loses nothing by being pulled.
fn resolution(local: &CalendarEvent, remote: &RemoteEvent, can_write: bool) -> Resolution {
    match remote.updated {
        Some(remote_updated) => resolve(local.updated_at, remote_updated, can_write),
        None => Resolution::PullRemote,
    }
}
