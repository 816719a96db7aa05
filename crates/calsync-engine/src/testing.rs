//! In-process fake of the remote calendar service, plus token fixtures.
//!
//! Every mutation bumps a change sequence. Cursors are `seq:<n>` and return
//! everything changed after `n`, cancelled items included.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use calsync_providers::google::{RefreshedToken, TokenInfo, TokenManager, TokenRefresher, TokenStorage};
use calsync_providers::{
    AccessRole, BoxFuture, CalendarApi, CalendarPage, DeleteOutcome, EventDraft, EventPage,
    EventPageRequest, EventQuery, ProviderError, ProviderResult, RemoteCalendar, RemoteEvent,
    RemoteEventTime,
};
use chrono::{DateTime, Utc};

struct StoredEvent {
    event: RemoteEvent,
    changed_at_seq: u64,
}

#[derive(Default)]
struct FakeState {
    calendars: Vec<RemoteCalendar>,
    events: HashMap<String, Vec<StoredEvent>>,
    seq: u64,
    next_id: u64,
    oldest_valid_cursor: u64,
    /// One-shot: invalidate cursors when an incremental pull reaches this page.
    expire_on_page: Option<usize>,
    calendar_failure: Option<u16>,
    list_failures: HashMap<String, u16>,
    delete_failures: HashSet<String>,
    calendar_list_calls: usize,
    event_list_queries: Vec<(String, EventQuery)>,
    creates: Vec<(String, EventDraft)>,
    patches: Vec<(String, String, EventDraft)>,
    deletes: Vec<(String, String)>,
}

impl FakeState {
    fn bump(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn next_etag(&mut self) -> String {
        self.next_id += 1;
        format!("\"etag-{}\"", self.next_id)
    }

    fn find_mut(&mut self, calendar_id: &str, event_id: &str) -> Option<&mut StoredEvent> {
        self.events
            .get_mut(calendar_id)?
            .iter_mut()
            .find(|s| s.event.id == event_id)
    }
}

type WriteHook = Box<dyn FnOnce() + Send>;

pub(crate) struct FakeCalendarApi {
    state: Mutex<FakeState>,
    after_write: Mutex<Option<WriteHook>>,
    calendar_page_size: usize,
    event_page_size: usize,
}

impl FakeCalendarApi {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            after_write: Mutex::new(None),
            calendar_page_size: 100,
            event_page_size: 100,
        }
    }

    pub(crate) fn with_calendar_page_size(mut self, size: usize) -> Self {
        self.calendar_page_size = size;
        self
    }

    pub(crate) fn with_event_page_size(mut self, size: usize) -> Self {
        self.event_page_size = size;
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn add_calendar(&self, id: &str, name: &str, role: AccessRole) {
        self.lock().calendars.push(RemoteCalendar {
            id: id.to_string(),
            name: name.to_string(),
            access_role: role,
            primary: false,
        });
    }

    pub(crate) fn rename_calendar(&self, id: &str, name: &str, role: AccessRole) {
        let mut state = self.lock();
        let calendar = state.calendars.iter_mut().find(|c| c.id == id).unwrap();
        calendar.name = name.to_string();
        calendar.access_role = role;
    }

    pub(crate) fn remove_calendar(&self, id: &str) {
        self.lock().calendars.retain(|c| c.id != id);
    }

    /// Adds an item as if another client had created it.
    pub(crate) fn insert_remote(
        &self,
        calendar_id: &str,
        summary: &str,
        start: RemoteEventTime,
        end: RemoteEventTime,
        updated: DateTime<Utc>,
    ) -> RemoteEvent {
        let mut state = self.lock();
        let seq = state.bump();
        let etag = state.next_etag();
        let event = RemoteEvent {
            id: format!("remote-{}", state.next_id),
            cancelled: false,
            summary: summary.to_string(),
            start: Some(start),
            end: Some(end),
            updated: Some(updated),
            etag: Some(etag),
        };
        state
            .events
            .entry(calendar_id.to_string())
            .or_default()
            .push(StoredEvent {
                event: event.clone(),
                changed_at_seq: seq,
            });
        event
    }

    /// Edits an item as if another client had changed it.
    pub(crate) fn edit_remote(
        &self,
        calendar_id: &str,
        event_id: &str,
        summary: &str,
        start: RemoteEventTime,
        end: RemoteEventTime,
        updated: DateTime<Utc>,
    ) {
        let mut state = self.lock();
        let seq = state.bump();
        let etag = state.next_etag();
        let stored = state.find_mut(calendar_id, event_id).unwrap();
        stored.event.summary = summary.to_string();
        stored.event.start = Some(start);
        stored.event.end = Some(end);
        stored.event.updated = Some(updated);
        stored.event.etag = Some(etag);
        stored.changed_at_seq = seq;
    }

    /// Cancels an item as if another client had deleted it.
    pub(crate) fn cancel_remote(&self, calendar_id: &str, event_id: &str) {
        let mut state = self.lock();
        let seq = state.bump();
        let stored = state.find_mut(calendar_id, event_id).unwrap();
        stored.event.cancelled = true;
        stored.changed_at_seq = seq;
    }

    /// Removes an item without leaving a trace in the change feed.
    pub(crate) fn purge_remote(&self, calendar_id: &str, event_id: &str) {
        if let Some(events) = self.lock().events.get_mut(calendar_id) {
            events.retain(|s| s.event.id != event_id);
        }
    }

    pub(crate) fn remote_event(&self, calendar_id: &str, event_id: &str) -> Option<RemoteEvent> {
        self.lock()
            .events
            .get(calendar_id)?
            .iter()
            .find(|s| s.event.id == event_id)
            .map(|s| s.event.clone())
    }

    /// Non-cancelled items in `calendar_id`.
    pub(crate) fn active_events(&self, calendar_id: &str) -> Vec<RemoteEvent> {
        self.lock()
            .events
            .get(calendar_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|s| !s.event.cancelled)
                    .map(|s| s.event.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Invalidates every cursor handed out so far.
    pub(crate) fn expire_cursors(&self) {
        let mut state = self.lock();
        state.oldest_valid_cursor = state.seq + 1;
    }

    /// Invalidates every cursor once an incremental pull asks for `page`
    /// (1-based), so the pull fails part way through.
    pub(crate) fn expire_cursors_on_page(&self, page: usize) {
        self.lock().expire_on_page = Some(page);
    }

    /// Runs `hook` once, right after the next create or patch is stored,
    /// before the engine sees the response.
    pub(crate) fn after_next_write(&self, hook: impl FnOnce() + Send + 'static) {
        *self.after_write.lock().unwrap() = Some(Box::new(hook));
    }

    fn run_write_hook(&self) {
        let hook = self.after_write.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    pub(crate) fn fail_calendar_list(&self, status: Option<u16>) {
        self.lock().calendar_failure = status;
    }

    pub(crate) fn fail_event_list(&self, calendar_id: &str, status: u16) {
        self.lock()
            .list_failures
            .insert(calendar_id.to_string(), status);
    }

    pub(crate) fn fail_deletes_of(&self, event_id: &str) {
        self.lock().delete_failures.insert(event_id.to_string());
    }

    pub(crate) fn allow_deletes_of(&self, event_id: &str) {
        self.lock().delete_failures.remove(event_id);
    }

    pub(crate) fn calendar_list_calls(&self) -> usize {
        self.lock().calendar_list_calls
    }

    pub(crate) fn event_queries(&self, calendar_id: &str) -> Vec<EventQuery> {
        self.lock()
            .event_list_queries
            .iter()
            .filter(|(cal, _)| cal == calendar_id)
            .map(|(_, q)| q.clone())
            .collect()
    }

    pub(crate) fn creates(&self) -> Vec<(String, EventDraft)> {
        self.lock().creates.clone()
    }

    pub(crate) fn patches(&self) -> Vec<(String, String, EventDraft)> {
        self.lock().patches.clone()
    }

    pub(crate) fn deletes(&self) -> Vec<(String, String)> {
        self.lock().deletes.clone()
    }

    pub(crate) fn reset_counters(&self) {
        let mut state = self.lock();
        state.calendar_list_calls = 0;
        state.event_list_queries.clear();
        state.creates.clear();
        state.patches.clear();
        state.deletes.clear();
    }

    fn select(&self, state: &FakeState, calendar_id: &str, query: &EventQuery) -> ProviderResult<Vec<RemoteEvent>> {
        let stored = state.events.get(calendar_id);
        let iter = stored.into_iter().flatten();
        match query {
            EventQuery::Incremental { sync_token } => {
                let since: u64 = sync_token
                    .strip_prefix("seq:")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(|| ProviderError::from_status(400, "bad sync token"))?;
                if since < state.oldest_valid_cursor {
                    return Err(ProviderError::from_status(410, "Sync token is no longer valid"));
                }
                Ok(iter
                    .filter(|s| s.changed_at_seq > since)
                    .map(|s| s.event.clone())
                    .collect())
            }
            EventQuery::Window { time_min, time_max } => {
                let (min, max) = (time_min.date_naive(), time_max.date_naive());
                Ok(iter
                    .filter(|s| !s.event.cancelled)
                    .filter(|s| {
                        s.event
                            .start
                            .map(|start| start.local_date(*time_min.offset()))
                            .is_some_and(|d| min <= d && d < max)
                    })
                    .map(|s| s.event.clone())
                    .collect())
            }
        }
    }
}

impl CalendarApi for FakeCalendarApi {
    fn list_calendars<'a>(
        &'a self,
        _token: &'a str,
        page_token: Option<&'a str>,
    ) -> BoxFuture<'a, ProviderResult<CalendarPage>> {
        let result = (|| {
            let mut state = self.lock();
            state.calendar_list_calls += 1;
            if let Some(status) = state.calendar_failure {
                return Err(ProviderError::from_status(status, "calendar list failed"));
            }
            let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
            let end = (offset + self.calendar_page_size).min(state.calendars.len());
            Ok(CalendarPage {
                calendars: state.calendars[offset..end].to_vec(),
                next_page_token: (end < state.calendars.len()).then(|| end.to_string()),
            })
        })();
        Box::pin(async move { result })
    }

    fn list_events<'a>(
        &'a self,
        _token: &'a str,
        calendar_id: &'a str,
        request: &'a EventPageRequest,
    ) -> BoxFuture<'a, ProviderResult<EventPage>> {
        let result = (|| {
            let mut state = self.lock();
            state
                .event_list_queries
                .push((calendar_id.to_string(), request.query.clone()));
            if let Some(status) = state.list_failures.get(calendar_id) {
                return Err(ProviderError::from_status(*status, "event list failed"));
            }
            let offset: usize = request
                .page_token
                .as_deref()
                .and_then(|t| t.parse().ok())
                .unwrap_or(0);
            if request.query.is_incremental()
                && state.expire_on_page == Some(offset / self.event_page_size + 1)
            {
                state.expire_on_page = None;
                state.oldest_valid_cursor = state.seq + 1;
            }
            let items = self.select(&state, calendar_id, &request.query)?;
            let end = (offset + self.event_page_size).min(items.len());
            let last = end >= items.len();
            Ok(EventPage {
                items: items[offset.min(end)..end].to_vec(),
                next_page_token: (!last).then(|| end.to_string()),
                next_sync_token: last.then(|| format!("seq:{}", state.seq)),
            })
        })();
        Box::pin(async move { result })
    }

    fn create_event<'a>(
        &'a self,
        _token: &'a str,
        calendar_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        let result: ProviderResult<RemoteEvent> = {
            let mut state = self.lock();
            state.creates.push((calendar_id.to_string(), draft.clone()));
            let seq = state.bump();
            let etag = state.next_etag();
            let event = RemoteEvent {
                id: format!("remote-{}", state.next_id),
                cancelled: false,
                summary: draft.summary.clone(),
                start: Some(draft.start),
                end: Some(draft.end),
                updated: Some(Utc::now()),
                etag: Some(etag),
            };
            state
                .events
                .entry(calendar_id.to_string())
                .or_default()
                .push(StoredEvent {
                    event: event.clone(),
                    changed_at_seq: seq,
                });
            Ok(event)
        };
        self.run_write_hook();
        Box::pin(async move { result })
    }

    fn patch_event<'a>(
        &'a self,
        _token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
        draft: &'a EventDraft,
    ) -> BoxFuture<'a, ProviderResult<RemoteEvent>> {
        let result = (|| {
            let mut state = self.lock();
            state
                .patches
                .push((calendar_id.to_string(), event_id.to_string(), draft.clone()));
            let seq = state.bump();
            let etag = state.next_etag();
            let stored = match state.find_mut(calendar_id, event_id) {
                Some(stored) if !stored.event.cancelled => stored,
                _ => return Err(ProviderError::from_status(404, "Not Found")),
            };
            stored.event.summary = draft.summary.clone();
            stored.event.start = Some(draft.start);
            stored.event.end = Some(draft.end);
            stored.event.updated = Some(Utc::now());
            stored.event.etag = Some(etag);
            stored.changed_at_seq = seq;
            Ok(stored.event.clone())
        })();
        self.run_write_hook();
        Box::pin(async move { result })
    }

    fn delete_event<'a>(
        &'a self,
        _token: &'a str,
        calendar_id: &'a str,
        event_id: &'a str,
    ) -> BoxFuture<'a, ProviderResult<DeleteOutcome>> {
        let result = (|| {
            let mut state = self.lock();
            state
                .deletes
                .push((calendar_id.to_string(), event_id.to_string()));
            if state.delete_failures.contains(event_id) {
                return Err(ProviderError::from_status(503, "Backend Error"));
            }
            let seq = state.bump();
            match state.find_mut(calendar_id, event_id) {
                Some(stored) if !stored.event.cancelled => {
                    stored.event.cancelled = true;
                    stored.changed_at_seq = seq;
                    Ok(DeleteOutcome::Deleted)
                }
                _ => Ok(DeleteOutcome::AlreadyGone),
            }
        })();
        Box::pin(async move { result })
    }
}

struct UnusedRefresher;

impl TokenRefresher for UnusedRefresher {
    fn refresh<'a>(&'a self, _refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(async { Err(ProviderError::refresh_failed("refresh not expected in tests")) })
    }
}

/// A token manager holding a valid access token for the next hour.
pub(crate) fn connected_tokens(dir: &tempfile::TempDir) -> Arc<TokenManager> {
    let storage = TokenStorage::new(dir.path().join("tokens.json"));
    storage
        .set(TokenInfo::issued_at(
            Utc::now(),
            "access",
            Some("refresh".into()),
            Some(3600),
            vec![],
        ))
        .unwrap();
    Arc::new(TokenManager::new(storage, Arc::new(UnusedRefresher)))
}

/// A token manager with nothing stored.
pub(crate) fn disconnected_tokens(dir: &tempfile::TempDir) -> Arc<TokenManager> {
    let storage = TokenStorage::new(dir.path().join("tokens.json"));
    Arc::new(TokenManager::new(storage, Arc::new(UnusedRefresher)))
}
