//! JSON-file store implementing all three local interfaces.
//!
//! The whole store is one document held behind a mutex. A mutation reloads
//! the document under an exclusive `<path>.lock`, applies the change to a
//! copy, writes it to `<path>.tmp`, renames it over `<path>`, and only then
//! swaps it into memory, so a failed write leaves both disk and memory
//! untouched.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use calsync_core::{CalendarEvent, CalendarRecord, DeletionTombstone, EventPatch};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::{CalendarRegistry, EventRepository, TombstoneStore};
use crate::error::{StoreError, StoreResult};

const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoreDocument {
    version: u32,
    /// Kept in discovery order.
    #[serde(default)]
    calendars: Vec<CalendarRecord>,
    #[serde(default)]
    events: BTreeMap<String, CalendarEvent>,
    #[serde(default)]
    tombstones: Vec<DeletionTombstone>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            calendars: Vec::new(),
            events: BTreeMap::new(),
            tombstones: Vec::new(),
        }
    }
}

impl StoreDocument {
    fn calendar_mut(&mut self, id: &str) -> StoreResult<&mut CalendarRecord> {
        self.calendars
            .iter_mut()
            .find(|c| c.remote_calendar_id == id)
            .ok_or_else(|| StoreError::CalendarNotFound(id.to_string()))
    }

    fn check_link(&self, event: &CalendarEvent) -> StoreResult<()> {
        if let Some(calendar_id) = event.remote_calendar_id()
            && !self.calendars.iter().any(|c| c.remote_calendar_id == calendar_id)
        {
            return Err(StoreError::UnknownCalendar {
                event_id: event.id.clone(),
                calendar_id: calendar_id.to_string(),
            });
        }
        Ok(())
    }
}

/// File-backed (or purely in-memory) local store.
///
/// Several handles (or processes) may share one file. Every access takes an
/// advisory lock on `<path>.lock` and reloads the document from disk first,
/// so a handle never writes back a stale copy over another's changes.
#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    doc: Mutex<StoreDocument>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let doc = match load_document(&path)? {
            Some(doc) => {
                info!(
                    path = %path.display(),
                    calendars = doc.calendars.len(),
                    events = doc.events.len(),
                    tombstones = doc.tombstones.len(),
                    "opened store"
                );
                doc
            }
            None => {
                debug!(path = %path.display(), "no store file yet, starting empty");
                StoreDocument::default()
            }
        };

        Ok(Self {
            path: Some(path),
            doc: Mutex::new(doc),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            doc: Mutex::new(StoreDocument::default()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, StoreDocument> {
        self.doc.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn read<T>(&self, f: impl FnOnce(&StoreDocument) -> T) -> StoreResult<T> {
        let mut guard = self.lock();
        if let Some(path) = &self.path
            && path.exists()
        {
            let _shared = FileLock::acquire(path, false)?;
            if let Some(doc) = load_document(path)? {
                *guard = doc;
            }
        }
        Ok(f(&guard))
    }

    fn mutate<T>(&self, f: impl FnOnce(&mut StoreDocument) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.lock();
        let _exclusive = match &self.path {
            Some(path) => {
                create_parent(path)?;
                let lock = FileLock::acquire(path, true)?;
                if let Some(doc) = load_document(path)? {
                    *guard = doc;
                }
                Some(lock)
            }
            None => None,
        };

        let mut next = guard.clone();
        let out = f(&mut next)?;
        self.flush(&next)?;
        *guard = next;
        Ok(out)
    }

    fn flush(&self, doc: &StoreDocument) -> StoreResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let temp_path = path.with_extension("json.tmp");
        let content = serde_json::to_vec_pretty(doc)?;
        fs::write(&temp_path, content).map_err(|e| StoreError::io(&temp_path, e))?;
        fs::rename(&temp_path, path).map_err(|e| StoreError::io(path, e))?;
        trace!(path = %path.display(), "flushed store");
        Ok(())
    }
}

/// Reads and validates the document at `path`; `None` when there is no file.
fn load_document(path: &Path) -> StoreResult<Option<StoreDocument>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let doc: StoreDocument = serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if doc.version != FORMAT_VERSION {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            message: format!("unsupported format version {}", doc.version),
        });
    }
    Ok(Some(doc))
}

fn create_parent(path: &Path) -> StoreResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }
    Ok(())
}

/// Advisory lock on the file next to the store; released on drop.
struct FileLock {
    _file: File,
}

impl FileLock {
    fn acquire(store_path: &Path, exclusive: bool) -> StoreResult<Self> {
        let mut name = store_path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| StoreError::io(&lock_path, e))?;
        let locked = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        locked.map_err(|e| StoreError::io(&lock_path, e))?;
        Ok(Self { _file: file })
    }
}

impl EventRepository for FileStore {
    fn find_by_remote_id(
        &self,
        calendar_id: &str,
        remote_event_id: &str,
    ) -> StoreResult<Option<CalendarEvent>> {
        self.read(|doc| {
            doc.events
                .values()
                .find(|e| {
                    e.remote_calendar_id() == Some(calendar_id)
                        && e.remote_event_id() == Some(remote_event_id)
                })
                .cloned()
        })
    }

    fn find_updated_after(
        &self,
        calendar_id: &str,
        after: DateTime<Utc>,
    ) -> StoreResult<Vec<CalendarEvent>> {
        self.read(|doc| {
            doc.events
                .values()
                .filter(|e| e.remote_calendar_id() == Some(calendar_id) && e.updated_at > after)
                .cloned()
                .collect()
        })
    }

    fn find_missing_remote_link(&self) -> StoreResult<Vec<CalendarEvent>> {
        self.read(|doc| {
            doc.events
                .values()
                .filter(|e| !e.is_remote_linked())
                .cloned()
                .collect()
        })
    }

    fn get(&self, id: &str) -> StoreResult<Option<CalendarEvent>> {
        self.read(|doc| doc.events.get(id).cloned())
    }

    fn list(&self) -> StoreResult<Vec<CalendarEvent>> {
        let mut events: Vec<_> = self.read(|doc| doc.events.values().cloned().collect())?;
        events.sort_by(|a, b| {
            (a.date, a.start_minute, &a.title).cmp(&(b.date, b.start_minute, &b.title))
        });
        Ok(events)
    }

    fn insert(&self, event: CalendarEvent) -> StoreResult<()> {
        event.validate()?;
        self.mutate(|doc| {
            if doc.events.contains_key(&event.id) {
                return Err(StoreError::DuplicateEvent(event.id.clone()));
            }
            doc.check_link(&event)?;
            debug!(event_id = %event.id, date = %event.date, "inserted event");
            doc.events.insert(event.id.clone(), event);
            Ok(())
        })
    }

    fn update(&self, id: &str, patch: &EventPatch) -> StoreResult<CalendarEvent> {
        self.mutate(|doc| {
            let mut event = doc
                .events
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::EventNotFound(id.to_string()))?;
            patch.apply(&mut event)?;
            doc.check_link(&event)?;
            doc.events.insert(event.id.clone(), event.clone());
            Ok(event)
        })
    }

    fn delete(&self, id: &str) -> StoreResult<Option<CalendarEvent>> {
        if !self.read(|doc| doc.events.contains_key(id))? {
            return Ok(None);
        }
        self.mutate(|doc| Ok(doc.events.remove(id)))
    }
}

impl CalendarRegistry for FileStore {
    fn list(&self) -> StoreResult<Vec<CalendarRecord>> {
        self.read(|doc| doc.calendars.clone())
    }

    fn get(&self, remote_calendar_id: &str) -> StoreResult<Option<CalendarRecord>> {
        self.read(|doc| {
            doc.calendars
                .iter()
                .find(|c| c.remote_calendar_id == remote_calendar_id)
                .cloned()
        })
    }

    fn upsert(&self, record: CalendarRecord) -> StoreResult<()> {
        self.mutate(|doc| {
            match doc
                .calendars
                .iter_mut()
                .find(|c| c.remote_calendar_id == record.remote_calendar_id)
            {
                Some(existing) => *existing = record,
                None => doc.calendars.push(record),
            }
            Ok(())
        })
    }

    fn set_enabled(&self, remote_calendar_id: &str, enabled: bool) -> StoreResult<()> {
        self.mutate(|doc| {
            doc.calendar_mut(remote_calendar_id)?.enabled = enabled;
            Ok(())
        })
    }

    fn update_sync_state(
        &self,
        remote_calendar_id: &str,
        cursor: Option<String>,
        last_sync_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.mutate(|doc| {
            let calendar = doc.calendar_mut(remote_calendar_id)?;
            calendar.sync_cursor = cursor;
            calendar.last_sync_at = Some(last_sync_at);
            Ok(())
        })
    }
}

impl TombstoneStore for FileStore {
    fn record(&self, tombstone: DeletionTombstone) -> StoreResult<()> {
        self.mutate(|doc| {
            match doc.tombstones.iter_mut().find(|t| t.key() == tombstone.key()) {
                Some(existing) => existing.deleted_at = tombstone.deleted_at,
                None => doc.tombstones.push(tombstone),
            }
            Ok(())
        })
    }

    fn list(&self, calendar_id: &str) -> StoreResult<Vec<DeletionTombstone>> {
        self.read(|doc| {
            doc.tombstones
                .iter()
                .filter(|t| t.calendar_id == calendar_id)
                .cloned()
                .collect()
        })
    }

    fn contains(&self, calendar_id: &str, event_id: &str) -> StoreResult<bool> {
        self.read(|doc| {
            doc.tombstones
                .iter()
                .any(|t| t.key() == (calendar_id, event_id))
        })
    }

    fn clear(&self, calendar_id: &str, event_id: &str) -> StoreResult<bool> {
        if !TombstoneStore::contains(self, calendar_id, event_id)? {
            return Ok(false);
        }
        self.mutate(|doc| {
            doc.tombstones.retain(|t| t.key() != (calendar_id, event_id));
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use calsync_core::{EventColor, RemoteLink};
    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, hour, 0, 0).unwrap()
    }

    fn work() -> CalendarRecord {
        CalendarRecord::discovered("work", "Work", EventColor::Blue, true)
    }

    fn linked(id: &str, remote_id: &str) -> CalendarEvent {
        let mut event = CalendarEvent::new(date(2026, 6, 1), "Standup", EventColor::Blue)
            .with_remote(RemoteLink::new("work", remote_id, Some("\"1\"".into())))
            .with_updated_at(t(9));
        event.id = id.to_string();
        event
    }

    mod events {
        use super::*;

        #[test]
        fn insert_requires_known_calendar() {
            let store = FileStore::in_memory();
            let err = store.insert(linked("a", "r1")).unwrap_err();
            assert!(matches!(err, StoreError::UnknownCalendar { .. }));

            store.upsert(work()).unwrap();
            store.insert(linked("a", "r1")).unwrap();
            assert!(EventRepository::get(&store, "a").unwrap().is_some());
        }

        #[test]
        fn duplicate_ids_are_rejected() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store.insert(linked("a", "r1")).unwrap();
            assert!(matches!(
                store.insert(linked("a", "r2")),
                Err(StoreError::DuplicateEvent(_))
            ));
        }

        #[test]
        fn insert_validates_times() {
            let store = FileStore::in_memory();
            let mut event = CalendarEvent::new(date(2026, 6, 1), "Bad", EventColor::Red);
            event.start_minute = Some(600);
            event.end_minute = Some(540);
            assert!(matches!(store.insert(event), Err(StoreError::Invalid(_))));
        }

        #[test]
        fn lookups() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store.insert(linked("a", "r1")).unwrap();
            let mut newer = linked("b", "r2");
            newer.updated_at = t(11);
            store.insert(newer).unwrap();
            let local = CalendarEvent::new(date(2026, 6, 2), "Local", EventColor::Blue);
            let local_id = local.id.clone();
            store.insert(local).unwrap();

            assert_eq!(store.find_by_remote_id("work", "r2").unwrap().unwrap().id, "b");
            assert!(store.find_by_remote_id("home", "r2").unwrap().is_none());

            let updated: Vec<_> = store
                .find_updated_after("work", t(9))
                .unwrap()
                .into_iter()
                .map(|e| e.id)
                .collect();
            assert_eq!(updated, vec!["b".to_string()]);

            let missing = store.find_missing_remote_link().unwrap();
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].id, local_id);
        }

        #[test]
        fn update_applies_patch() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store.insert(linked("a", "r1")).unwrap();

            let patch = EventPatch {
                title: Some("Retro".into()),
                start_minute: Some(Some(600)),
                ..EventPatch::default()
            };
            let updated = store.update("a", &patch).unwrap();
            assert_eq!(updated.title, "Retro");
            assert_eq!(EventRepository::get(&store, "a").unwrap().unwrap().start_minute, Some(600));

            assert!(matches!(
                store.update("missing", &patch),
                Err(StoreError::EventNotFound(_))
            ));
        }

        #[test]
        fn failed_update_leaves_event_untouched() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store.insert(linked("a", "r1")).unwrap();
            let bad = EventPatch {
                remote: Some(Some(RemoteLink::new("nowhere", "x", None))),
                ..EventPatch::default()
            };
            assert!(store.update("a", &bad).is_err());
            assert_eq!(EventRepository::get(&store, "a").unwrap().unwrap().remote_calendar_id(), Some("work"));
        }

        #[test]
        fn delete_returns_removed_event() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store.insert(linked("a", "r1")).unwrap();
            assert_eq!(store.delete("a").unwrap().unwrap().id, "a");
            assert!(store.delete("a").unwrap().is_none());
        }

        #[test]
        fn list_is_chronological() {
            let store = FileStore::in_memory();
            let late = CalendarEvent::new(date(2026, 6, 2), "Late", EventColor::Red);
            let timed = CalendarEvent::new(date(2026, 6, 1), "Timed", EventColor::Red)
                .with_times(Some(540), None)
                .unwrap();
            let all_day = CalendarEvent::new(date(2026, 6, 1), "All day", EventColor::Red);
            store.insert(late).unwrap();
            store.insert(timed).unwrap();
            store.insert(all_day).unwrap();
            let titles: Vec<_> = EventRepository::list(&store)
                .unwrap()
                .into_iter()
                .map(|e| e.title)
                .collect();
            assert_eq!(titles, vec!["All day", "Timed", "Late"]);
        }
    }

    mod calendars {
        use super::*;

        #[test]
        fn upsert_keeps_order_and_replaces() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store
                .upsert(CalendarRecord::discovered("home", "Home", EventColor::Green, true))
                .unwrap();
            let mut renamed = work();
            renamed.name = "Office".into();
            store.upsert(renamed).unwrap();

            let all = CalendarRegistry::list(&store).unwrap();
            assert_eq!(all.len(), 2);
            assert_eq!(all[0].name, "Office");
            assert_eq!(all[1].remote_calendar_id, "home");
        }

        #[test]
        fn sync_state_and_enabled() {
            let store = FileStore::in_memory();
            store.upsert(work()).unwrap();
            store.update_sync_state("work", Some("c1".into()), t(10)).unwrap();
            store.set_enabled("work", false).unwrap();

            let record = CalendarRegistry::get(&store, "work").unwrap().unwrap();
            assert_eq!(record.sync_cursor.as_deref(), Some("c1"));
            assert_eq!(record.last_sync_at, Some(t(10)));
            assert!(!record.enabled);

            assert!(matches!(
                store.set_enabled("missing", true),
                Err(StoreError::CalendarNotFound(_))
            ));
        }
    }

    mod tombstones {
        use super::*;

        #[test]
        fn one_tombstone_per_pair() {
            let store = FileStore::in_memory();
            store.record(DeletionTombstone::new("work", "r1", t(9))).unwrap();
            store.record(DeletionTombstone::new("work", "r1", t(10))).unwrap();
            store.record(DeletionTombstone::new("work", "r1", t(8))).unwrap();
            store.record(DeletionTombstone::new("home", "r1", t(9))).unwrap();

            let work = TombstoneStore::list(&store, "work").unwrap();
            assert_eq!(work.len(), 1);
            assert_eq!(work[0].deleted_at, t(8));
            assert!(store.contains("home", "r1").unwrap());
        }

        #[test]
        fn clear() {
            let store = FileStore::in_memory();
            store.record(DeletionTombstone::new("work", "r1", t(9))).unwrap();
            assert!(store.clear("work", "r1").unwrap());
            assert!(!store.clear("work", "r1").unwrap());
            assert!(TombstoneStore::list(&store, "work").unwrap().is_empty());
        }
    }

    mod persistence {
        use super::*;

        #[test]
        fn survives_reopen() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("nested").join("store.json");
            {
                let store = FileStore::open(&path).unwrap();
                store.upsert(work()).unwrap();
                store.insert(linked("a", "r1")).unwrap();
                store.record(DeletionTombstone::new("work", "r9", t(9))).unwrap();
                store
                    .update_sync_state("work", Some("cursor".into()), t(12))
                    .unwrap();
            }

            let store = FileStore::open(&path).unwrap();
            assert_eq!(EventRepository::get(&store, "a").unwrap().unwrap().title, "Standup");
            assert_eq!(TombstoneStore::list(&store, "work").unwrap().len(), 1);
            let record = CalendarRegistry::get(&store, "work").unwrap().unwrap();
            assert_eq!(record.sync_cursor.as_deref(), Some("cursor"));
            assert!(!path.with_extension("json.tmp").exists());
        }

        #[test]
        fn second_handle_does_not_overwrite_changes() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            let first = FileStore::open(&path).unwrap();
            first.upsert(work()).unwrap();
            let second = FileStore::open(&path).unwrap();

            second.insert(linked("a", "r1")).unwrap();
            first
                .update_sync_state("work", Some("cursor".into()), t(12))
                .unwrap();
            second.record(DeletionTombstone::new("work", "r9", t(9))).unwrap();

            assert!(EventRepository::get(&first, "a").unwrap().is_some());
            assert!(TombstoneStore::contains(&first, "work", "r9").unwrap());

            let reopened = FileStore::open(&path).unwrap();
            assert!(EventRepository::get(&reopened, "a").unwrap().is_some());
            assert!(TombstoneStore::contains(&reopened, "work", "r9").unwrap());
            let record = CalendarRegistry::get(&reopened, "work").unwrap().unwrap();
            assert_eq!(record.sync_cursor.as_deref(), Some("cursor"));
        }

        #[test]
        fn concurrent_writers_keep_every_insert() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            FileStore::open(&path).unwrap().upsert(work()).unwrap();

            let writers: Vec<_> = ["x", "y"]
                .into_iter()
                .map(|prefix| {
                    let path = path.clone();
                    std::thread::spawn(move || {
                        let store = FileStore::open(&path).unwrap();
                        for n in 0..20 {
                            store
                                .insert(linked(&format!("{prefix}{n}"), &format!("{prefix}-r{n}")))
                                .unwrap();
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }

            let store = FileStore::open(&path).unwrap();
            assert_eq!(EventRepository::list(&store).unwrap().len(), 40);
        }

        #[test]
        fn corrupt_file_is_reported() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            fs::write(&path, "[]").unwrap();
            assert!(matches!(
                FileStore::open(&path),
                Err(StoreError::Corrupt { .. })
            ));
        }

        #[test]
        fn updated_at_round_trips_exactly() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("store.json");
            let stamp = t(9) + Duration::milliseconds(1);
            {
                let store = FileStore::open(&path).unwrap();
                let event = CalendarEvent::new(date(2026, 6, 1), "x", EventColor::Red)
                    .with_updated_at(stamp);
                store.insert(event).unwrap();
            }
            let store = FileStore::open(&path).unwrap();
            let events = EventRepository::list(&store).unwrap();
            assert_eq!(events[0].updated_at, stamp);
        }
    }
}
