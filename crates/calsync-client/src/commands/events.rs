//! `calsync events`: local edits that the next sync pushes.

use std::fmt::Write;
use std::sync::Arc;

use calsync_core::{CalendarEvent, CalendarRecord, EventPatch, format_time_of_day, parse_time_of_day};
use calsync_engine::{CalendarRegistry, FileStore, LocalEvents, NewEvent};
use chrono::NaiveDate;

use crate::cli::TimeArgs;
use crate::commands::open_store;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Filters for `events list`.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub calendar: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// Edits requested by `events edit`.
#[derive(Debug, Clone, Default)]
pub struct EventEdit {
    pub date: Option<NaiveDate>,
    pub title: Option<String>,
    pub times: TimeArgs,
    pub all_day: bool,
}

fn local_events(config: &ClientConfig) -> ClientResult<(Arc<FileStore>, LocalEvents)> {
    let store = Arc::new(open_store(config)?);
    Ok((store.clone(), LocalEvents::with_store(store)))
}

pub fn list(config: &ClientConfig, filter: &EventFilter, json: bool) -> ClientResult<()> {
    let (store, local) = local_events(config)?;
    let events = filtered(&store, &local, filter)?;
    if json {
        let out = serde_json::to_string_pretty(&events)
            .map_err(|e| ClientError::Config(format!("failed to encode events: {}", e)))?;
        println!("{}", out);
    } else {
        print!("{}", render_events(&events));
    }
    Ok(())
}

pub fn add(
    config: &ClientConfig,
    date: NaiveDate,
    title: String,
    times: &TimeArgs,
    calendar: &str,
) -> ClientResult<()> {
    let (_, local) = local_events(config)?;
    let event = add_to(&local, date, title, times, calendar)?;
    println!("Created {}", event.id);
    Ok(())
}

pub fn edit(config: &ClientConfig, id: &str, edit: EventEdit) -> ClientResult<()> {
    let (_, local) = local_events(config)?;
    let event = edit_in(&local, id, edit)?;
    print!("{}", render_events(std::slice::from_ref(&event)));
    Ok(())
}

pub fn delete(config: &ClientConfig, id: &str) -> ClientResult<()> {
    let (_, local) = local_events(config)?;
    let event = local
        .delete(id)?
        .ok_or_else(|| ClientError::InvalidInput(format!("unknown event {}", id)))?;
    if event.is_remote_linked() {
        println!("Deleted {}; the remote copy goes on the next sync", id);
    } else {
        println!("Deleted {}", id);
    }
    Ok(())
}

fn parse_times(times: &TimeArgs) -> ClientResult<(Option<u16>, Option<u16>)> {
    let start = times.start.as_deref().map(parse_time_of_day).transpose()?;
    let end = times.end.as_deref().map(parse_time_of_day).transpose()?;
    Ok((start, end))
}

fn add_to(
    local: &LocalEvents,
    date: NaiveDate,
    title: String,
    times: &TimeArgs,
    calendar: &str,
) -> ClientResult<CalendarEvent> {
    if title.trim().is_empty() {
        return Err(ClientError::InvalidInput("title must not be empty".to_string()));
    }
    let (start, end) = parse_times(times)?;
    if end.is_some() && start.is_none() {
        return Err(ClientError::InvalidInput("--end requires --start".to_string()));
    }
    let new = NewEvent::all_day(date, title).with_times(start, end);
    Ok(local.create_in_calendar(calendar, new)?)
}

fn edit_in(local: &LocalEvents, id: &str, edit: EventEdit) -> ClientResult<CalendarEvent> {
    let mut patch = EventPatch {
        date: edit.date,
        title: edit.title,
        ..EventPatch::default()
    };
    if edit.all_day {
        patch.start_minute = Some(None);
        patch.end_minute = Some(None);
    } else {
        let (start, end) = parse_times(&edit.times)?;
        patch.start_minute = start.map(Some);
        patch.end_minute = end.map(Some);
    }
    if patch.is_empty() {
        return Err(ClientError::InvalidInput("nothing to change".to_string()));
    }
    Ok(local.edit(id, &patch)?)
}

/// An event belongs to a calendar when it is linked to it, or when it is
/// unlinked and carries the calendar's color.
fn belongs_to(event: &CalendarEvent, calendar: &CalendarRecord) -> bool {
    match event.remote_calendar_id() {
        Some(id) => id == calendar.remote_calendar_id,
        None => event.color == calendar.color,
    }
}

fn filtered(
    store: &FileStore,
    local: &LocalEvents,
    filter: &EventFilter,
) -> ClientResult<Vec<CalendarEvent>> {
    let calendar = match filter.calendar {
        Some(ref id) => Some(
            CalendarRegistry::get(store, id)?
                .ok_or_else(|| ClientError::InvalidInput(format!("unknown calendar {}", id)))?,
        ),
        None => None,
    };
    Ok(local
        .list()?
        .into_iter()
        .filter(|e| filter.from.is_none_or(|from| e.date >= from))
        .filter(|e| filter.to.is_none_or(|to| e.date <= to))
        .filter(|e| calendar.as_ref().is_none_or(|c| belongs_to(e, c)))
        .collect())
}

fn render_events(events: &[CalendarEvent]) -> String {
    let mut out = String::new();
    for event in events {
        let times = match (event.start_minute, event.end_minute) {
            (None, _) => "all day".to_string(),
            (Some(start), None) => format_time_of_day(start),
            (Some(start), Some(end)) => {
                format!("{}-{}", format_time_of_day(start), format_time_of_day(end))
            }
        };
        let _ = writeln!(
            out,
            "{}  {}  {:<11}  {:<6}  {}{}",
            event.id,
            event.date,
            times,
            event.color.as_str(),
            event.title,
            if event.is_remote_linked() { "" } else { "  (not synced)" }
        );
    }
    out
}
