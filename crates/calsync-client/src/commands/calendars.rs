//! `calsync calendars`.

use std::fmt::Write;

use calsync_core::CalendarRecord;
use calsync_engine::{CalendarRegistry, FileStore};
use tracing::info;

use crate::commands::open_store;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

pub fn list(config: &ClientConfig, json: bool) -> ClientResult<()> {
    let store = open_store(config)?;
    let calendars = CalendarRegistry::list(&store)?;
    if json {
        let out = serde_json::to_string_pretty(&calendars)
            .map_err(|e| ClientError::Config(format!("failed to encode calendars: {}", e)))?;
        println!("{}", out);
    } else if calendars.is_empty() {
        println!("No calendars yet. Run `calsync sync` to discover them.");
    } else {
        print!("{}", render_calendars(&calendars));
    }
    Ok(())
}

pub fn set_enabled(config: &ClientConfig, id: &str, enabled: bool) -> ClientResult<()> {
    let store = open_store(config)?;
    set_enabled_in(&store, id, enabled)?;
    println!(
        "{} {}",
        if enabled { "Enabled" } else { "Disabled" },
        id
    );
    Ok(())
}

fn set_enabled_in(store: &FileStore, id: &str, enabled: bool) -> ClientResult<()> {
    let calendar = CalendarRegistry::get(store, id)?
        .ok_or_else(|| ClientError::InvalidInput(format!("unknown calendar {}", id)))?;
    if enabled && !calendar.can_write {
        info!(calendar_id = id, "enabling read-only calendar, local edits will not be pushed");
    }
    store.set_enabled(id, enabled)?;
    Ok(())
}

fn render_calendars(calendars: &[CalendarRecord]) -> String {
    let mut out = String::new();
    for calendar in calendars {
        let last_sync = calendar
            .last_sync_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "never".to_string());
        let _ = writeln!(
            out,
            "[{}] {:<7} {}  {}{}  last sync: {}",
            if calendar.enabled { "x" } else { " " },
            calendar.color.as_str(),
            calendar.remote_calendar_id,
            calendar.name,
            if calendar.can_write { "" } else { " (read-only)" },
            last_sync
        );
    }
    out
}
