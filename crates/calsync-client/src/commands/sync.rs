//! `calsync sync`.

use std::fmt::Write;
use std::path::Path;
use std::sync::Arc;

use calsync_engine::{SyncEngine, SyncOptions, SyncSummary};
use calsync_providers::google::GoogleAccount;
use tracing::info;

use crate::commands::open_store;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Refreshes the calendar directory and syncs enabled calendars.
pub async fn run(
    options: SyncOptions,
    config: &ClientConfig,
    config_path: &Path,
    json: bool,
) -> ClientResult<()> {
    let account = GoogleAccount::new(config.google_config(config_path)?)?;
    if !account.is_connected() {
        return Err(ClientError::AuthRequired(
            "no Google tokens stored, run `calsync auth google` first".to_string(),
        ));
    }

    let store = Arc::new(open_store(config)?);
    let engine = SyncEngine::with_store(
        account.api(),
        account.token_manager(),
        store,
        config.sync.engine_config(),
    );

    let summary = engine.run(&options).await?;
    info!(
        calendars = summary.calendars.len(),
        changes = summary.changes(),
        "sync finished"
    );

    if json {
        let out = serde_json::to_string_pretty(&summary)
            .map_err(|e| ClientError::Config(format!("failed to encode summary: {}", e)))?;
        println!("{}", out);
    } else {
        print!("{}", render_summary(&summary));
    }
    Ok(())
}

/// Human-readable summary, one line per calendar.
pub fn render_summary(summary: &SyncSummary) -> String {
    let mut out = String::new();
    if let Some(ref directory) = summary.directory {
        let _ = writeln!(
            out,
            "calendars: {} remote, {} new, {} updated",
            directory.total,
            directory.discovered.len(),
            directory.updated.len()
        );
    }
    if summary.calendars.is_empty() {
        out.push_str("no enabled calendars\n");
    }
    for report in &summary.calendars {
        let _ = writeln!(out, "{}", report);
    }
    out
}
