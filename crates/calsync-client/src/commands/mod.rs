//! Subcommand implementations.

pub mod auth;
pub mod calendars;
pub mod config;
pub mod events;
pub mod sync;

use calsync_engine::FileStore;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Opens the local store named by `[sync] store_path`.
pub(crate) fn open_store(config: &ClientConfig) -> ClientResult<FileStore> {
    Ok(FileStore::open(config.sync.store_path())?)
}
