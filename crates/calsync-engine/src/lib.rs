//! Sync engine: calendar directory, deletion tracking, pull/push passes.
//!
//! This crate keeps a local event store in step with remote calendars:
//! - [`CalendarDirectory`] discovers remote calendars and assigns colors
//! - [`DeletionTracker`] replays local deletions remotely until acknowledged
//! - [`SyncEngine`] runs the per-calendar pull/reconcile/push pass
//! - [`LocalEvents`] is the user-facing create/edit/delete surface
//! - [`FileStore`] persists everything in one JSON document
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use calsync_engine::{EngineConfig, FileStore, SyncEngine, SyncOptions};
//!
//! let store = Arc::new(FileStore::open("store.json")?);
//! let engine = SyncEngine::with_store(account.api(), account.token_manager(), store, EngineConfig::default());
//! let summary = engine.run(&SyncOptions::default()).await?;
//! for report in &summary.calendars {
//!     println!("{report}");
//! }
//! ```

mod config;
mod directory;
mod engine;
mod error;
mod local;
mod mapping;
mod store;
mod tombstones;

#[cfg(test)]
mod testing;

pub use config::{DEFAULT_MAX_RESULTS, EngineConfig};
pub use directory::{CalendarDirectory, DirectoryReport};
pub use engine::{CalendarSyncReport, SyncEngine, SyncOptions, SyncSummary};
pub use error::{StoreError, StoreResult, SyncError, SyncResult};
pub use local::{LocalEvents, NewEvent};
pub use mapping::{LocalFields, draft_for, local_fields};
pub use store::{CalendarRegistry, EventRepository, FileStore, TombstoneStore};
pub use tombstones::{DeletionTracker, FlushReport};
