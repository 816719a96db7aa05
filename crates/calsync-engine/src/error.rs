//! Engine error types.

use std::io;
use std::path::PathBuf;

use calsync_core::EventError;
use calsync_providers::ProviderError;
use thiserror::Error;

/// Result type for local store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors from the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("store file {path} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },

    #[error("failed to encode store: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("calendar not found: {0}")]
    CalendarNotFound(String),

    /// An event links to a calendar the registry does not know.
    #[error("event {event_id} references unknown calendar {calendar_id}")]
    UnknownCalendar {
        event_id: String,
        calendar_id: String,
    },

    #[error("event id already exists: {0}")]
    DuplicateEvent(String),

    #[error(transparent)]
    Invalid(#[from] EventError),
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors surfaced by a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("local store: {0}")]
    Store(#[from] StoreError),

    /// A requested calendar is unknown or disabled.
    #[error("no enabled calendar named {0}")]
    CalendarUnavailable(String),
}

impl From<EventError> for SyncError {
    fn from(e: EventError) -> Self {
        Self::Store(StoreError::Invalid(e))
    }
}

impl SyncError {
    /// Auth-level failures abort the whole run; everything else only aborts
    /// the calendar being synced.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Provider(e) => e.is_auth(),
            Self::Store(_) | Self::CalendarUnavailable(_) => false,
        }
    }

    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(e) => Some(e),
            _ => None,
        }
    }
}
