//! Client error types.

use std::fmt;

use calsync_core::EventError;
use calsync_engine::{StoreError, SyncError};
use calsync_providers::ProviderError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Secret reference could not be resolved.
    Secret(String),
    /// Provider error.
    Provider(ProviderError),
    /// Local store error.
    Store(StoreError),
    /// Sync run failed.
    Sync(SyncError),
    /// Invalid command-line input.
    InvalidInput(String),
    /// IO error.
    Io(std::io::Error),
    /// Authentication required.
    AuthRequired(String),
}

impl ClientError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::AuthRequired(_) => 3,
            Self::Sync(e) if e.is_fatal() => 3,
            Self::Provider(e) if e.is_auth() => 3,
            Self::InvalidInput(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Secret(msg) => write!(f, "secret error: {}", msg),
            Self::Provider(err) => write!(f, "provider error: {}", err),
            Self::Store(err) => write!(f, "store error: {}", err),
            Self::Sync(err) => write!(f, "sync failed: {}", err),
            Self::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::AuthRequired(msg) => write!(f, "authentication required: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Provider(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ProviderError> for ClientError {
    fn from(err: ProviderError) -> Self {
        Self::Provider(err)
    }
}

impl From<StoreError> for ClientError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<SyncError> for ClientError {
    fn from(err: SyncError) -> Self {
        Self::Sync(err)
    }
}

impl From<EventError> for ClientError {
    fn from(err: EventError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}
