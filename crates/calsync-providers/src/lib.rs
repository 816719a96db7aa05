//! Remote side of calsync: everything that speaks HTTP.
//!
//! - [`CalendarApi`]: the remote calendar operations the sync engine needs
//! - [`RetryingClient`]: bearer-authenticated HTTP with backoff on 429/5xx
//! - [`ProviderError`]: classified failures (retryable, auth, cursor expiry)
//! - [`google`]: Google Calendar v3, OAuth PKCE and token management
//!
//! ```text
//!   SyncEngine ──► TokenManager ──► TokenRefresher (OAuthClient)
//!        │
//!        └──────► CalendarApi (GoogleCalendarClient) ──► RetryingClient
//! ```

pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod http;
pub mod remote;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use http::{RetryingClient, RetryingClientBuilder};
pub use remote::{
    AccessRole, BoxFuture, CalendarApi, CalendarPage, DeleteOutcome, EventDraft, EventPage,
    EventPageRequest, EventQuery, RemoteCalendar, RemoteEvent, RemoteEventTime,
};
