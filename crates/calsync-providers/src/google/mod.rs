//! Google Calendar backend.
//!
//! - [`GoogleCalendarClient`]: Calendar v3 REST calls behind [`crate::CalendarApi`]
//! - [`OAuthClient`]: authorization-code + PKCE flow with a loopback redirect
//! - [`TokenStorage`] / [`TokenManager`]: token persistence and refresh
//! - [`GoogleAccount`]: all of the above for one configured account
//!
//! # Example
//!
//! ```ignore
//! use calsync_providers::google::{GoogleAccount, GoogleConfig, OAuthCredentials};
//!
//! let credentials = OAuthCredentials::from_file("client_secret.json")?;
//! let account = GoogleAccount::new(GoogleConfig::new(credentials))?;
//! account.authenticate(false).await?;
//!
//! let token = account.token_manager().ensure_valid_token().await?;
//! let page = account.api().list_calendars(&token, None).await?;
//! ```

mod account;
mod client;
mod config;
mod manager;
mod oauth;
mod tokens;

pub use account::GoogleAccount;
pub use client::GoogleCalendarClient;
pub use config::{GoogleConfig, OAuthCredentials};
pub use manager::{EXPIRY_MARGIN_SECS, TokenManager};
pub use oauth::{CallbackParams, OAuthClient, PkceFlow, RefreshedToken, TokenRefresher, parse_request_line};
pub use tokens::{TokenInfo, TokenStorage};
