//! Access-token lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::error::{ProviderError, ProviderResult};

use super::oauth::TokenRefresher;
use super::tokens::TokenStorage;

/// A cached token is reused only if it outlives now by this many seconds.
pub const EXPIRY_MARGIN_SECS: i64 = 60;

/// Hands out valid access tokens, refreshing and persisting them as needed.
pub struct TokenManager {
    storage: TokenStorage,
    refresher: Arc<dyn TokenRefresher>,
    // Serializes refreshes so concurrent callers don't each spend the
    // refresh token.
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl TokenManager {
    pub fn new(storage: TokenStorage, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            storage,
            refresher,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &TokenStorage {
        &self.storage
    }

    /// Returns true if a refresh token is stored.
    pub fn is_connected(&self) -> bool {
        self.storage.has_refresh_token()
    }

    pub async fn ensure_valid_token(&self) -> ProviderResult<String> {
        self.ensure_valid_token_at(Utc::now()).await
    }

    /// Returns an access token valid for at least the expiry margin after `now`.
    ///
    /// Fails with `NotConnected` when no refresh token is stored and with
    /// `RefreshFailed` when the refresh call errors.
    #[instrument(skip(self), level = "debug")]
    pub async fn ensure_valid_token_at(&self, now: DateTime<Utc>) -> ProviderResult<String> {
        let _guard = self.refresh_lock.lock().await;

        let Some(mut tokens) = self.storage.get() else {
            return Err(ProviderError::not_connected(
                "no Google account connected, run `calsync auth google`",
            ));
        };

        if tokens.is_fresh_at(now, Duration::seconds(EXPIRY_MARGIN_SECS)) {
            debug!(expires_at = ?tokens.expires_at, "using cached access token");
            return Ok(tokens.access_token);
        }

        let refresh_token = match tokens.refresh_token.as_deref() {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => {
                return Err(ProviderError::not_connected(
                    "no refresh token stored, run `calsync auth google`",
                ));
            }
        };

        let refreshed = self.refresher.refresh(&refresh_token).await.map_err(|e| {
            ProviderError::refresh_failed(format!("token refresh failed: {}", e)).with_source(e)
        })?;

        let rotated = refreshed.refresh_token.is_some();
        tokens.apply_refresh(
            now,
            refreshed.access_token,
            refreshed.expires_in,
            refreshed.refresh_token,
        );
        self.storage.set(tokens.clone())?;
        info!(expires_at = ?tokens.expires_at, rotated, "access token refreshed");

        Ok(tokens.access_token)
    }
}
