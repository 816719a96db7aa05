//! One connected Google account: OAuth, token lifecycle and the Calendar API
//! client wired together.

use std::sync::Arc;

use tracing::info;

use crate::error::ProviderResult;
use crate::remote::CalendarApi;

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;
use super::manager::TokenManager;
use super::oauth::OAuthClient;
use super::tokens::TokenStorage;

pub struct GoogleAccount {
    config: GoogleConfig,
    oauth: Arc<OAuthClient>,
    tokens: Arc<TokenManager>,
    api: Arc<GoogleCalendarClient>,
}

impl GoogleAccount {
    /// Validates `config` and loads any tokens already on disk.
    ///
    /// This does not start an authorization flow; see [`Self::authenticate`].
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate()?;

        let storage = TokenStorage::open(&config.token_path)?;
        let oauth = Arc::new(OAuthClient::new(config.credentials.clone(), config.timeout)?);
        let tokens = Arc::new(TokenManager::new(storage, oauth.clone()));
        let api = Arc::new(GoogleCalendarClient::new(&config)?);

        Ok(Self {
            config,
            oauth,
            tokens,
            api,
        })
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Runs the browser consent flow unless a usable refresh token with the
    /// configured scopes is already stored. `force` always re-runs it.
    ///
    /// Returns true if new tokens were obtained.
    pub async fn authenticate(&self, force: bool) -> ProviderResult<bool> {
        if !force && self.is_connected() && !self.needs_reauth() {
            info!("Google account already connected");
            return Ok(false);
        }

        let tokens = self
            .oauth
            .authorize(&self.config.scopes, self.config.loopback_port_range)
            .await?;
        self.tokens.storage().set(tokens)?;
        info!(path = %self.config.token_path.display(), "Google account connected");
        Ok(true)
    }

    /// Forgets the stored tokens.
    pub fn disconnect(&self) -> ProviderResult<()> {
        self.tokens.storage().clear()
    }

    pub fn is_connected(&self) -> bool {
        self.tokens.is_connected()
    }

    /// True when the stored grant lacks one of the configured scopes.
    pub fn needs_reauth(&self) -> bool {
        self.tokens.storage().needs_reauth(&self.config.scopes)
    }

    pub fn token_manager(&self) -> Arc<TokenManager> {
        self.tokens.clone()
    }

    pub fn api(&self) -> Arc<dyn CalendarApi> {
        self.api.clone()
    }
}

impl std::fmt::Debug for GoogleAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleAccount")
            .field("token_path", &self.config.token_path)
            .field("connected", &self.is_connected())
            .finish()
    }
}
