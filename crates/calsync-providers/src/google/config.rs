//! Google Calendar configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{DEFAULT_BASE_DELAY, DEFAULT_MAX_RETRIES};

/// OAuth client credentials registered in the Google Cloud Console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Google's credentials JSON, either nested under `installed`/`web` or flat.
#[derive(Debug, Deserialize)]
struct CredentialsFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads credentials from a JSON file downloaded from the Cloud Console.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read credentials file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let file: CredentialsFile = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("failed to parse credentials JSON: {}", e))
        })?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }
        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err(ProviderError::configuration(
            "credentials must contain an 'installed' or 'web' section, or top-level 'client_id' and 'client_secret'",
        ))
    }

    /// Checks the credentials look like a Google OAuth client.
    pub fn validate(&self) -> ProviderResult<()> {
        if self.client_id.is_empty() {
            return Err(ProviderError::configuration("client_id is required"));
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err(ProviderError::configuration(
                "client_id should end with .apps.googleusercontent.com",
            ));
        }
        if self.client_secret.is_empty() {
            return Err(ProviderError::configuration("client_secret is required"));
        }
        Ok(())
    }
}

/// Everything needed to authorize against and call Google Calendar.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub credentials: OAuthCredentials,

    /// Where OAuth tokens are persisted.
    pub token_path: PathBuf,

    /// Root of the Calendar v3 REST API.
    pub api_base_url: String,

    pub timeout: Duration,
    pub user_agent: String,

    /// Retries after the first attempt for 429/5xx responses.
    pub max_retries: u32,
    pub base_delay: Duration,

    /// Ports tried, in order, for the OAuth loopback redirect.
    pub loopback_port_range: (u16, u16),

    pub scopes: Vec<String>,
}

impl GoogleConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read/write calendar access.
    pub const DEFAULT_SCOPE: &'static str = "https://www.googleapis.com/auth/calendar";

    pub const DEFAULT_API_BASE_URL: &'static str = "https://www.googleapis.com/calendar/v3";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            token_path: Self::default_token_path(),
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("calsync/{}", env!("CARGO_PKG_VERSION")),
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            loopback_port_range: (8080, 8090),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
        }
    }

    /// `$XDG_DATA_HOME/calsync/google-tokens.json`, or the working directory
    /// when no data directory is known.
    pub fn default_token_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
            .join("google-tokens.json")
    }

    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    pub fn with_loopback_port_range(mut self, start: u16, end: u16) -> Self {
        self.loopback_port_range = (start, end);
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn validate(&self) -> ProviderResult<()> {
        self.credentials.validate()?;
        if self.loopback_port_range.0 > self.loopback_port_range.1 {
            return Err(ProviderError::configuration("invalid loopback port range"));
        }
        if self.scopes.is_empty() {
            return Err(ProviderError::configuration("at least one OAuth scope is required"));
        }
        url::Url::parse(&self.api_base_url).map_err(|e| {
            ProviderError::configuration(format!("invalid API base URL: {}", e))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> OAuthCredentials {
        OAuthCredentials::new("123.apps.googleusercontent.com", "secret")
    }

    mod credentials {
        use super::*;

        #[test]
        fn nested_installed() {
            let json = r#"{"installed":{"client_id":"a.apps.googleusercontent.com","client_secret":"s","project_id":"p"}}"#;
            let c = OAuthCredentials::from_json(json).unwrap();
            assert_eq!(c.client_id, "a.apps.googleusercontent.com");
            assert_eq!(c.client_secret, "s");
        }

        #[test]
        fn nested_web() {
            let json = r#"{"web":{"client_id":"w","client_secret":"s"}}"#;
            assert_eq!(OAuthCredentials::from_json(json).unwrap().client_id, "w");
        }

        #[test]
        fn flat() {
            let json = r#"{"client_id":"f","client_secret":"s"}"#;
            assert_eq!(OAuthCredentials::from_json(json).unwrap().client_id, "f");
        }

        #[test]
        fn missing_fields() {
            let err = OAuthCredentials::from_json(r#"{"client_id":"f"}"#).unwrap_err();
            assert_eq!(err.code(), crate::ProviderErrorCode::ConfigurationError);
        }

        #[test]
        fn from_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("creds.json");
            std::fs::write(&path, r#"{"client_id":"f","client_secret":"s"}"#).unwrap();
            assert_eq!(OAuthCredentials::from_file(&path).unwrap().client_secret, "s");
        }

        #[test]
        fn validation() {
            assert!(creds().validate().is_ok());
            assert!(OAuthCredentials::new("", "s").validate().is_err());
            assert!(OAuthCredentials::new("plain", "s").validate().is_err());
            assert!(OAuthCredentials::new("x.apps.googleusercontent.com", "").validate().is_err());
        }
    }

    mod google_config {
        use super::*;

        #[test]
        fn defaults() {
            let config = GoogleConfig::new(creds());
            assert_eq!(config.scopes, vec![GoogleConfig::DEFAULT_SCOPE.to_string()]);
            assert_eq!(config.api_base_url, GoogleConfig::DEFAULT_API_BASE_URL);
            assert_eq!(config.max_retries, 3);
            assert_eq!(config.loopback_port_range, (8080, 8090));
            assert!(config.token_path.ends_with("calsync/google-tokens.json"));
            assert!(config.validate().is_ok());
        }

        #[test]
        fn builders() {
            let config = GoogleConfig::new(creds())
                .with_token_path("/tmp/t.json")
                .with_retry(5, Duration::from_millis(10))
                .with_loopback_port_range(9000, 9001);
            assert_eq!(config.token_path, PathBuf::from("/tmp/t.json"));
            assert_eq!(config.max_retries, 5);
            assert_eq!(config.loopback_port_range, (9000, 9001));
        }

        #[test]
        fn rejects_inverted_port_range() {
            let config = GoogleConfig::new(creds()).with_loopback_port_range(9001, 9000);
            assert!(config.validate().is_err());
        }

        #[test]
        fn rejects_bad_base_url() {
            let config = GoogleConfig::new(creds()).with_api_base_url("not a url");
            assert!(config.validate().is_err());
        }
    }
}
