//! Client configuration.
//!
//! All settings live in a single `config.toml`, by default at
//! `~/.config/calsync/config.toml`:
//!
//! ```toml
//! [google]
//! client_id = "env::GOOGLE_CLIENT_ID"
//! client_secret = "pass::google/calsync"
//!
//! [sync]
//! max_results = 250
//! max_retries = 3
//! ```
//!
//! `client_id` and `client_secret` accept secret references (see
//! [`crate::secret`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use calsync_engine::{DEFAULT_MAX_RESULTS, EngineConfig};
use calsync_providers::google::{GoogleConfig, OAuthCredentials};
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Largest page size the event listing accepts.
pub const MAX_PAGE_SIZE: u32 = 2500;

/// Configuration for the calsync client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// Google Calendar settings.
    pub google: Option<GoogleSettings>,

    /// Sync and local store settings.
    pub sync: SyncSettings,
}

impl ClientConfig {
    /// Loads the file at `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> ClientResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Loads configuration from a file that must exist.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calsync")
    }

    /// Provider configuration for the `[google]` section.
    pub fn google_config(&self, config_path: &Path) -> ClientResult<GoogleConfig> {
        let google = self.google.as_ref().ok_or_else(|| {
            ClientError::AuthRequired(missing_credentials_hint(config_path))
        })?;
        google.to_provider_config(&self.sync, config_path)
    }

    /// Checks every section without contacting any service.
    pub fn validate(&self, config_path: &Path) -> ClientResult<()> {
        self.sync.validate()?;
        if let Some(ref google) = self.google
            && (google.client_id.is_some() || google.client_secret.is_some())
        {
            google.to_provider_config(&self.sync, config_path)?;
        }
        Ok(())
    }
}

fn missing_credentials_hint(config_path: &Path) -> String {
    format!(
        "Google credentials not found. Add to {}:\n  \
         [google]\n  \
         client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
         client_secret = \"YOUR_SECRET\"\n\n  \
         Or run: calsync auth google --credentials-file <path>",
        config_path.display()
    )
}

/// Google Calendar provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Path to token storage.
    pub token_path: Option<PathBuf>,
}

impl GoogleSettings {
    /// Resolves credentials and applies `sync` transport settings.
    pub fn to_provider_config(
        &self,
        sync: &SyncSettings,
        config_path: &Path,
    ) -> ClientResult<GoogleConfig> {
        let credentials = self.resolve_credentials(config_path)?;
        credentials
            .validate()
            .map_err(|e| ClientError::Config(format!("invalid Google credentials: {}", e)))?;

        let mut config = GoogleConfig::new(credentials)
            .with_timeout(Duration::from_secs(sync.request_timeout_secs))
            .with_retry(sync.max_retries, Duration::from_millis(sync.base_delay_ms));
        if let Some(ref path) = self.token_path {
            config = config.with_token_path(path);
        }
        Ok(config)
    }

    /// Resolves `client_id` and `client_secret`, expanding secret references.
    pub(crate) fn resolve_credentials(&self, config_path: &Path) -> ClientResult<OAuthCredentials> {
        let raw_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| ClientError::AuthRequired(missing_credentials_hint(config_path)))?;
        let raw_secret = self.client_secret.as_deref().ok_or_else(|| {
            ClientError::Config(format!(
                "client_secret is missing from [google] in {}",
                config_path.display()
            ))
        })?;

        Ok(OAuthCredentials::new(
            crate::secret::resolve(raw_id)?,
            crate::secret::resolve(raw_secret)?,
        ))
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Local store file. Defaults to `store.json` in the data directory.
    pub store_path: Option<PathBuf>,

    /// Page size for event listing.
    pub max_results: u32,

    /// Retries for rate-limited and server errors.
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry.
    pub base_delay_ms: u64,

    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            store_path: None,
            max_results: DEFAULT_MAX_RESULTS,
            max_retries: 3,
            base_delay_ms: 500,
            request_timeout_secs: GoogleConfig::DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl SyncSettings {
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| ClientConfig::default_data_dir().join("store.json"))
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default().with_max_results(self.max_results)
    }

    pub fn validate(&self) -> ClientResult<()> {
        if !(1..=MAX_PAGE_SIZE).contains(&self.max_results) {
            return Err(ClientError::Config(format!(
                "sync.max_results must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.max_results
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::Config(
                "sync.request_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> PathBuf {
        PathBuf::from("/tmp/calsync/config.toml")
    }

    mod google {
        use super::*;

        #[test]
        fn resolve_plain_text() {
            let settings = GoogleSettings {
                client_id: Some("test-id.apps.googleusercontent.com".to_string()),
                client_secret: Some("test-secret".to_string()),
                ..Default::default()
            };
            let creds = settings.resolve_credentials(&path()).unwrap();
            assert_eq!(creds.client_id, "test-id.apps.googleusercontent.com");
            assert_eq!(creds.client_secret, "test-secret");
        }

        #[test]
        fn resolve_env_prefix() {
            unsafe {
                std::env::set_var("_CALSYNC_CFG_ID", "env-id.apps.googleusercontent.com");
                std::env::set_var("_CALSYNC_CFG_SECRET", "env-secret");
            }
            let settings = GoogleSettings {
                client_id: Some("env::_CALSYNC_CFG_ID".to_string()),
                client_secret: Some("env::_CALSYNC_CFG_SECRET".to_string()),
                ..Default::default()
            };
            let creds = settings.resolve_credentials(&path()).unwrap();
            assert_eq!(creds.client_id, "env-id.apps.googleusercontent.com");
            assert_eq!(creds.client_secret, "env-secret");
            unsafe {
                std::env::remove_var("_CALSYNC_CFG_ID");
                std::env::remove_var("_CALSYNC_CFG_SECRET");
            }
        }

        #[test]
        fn missing_id_requires_auth() {
            let settings = GoogleSettings {
                client_secret: Some("secret".to_string()),
                ..Default::default()
            };
            let err = settings.resolve_credentials(&path()).unwrap_err();
            assert!(matches!(err, ClientError::AuthRequired(_)));
            assert!(err.to_string().contains("calsync auth google"));
        }

        #[test]
        fn missing_secret_errors() {
            let settings = GoogleSettings {
                client_id: Some("id.apps.googleusercontent.com".to_string()),
                ..Default::default()
            };
            let err = settings.resolve_credentials(&path()).unwrap_err();
            assert!(err.to_string().contains("client_secret"));
        }

        #[test]
        fn provider_config_carries_sync_settings() {
            let settings = GoogleSettings {
                client_id: Some("test.apps.googleusercontent.com".to_string()),
                client_secret: Some("test-secret".to_string()),
                token_path: Some(PathBuf::from("/tmp/tokens.json")),
            };
            let sync = SyncSettings {
                max_retries: 5,
                base_delay_ms: 100,
                request_timeout_secs: 10,
                ..SyncSettings::default()
            };
            let config = settings.to_provider_config(&sync, &path()).unwrap();
            assert_eq!(config.credentials.client_secret, "test-secret");
            assert_eq!(config.token_path, PathBuf::from("/tmp/tokens.json"));
            assert_eq!(config.max_retries, 5);
            assert_eq!(config.base_delay, Duration::from_millis(100));
            assert_eq!(config.timeout, Duration::from_secs(10));
        }

        #[test]
        fn bad_client_id_is_rejected() {
            let settings = GoogleSettings {
                client_id: Some("not-a-google-id".to_string()),
                client_secret: Some("secret".to_string()),
                ..Default::default()
            };
            assert!(matches!(
                settings.to_provider_config(&SyncSettings::default(), &path()),
                Err(ClientError::Config(_))
            ));
        }
    }

    mod file {
        use super::*;

        #[test]
        fn parse_full_file() {
            let toml_content = r#"
[google]
client_id = "toml-id.apps.googleusercontent.com"
client_secret = "toml-secret"

[sync]
store_path = "/var/lib/calsync/store.json"
max_results = 100
"#;
            let config: ClientConfig = toml::from_str(toml_content).unwrap();
            let google = config.google.as_ref().unwrap();
            assert_eq!(google.client_secret.as_deref(), Some("toml-secret"));
            assert_eq!(
                config.sync.store_path(),
                PathBuf::from("/var/lib/calsync/store.json")
            );
            assert_eq!(config.sync.engine_config().max_results, 100);
            assert_eq!(config.sync.max_retries, 3);
            config.validate(&path()).unwrap();
        }

        #[test]
        fn missing_file_is_default() {
            let tmp = tempfile::tempdir().unwrap();
            let config = ClientConfig::load(&tmp.path().join("absent.toml")).unwrap();
            assert!(config.google.is_none());
            assert_eq!(config.sync, SyncSettings::default());
            assert!(matches!(
                config.google_config(&path()),
                Err(ClientError::AuthRequired(_))
            ));
        }

        #[test]
        fn malformed_file_errors() {
            let tmp = tempfile::tempdir().unwrap();
            let file = tmp.path().join("config.toml");
            std::fs::write(&file, "[sync\nmax_results = 1").unwrap();
            assert!(matches!(
                ClientConfig::load(&file),
                Err(ClientError::Config(_))
            ));
        }

        #[test]
        fn validate_rejects_page_size() {
            let mut config = ClientConfig::default();
            config.sync.max_results = 0;
            assert!(config.validate(&path()).is_err());
            config.sync.max_results = MAX_PAGE_SIZE + 1;
            assert!(config.validate(&path()).is_err());
            config.sync.max_results = MAX_PAGE_SIZE;
            config.validate(&path()).unwrap();
        }

        #[test]
        fn bare_google_section_is_valid_until_used() {
            let config: ClientConfig = toml::from_str("[google]\n").unwrap();
            config.validate(&path()).unwrap();
            assert!(config.google_config(&path()).is_err());
        }
    }
}
