//! OAuth token persistence.
//!
//! Tokens live in a single JSON file next to the rest of the user's calsync
//! data. Writes go through a temp file and a rename so a crash never leaves
//! a truncated token file behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

/// A stored OAuth token set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub access_token: String,

    /// Long-lived token used to mint new access tokens.
    pub refresh_token: Option<String>,

    /// Actual expiry reported by the token endpoint.
    pub expires_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub scopes: Vec<String>,

    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    /// Builds a token set from an OAuth response received at `now`.
    pub fn issued_at(
        now: DateTime<Utc>,
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(|secs| now + Duration::seconds(secs)),
            scopes,
            last_refresh: now,
        }
    }

    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self::issued_at(Utc::now(), access_token, refresh_token, expires_in_secs, scopes)
    }

    /// True if the access token stays valid for more than `margin` after `now`.
    ///
    /// A token without a known expiry is never considered fresh.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        !self.access_token.is_empty()
            && self.expires_at.is_some_and(|expires_at| expires_at > now + margin)
    }

    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Applies a refresh result.
    ///
    /// A rotated refresh token replaces the stored one; otherwise the old
    /// refresh token is kept.
    pub fn apply_refresh(
        &mut self,
        now: DateTime<Utc>,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) {
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(|secs| now + Duration::seconds(secs));
        if let Some(refresh_token) = refresh_token {
            self.refresh_token = Some(refresh_token);
        }
        self.last_refresh = now;
    }
}

/// File-backed token storage with an in-memory copy.
#[derive(Debug)]
pub struct TokenStorage {
    path: PathBuf,
    tokens: RwLock<Option<TokenInfo>>,
}

impl TokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            tokens: RwLock::new(None),
        }
    }

    /// Opens the storage at `path` and loads whatever is already there.
    pub fn open(path: impl Into<PathBuf>) -> ProviderResult<Self> {
        let storage = Self::new(path);
        storage.load()?;
        Ok(storage)
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<TokenInfo>> {
        self.tokens.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<TokenInfo>> {
        self.tokens.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads tokens from disk. Returns false if the file does not exist.
    pub fn load(&self) -> ProviderResult<bool> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no token file");
            return Ok(false);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to read token file: {}", e))
        })?;
        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!("failed to parse token file: {}", e))
        })?;

        info!(path = %self.path.display(), "loaded tokens");
        *self.write() = Some(tokens);
        Ok(true)
    }

    fn persist(&self, tokens: &TokenInfo) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!("failed to create token directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| ProviderError::internal(format!("failed to serialize tokens: {}", e)))?;

        fs::write(&temp_path, content).map_err(|e| {
            ProviderError::configuration(format!("failed to write token file: {}", e))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600));
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to rename token file: {}", e))
        })?;

        debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    pub fn get(&self) -> Option<TokenInfo> {
        self.read().clone()
    }

    /// Replaces the stored tokens and writes them to disk.
    pub fn set(&self, tokens: TokenInfo) -> ProviderResult<()> {
        let mut guard = self.write();
        self.persist(&tokens)?;
        *guard = Some(tokens);
        Ok(())
    }

    /// Removes the tokens from memory and disk.
    pub fn clear(&self) -> ProviderResult<()> {
        *self.write() = None;
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                ProviderError::configuration(format!("failed to remove token file: {}", e))
            })?;
            info!(path = %self.path.display(), "cleared tokens");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has_refresh_token(&self) -> bool {
        self.read()
            .as_ref()
            .is_some_and(|t| t.refresh_token.as_deref().is_some_and(|r| !r.is_empty()))
    }

    /// True when no tokens are stored or they lack one of `required_scopes`.
    pub fn needs_reauth(&self, required_scopes: &[String]) -> bool {
        match self.read().as_ref() {
            None => true,
            Some(tokens) => !tokens.has_scopes(required_scopes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    mod token_info {
        use super::*;

        #[test]
        fn stores_real_expiry() {
            let token = TokenInfo::issued_at(now(), "a", Some("r".into()), Some(3600), vec![]);
            assert_eq!(token.expires_at, Some(now() + Duration::seconds(3600)));
        }

        #[test]
        fn freshness_respects_margin() {
            let token = TokenInfo::issued_at(now(), "a", None, Some(120), vec![]);
            let margin = Duration::seconds(60);
            assert!(token.is_fresh_at(now(), margin));
            assert!(token.is_fresh_at(now() + Duration::seconds(59), margin));
            assert!(!token.is_fresh_at(now() + Duration::seconds(60), margin));
        }

        #[test]
        fn unknown_expiry_is_not_fresh() {
            let token = TokenInfo::issued_at(now(), "a", None, None, vec![]);
            assert!(!token.is_fresh_at(now(), Duration::seconds(60)));
        }

        #[test]
        fn refresh_keeps_refresh_token_unless_rotated() {
            let mut token = TokenInfo::issued_at(now(), "a", Some("r1".into()), Some(10), vec![]);
            token.apply_refresh(now(), "b", Some(3600), None);
            assert_eq!(token.access_token, "b");
            assert_eq!(token.refresh_token.as_deref(), Some("r1"));

            token.apply_refresh(now(), "c", Some(3600), Some("r2".into()));
            assert_eq!(token.refresh_token.as_deref(), Some("r2"));
        }

        #[test]
        fn scope_check() {
            let token = TokenInfo::new("a", None, None, vec!["s1".into(), "s2".into()]);
            assert!(token.has_scopes(&["s1".to_string()]));
            assert!(!token.has_scopes(&["s3".to_string()]));
        }
    }

    mod storage {
        use super::*;

        #[test]
        fn set_then_open() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tokens.json");
            let storage = TokenStorage::new(&path);
            storage
                .set(TokenInfo::new("access", Some("refresh".into()), Some(3600), vec![]))
                .unwrap();
            assert!(path.exists());

            let reopened = TokenStorage::open(&path).unwrap();
            assert_eq!(reopened.get().unwrap().access_token, "access");
            assert!(reopened.has_refresh_token());
        }

        #[cfg(unix)]
        #[test]
        fn file_is_private() {
            use std::os::unix::fs::PermissionsExt;
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tokens.json");
            TokenStorage::new(&path)
                .set(TokenInfo::new("a", None, None, vec![]))
                .unwrap();
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        #[test]
        fn missing_file_loads_nothing() {
            let dir = tempfile::tempdir().unwrap();
            let storage = TokenStorage::new(dir.path().join("absent.json"));
            assert!(!storage.load().unwrap());
            assert!(storage.get().is_none());
            assert!(!storage.has_refresh_token());
        }

        #[test]
        fn clear_removes_file() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tokens.json");
            let storage = TokenStorage::new(&path);
            storage.set(TokenInfo::new("a", None, None, vec![])).unwrap();
            storage.clear().unwrap();
            assert!(!path.exists());
            assert!(storage.get().is_none());
        }

        #[test]
        fn corrupt_file_is_a_configuration_error() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("tokens.json");
            fs::write(&path, "{not json").unwrap();
            let err = TokenStorage::open(&path).unwrap_err();
            assert_eq!(err.code(), crate::ProviderErrorCode::ConfigurationError);
        }

        #[test]
        fn reauth_when_scope_missing() {
            let dir = tempfile::tempdir().unwrap();
            let storage = TokenStorage::new(dir.path().join("tokens.json"));
            assert!(storage.needs_reauth(&["s1".to_string()]));
            storage
                .set(TokenInfo::new("a", None, None, vec!["s1".into()]))
                .unwrap();
            assert!(!storage.needs_reauth(&["s1".to_string()]));
            assert!(storage.needs_reauth(&["s2".to_string()]));
        }
    }
}
