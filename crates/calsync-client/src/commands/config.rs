//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::secret::SecretRef;

/// Prints the effective configuration. Resolved secrets are never shown.
pub fn dump(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(&redacted(config))
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", toml_str);
    Ok(())
}

/// Plain-text client secrets are masked; references are shown as written.
fn redacted(config: &ClientConfig) -> ClientConfig {
    let mut config = config.clone();
    if let Some(ref mut google) = config.google
        && let Some(ref mut secret) = google.client_secret
        && !SecretRef::parse(secret).is_reference()
    {
        *secret = "********".to_string();
    }
    config
}

/// Checks the configuration and resolves credentials.
pub fn validate(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    config.validate(config_path)?;
    if config
        .google
        .as_ref()
        .is_some_and(|g| g.client_id.is_some() && g.client_secret.is_some())
    {
        println!("Google credentials are valid.");
    }
    println!("Configuration is valid.");
    Ok(())
}

/// Shows where calsync reads and writes its files.
pub fn path(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    println!("config: {}", config_path.display());
    println!("store:  {}", config.sync.store_path().display());
    let tokens = config
        .google
        .as_ref()
        .and_then(|g| g.token_path.clone())
        .unwrap_or_else(calsync_providers::google::GoogleConfig::default_token_path);
    println!("tokens: {}", tokens.display());
    Ok(())
}
