//! Authentication commands.

use std::path::{Path, PathBuf};

use calsync_providers::google::{GoogleAccount, GoogleConfig, OAuthCredentials, TokenStorage};
use tracing::{info, warn};

use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};

/// Flags of `calsync auth google`.
#[derive(Debug, Default)]
pub struct GoogleAuthArgs {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub credentials_file: Option<PathBuf>,
    pub force: bool,
}

/// Runs the Google OAuth PKCE flow.
///
/// Credentials given on the command line or through `--credentials-file`
/// are written to `config.toml` so later `sync` runs can refresh tokens.
pub async fn google(
    args: GoogleAuthArgs,
    config: &ClientConfig,
    config_path: &Path,
) -> ClientResult<()> {
    let (client_id, client_secret, source) = resolve_google_credentials(
        args.client_id,
        args.client_secret,
        args.credentials_file,
        config.google.as_ref(),
        config_path,
    )?;

    let settings = GoogleSettings {
        client_id: Some(client_id.clone()),
        client_secret: Some(client_secret.clone()),
        token_path: config.google.as_ref().and_then(|g| g.token_path.clone()),
    };
    let account = GoogleAccount::new(settings.to_provider_config(&config.sync, config_path)?)?;

    if account.is_connected() && !account.needs_reauth() && !args.force {
        save_credentials_to_config(config_path, &client_id, &client_secret, &source)?;
        println!("Already authenticated with Google Calendar.");
        println!("Use --force to re-authenticate.");
        return Ok(());
    }

    println!("Starting Google Calendar authentication...");
    println!();
    println!("A browser window will open for you to authorize access.");
    println!("If the browser doesn't open, copy the URL printed below.");
    println!();

    account.authenticate(true).await?;
    save_credentials_to_config(config_path, &client_id, &client_secret, &source)?;

    info!(token_path = %account.config().token_path.display(), "Google authentication successful");
    println!();
    println!("Authentication successful!");
    println!("Run `calsync sync` to import your calendars.");
    Ok(())
}

/// Forgets stored Google tokens. Credentials in `config.toml` are kept.
pub fn disconnect(config: &ClientConfig) -> ClientResult<()> {
    let token_path = config
        .google
        .as_ref()
        .and_then(|g| g.token_path.clone())
        .unwrap_or_else(GoogleConfig::default_token_path);
    let storage = TokenStorage::open(&token_path)?;
    storage.clear()?;
    info!(path = %token_path.display(), "Google tokens removed");
    println!("Disconnected from Google Calendar.");
    Ok(())
}

/// Where the credentials were resolved from.
#[derive(Debug, PartialEq)]
enum CredentialSource {
    /// `--client-id`/`--client-secret` or `--credentials-file`
    Cli,
    /// Already in config.toml
    Config,
}

/// Writes credentials under `[google]`, keeping the rest of the file as is.
///
/// Returns false when nothing needed saving. Secret references already in
/// the file are never replaced by their resolved values.
fn save_credentials_to_config(
    config_path: &Path,
    client_id: &str,
    client_secret: &str,
    source: &CredentialSource,
) -> ClientResult<bool> {
    if *source == CredentialSource::Config {
        return Ok(false);
    }

    let content = if config_path.exists() {
        std::fs::read_to_string(config_path)?
    } else {
        String::new()
    };
    let mut doc = content.parse::<toml_edit::DocumentMut>().map_err(|e| {
        ClientError::Config(format!(
            "could not parse {} for writing: {}",
            config_path.display(),
            e
        ))
    })?;

    if !doc.contains_key("google") {
        doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
    }
    let google = doc["google"].as_table_mut().ok_or_else(|| {
        ClientError::Config(format!("`google` in {} is not a table", config_path.display()))
    })?;
    google["client_id"] = toml_edit::value(client_id);
    google["client_secret"] = toml_edit::value(client_secret);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(config_path, doc.to_string())?;

    info!(path = %config_path.display(), "credentials saved");
    println!("Credentials saved to {}", config_path.display());
    Ok(true)
}

/// Resolves Google credentials.
///
/// Priority (highest to lowest):
/// 1. `--client-id` + `--client-secret`
/// 2. `--credentials-file` (Google Cloud Console JSON)
/// 3. `[google]` in config.toml, with secret references expanded
fn resolve_google_credentials(
    cli_client_id: Option<String>,
    cli_client_secret: Option<String>,
    cli_credentials_file: Option<PathBuf>,
    config_google: Option<&GoogleSettings>,
    config_path: &Path,
) -> ClientResult<(String, String, CredentialSource)> {
    if let (Some(id), Some(secret)) = (&cli_client_id, &cli_client_secret) {
        return Ok((id.clone(), secret.clone(), CredentialSource::Cli));
    }

    if let Some(ref path) = cli_credentials_file {
        let creds = OAuthCredentials::from_file(path).map_err(|e| {
            ClientError::Config(format!(
                "failed to load credentials from {}: {}",
                path.display(),
                e
            ))
        })?;
        return Ok((creds.client_id, creds.client_secret, CredentialSource::Cli));
    }

    if cli_client_id.is_some() || cli_client_secret.is_some() {
        return Err(ClientError::InvalidInput(
            "both --client-id and --client-secret are required when providing credentials directly"
                .to_string(),
        ));
    }

    if let Some(google) = config_google
        && google.client_id.is_some()
        && google.client_secret.is_some()
    {
        let creds = google.resolve_credentials(config_path)?;
        return Ok((creds.client_id, creds.client_secret, CredentialSource::Config));
    }

    warn!("no Google credentials configured");
    Err(ClientError::Config(format!(
        "Google credentials are required. Provide via:\n  \
         - client_id + client_secret under [google] in {}\n  \
         - --client-id and --client-secret flags\n  \
         - --credentials-file flag (path to Google Cloud Console JSON)\n  \
         - GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET env vars",
        config_path.display()
    )))
}
