//! calsync CLI entry point.

use std::path::Path;
use std::process::ExitCode;

use calsync_core::{TracingConfig, init_tracing};
use calsync_engine::SyncOptions;
use clap::Parser;

use calsync_client::cli::{
    AuthProvider, CalendarsAction, Cli, Command, ConfigAction, EventsAction,
};
use calsync_client::commands::{self, auth::GoogleAuthArgs, events::EventEdit, events::EventFilter};
use calsync_client::config::ClientConfig;
use calsync_client::error::ClientResult;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if cli.config.is_some() {
        ClientConfig::load_from(&config_path)
    } else {
        ClientConfig::load(&config_path)
    };

    let debug = cli.debug || config.as_ref().is_ok_and(|c| c.debug);
    let tracing_config = if cli.log_json {
        TracingConfig::unattended()
    } else if debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    let result = match config {
        Ok(config) => run(cli, config, &config_path).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run(cli: Cli, config: ClientConfig, config_path: &Path) -> ClientResult<()> {
    let json = cli.json;

    match cli.command {
        Command::Auth { provider } => match provider {
            AuthProvider::Google {
                disconnect: true, ..
            } => commands::auth::disconnect(&config),
            AuthProvider::Google {
                client_id,
                client_secret,
                credentials_file,
                force,
                ..
            } => {
                let args = GoogleAuthArgs {
                    client_id,
                    client_secret,
                    credentials_file,
                    force,
                };
                commands::auth::google(args, &config, config_path).await
            }
        },
        Command::Sync { full, calendar } => {
            let options = SyncOptions {
                force_full: full,
                calendar,
            };
            commands::sync::run(options, &config, config_path, json).await
        }
        Command::Calendars { action } => match action {
            CalendarsAction::List => commands::calendars::list(&config, json),
            CalendarsAction::Enable { id } => commands::calendars::set_enabled(&config, &id, true),
            CalendarsAction::Disable { id } => {
                commands::calendars::set_enabled(&config, &id, false)
            }
        },
        Command::Events { action } => match action {
            EventsAction::List { calendar, from, to } => {
                let filter = EventFilter { calendar, from, to };
                commands::events::list(&config, &filter, json)
            }
            EventsAction::Add {
                date,
                title,
                times,
                calendar,
            } => commands::events::add(&config, date, title, &times, &calendar),
            EventsAction::Edit {
                id,
                date,
                title,
                times,
                all_day,
            } => {
                let edit = EventEdit {
                    date,
                    title,
                    times,
                    all_day,
                };
                commands::events::edit(&config, &id, edit)
            }
            EventsAction::Delete { id } => commands::events::delete(&config, &id),
        },
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, config_path),
            ConfigAction::Validate => commands::config::validate(&config, config_path),
            ConfigAction::Path => commands::config::path(&config, config_path),
        },
    }
}
