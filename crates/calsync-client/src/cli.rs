//! Command-line interface definition.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

/// calsync - keep a local calendar in step with Google Calendar
#[derive(Debug, Parser)]
#[command(name = "calsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "CALSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Emit JSON logs, for cron jobs and systemd timers
    #[arg(long)]
    pub log_json: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Authentication commands
    Auth {
        #[command(subcommand)]
        provider: AuthProvider,
    },

    /// Refresh the calendar list and synchronize enabled calendars
    Sync {
        /// Ignore stored sync cursors and pull the whole window
        #[arg(long)]
        full: bool,

        /// Only synchronize this calendar
        #[arg(long)]
        calendar: Option<String>,
    },

    /// Known calendars
    Calendars {
        #[command(subcommand)]
        action: CalendarsAction,
    },

    /// Local events
    Events {
        #[command(subcommand)]
        action: EventsAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Authentication providers.
#[derive(Debug, Subcommand)]
pub enum AuthProvider {
    /// Authenticate with Google Calendar
    Google {
        /// OAuth client ID (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_ID")]
        client_id: Option<String>,

        /// OAuth client secret (from Google Cloud Console)
        #[arg(long, env = "GOOGLE_CLIENT_SECRET")]
        client_secret: Option<String>,

        /// Path to Google Cloud Console credentials JSON file
        ///
        /// This is the JSON file downloaded from the Google Cloud Console
        /// OAuth 2.0 credentials page. Alternative to providing client_id
        /// and client_secret separately.
        #[arg(long, env = "GOOGLE_CREDENTIALS_FILE")]
        credentials_file: Option<PathBuf>,

        /// Force re-authentication even if already authenticated
        #[arg(long, short)]
        force: bool,

        /// Forget stored tokens instead of authenticating
        #[arg(long, conflicts_with = "force")]
        disconnect: bool,
    },
}

/// Calendar actions.
#[derive(Debug, Subcommand)]
pub enum CalendarsAction {
    /// List known calendars
    List,

    /// Include a calendar in sync runs
    Enable {
        /// Remote calendar ID
        id: String,
    },

    /// Exclude a calendar from sync runs
    Disable {
        /// Remote calendar ID
        id: String,
    },
}

/// Event actions.
#[derive(Debug, Subcommand)]
pub enum EventsAction {
    /// List local events
    List {
        /// Only events belonging to this calendar
        #[arg(long)]
        calendar: Option<String>,

        /// Only events on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Only events on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },

    /// Create a local event, pushed on the next sync
    Add {
        /// Day of the event (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,

        #[arg(long)]
        title: String,

        #[command(flatten)]
        times: TimeArgs,

        /// Calendar the event is created in
        #[arg(long)]
        calendar: String,
    },

    /// Edit a local event
    Edit {
        /// Local event ID
        id: String,

        #[arg(long)]
        date: Option<NaiveDate>,

        #[arg(long)]
        title: Option<String>,

        #[command(flatten)]
        times: TimeArgs,

        /// Make the event all-day, dropping its times
        #[arg(long, conflicts_with_all = ["start", "end"])]
        all_day: bool,
    },

    /// Delete a local event and, once synced, its remote copy
    Delete {
        /// Local event ID
        id: String,
    },
}

/// Time-of-day flags shared by `events add` and `events edit`.
#[derive(Debug, Clone, Default, Args)]
pub struct TimeArgs {
    /// Start time (HH:MM)
    #[arg(long)]
    pub start: Option<String>,

    /// End time (HH:MM)
    #[arg(long)]
    pub end: Option<String>,
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration and data file paths
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("calsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn sync_flags() {
        let cli = parse(&["sync", "--full", "--calendar", "work@example.com"]);
        match cli.command {
            Command::Sync { full, calendar } => {
                assert!(full);
                assert_eq!(calendar.as_deref(), Some("work@example.com"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn events_add() {
        let cli = parse(&[
            "events", "add", "--date", "2026-06-01", "--title", "Standup", "--start", "09:00",
            "--end", "09:15", "--calendar", "primary",
        ]);
        match cli.command {
            Command::Events {
                action:
                    EventsAction::Add {
                        date,
                        title,
                        times,
                        calendar,
                    },
            } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 6, 1).unwrap());
                assert_eq!(title, "Standup");
                assert_eq!(times.start.as_deref(), Some("09:00"));
                assert_eq!(times.end.as_deref(), Some("09:15"));
                assert_eq!(calendar, "primary");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn all_day_conflicts_with_times() {
        let result = Cli::try_parse_from([
            "calsync", "events", "edit", "abc", "--all-day", "--start", "09:00",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn json_is_global() {
        let cli = parse(&["calendars", "list", "--json"]);
        assert!(cli.json);
    }

    #[test]
    fn bad_date_is_rejected() {
        let result = Cli::try_parse_from(["calsync", "events", "list", "--from", "June"]);
        assert!(result.is_err());
    }
}
