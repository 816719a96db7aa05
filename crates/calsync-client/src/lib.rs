//! The `calsync` command-line interface.
//!
//! Configuration, secret resolution and the `auth`, `sync`, `calendars`,
//! `events` and `config` subcommands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;

pub use cli::Cli;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
