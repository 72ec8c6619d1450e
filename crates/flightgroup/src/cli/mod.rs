//! Command-line interface of the `flightgroup` binary.

mod commands;
mod input;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ConnectCommand, HistoryCommand, IdentityCommand};
pub use input::{parse_line, Input, HELP};

use crate::logging::Verbosity;

/// flightgroup - fly together
///
/// Shares position, chat and a common flight plan with the pilots of your
/// group through a relay server.
#[derive(Debug, Parser)]
#[command(name = "flightgroup")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to the relay and fly with your group.
    ///
    /// Lines typed on stdin are sent as chat. `/join <id>`, `/leave`,
    /// `/split`, `/status` and `/quit` control the session.
    Connect(ConnectCommand),

    /// Inspect or reset the local identity
    #[command(subcommand)]
    Identity(IdentityCommand),

    /// Show stored chat history
    History(HistoryCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Logging verbosity selected by the flags.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flags(self.quiet, self.verbose)
    }
}
