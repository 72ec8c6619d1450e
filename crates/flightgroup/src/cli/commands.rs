//! CLI command definitions.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Arguments of `connect`.
#[derive(Debug, Args)]
pub struct ConnectCommand {
    /// Relay address (`host:port`), overriding the configuration
    #[arg(short, long, value_name = "ADDR")]
    pub server: Option<String>,

    /// Group id or pilot id to join after logging in
    #[arg(short, long, value_name = "TOKEN")]
    pub invite: Option<String>,

    /// Display name used if this is the first registration
    #[arg(short, long)]
    pub name: Option<String>,

    /// Poll pilot online status every N seconds (0 disables)
    #[arg(long, value_name = "SECS")]
    pub status_poll: Option<u64>,
}

/// Local identity commands.
#[derive(Debug, Subcommand)]
pub enum IdentityCommand {
    /// Show the stored identity and group
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print an invite link other pilots can follow
    Invite {
        /// Base URL of the web client
        #[arg(long, default_value = "https://flightgroup.app/")]
        base: String,
    },

    /// Forget the credentials so the next connection registers again
    Reset {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

/// Arguments of `history`.
#[derive(Debug, Args)]
pub struct HistoryCommand {
    /// Maximum number of messages
    #[arg(short, long, default_value = "20")]
    pub limit: usize,

    /// Group to show (defaults to the stored group)
    #[arg(short, long)]
    pub group: Option<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Print the default configuration file path
    Path,

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
