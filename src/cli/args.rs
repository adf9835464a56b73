//! CLI argument definitions using clap.
//!
//! Commands:
//! - relaygate check-config <path>
//! - relaygate inspect-journal <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// relaygate - database proxy core
#[derive(Parser, Debug)]
#[command(name = "relaygate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate a monitor/router configuration file
    ///
    /// The file holds one `key=value` per line; `#` starts a comment.
    /// Monitor settings and `router_options` are both validated.
    CheckConfig {
        /// Path to the configuration file
        config: PathBuf,
    },

    /// Decode a monitor journal file and print its records
    InspectJournal {
        /// Path to a monitor.dat journal file
        journal: PathBuf,
    },
}
