use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_URL_WAIT_SECS: u64 = 30;

/// Hosts the Kolibri learning server for Endless Key.
#[derive(Debug, Parser)]
#[command(name = "endless-key", version, about = "Endless Key device host")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand, Default)]
pub enum Command {
    /// Run the server and worker until interrupted (default).
    #[default]
    Serve,

    /// Extract a content archive into the home directory.
    Import {
        /// Zip archive with entries under `content/`.
        archive: PathBuf,
    },

    /// Print the running server's URL, waiting for it to come up.
    Url {
        #[arg(long, default_value_t = DEFAULT_URL_WAIT_SECS)]
        wait_secs: u64,
    },
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or_default()
    }
}
