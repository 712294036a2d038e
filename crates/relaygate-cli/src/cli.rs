//! Command-line definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "relaygate", version, about = "Relay gateway for platform-agnostic message envelopes")]
pub struct Cli {
    /// Path to the gateway config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the gateway daemon.
    Run,
    /// Inspect installed adapters.
    Adapters {
        #[command(subcommand)]
        command: AdaptersCommand,
    },
    /// Decode an envelope payload and print it as JSON.
    Decode {
        /// File holding the raw envelope bytes, `-` for stdin.
        file: PathBuf,
    },
}

#[derive(Subcommand)]
pub enum AdaptersCommand {
    /// List installed adapter manifests.
    List,
}
