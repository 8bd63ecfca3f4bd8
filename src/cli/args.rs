// file: src/cli/args.rs
// version: 1.0.0
// guid: 93f0b2d6-1c7e-4a58-b3e9-d64a8c05f217

//! Command line argument definitions

use crate::logging::DEFAULT_LOG_FILE;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "tunnel-provisioner")]
#[command(about = "Provision this host to run a tunnel server under systemd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[arg(short, long, global = true, help = "YAML file overriding the built-in settings")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = DEFAULT_LOG_FILE, help = "Append-only log file")]
    pub log_file: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[arg(long, global = true, help = "Answer no to the post-install questions")]
    pub non_interactive: bool,

    #[arg(long, global = true, help = "Write a JSON report of the run to this path")]
    pub report: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the full provisioning procedure (default)
    Provision,

    /// Check that required commands are installed, change nothing
    CheckPrereqs,

    /// Print the effective configuration as YAML
    ShowConfig,
}

impl Cli {
    /// The subcommand to run; no subcommand means a full provisioning run
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Provision)
    }
}
