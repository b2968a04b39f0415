// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: `hostbased <user> <host:port> <command>` plus helper and fallback options.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hostbased")]
#[command(about = "Run a remote command over SSH using hostbased authentication")]
#[command(version)]
pub struct Cli {
    /// Remote user to log in as
    pub user: String,

    /// Server address as host, host:port or [v6addr]:port
    pub address: String,

    /// Command to run on the server
    pub command: String,

    /// Configuration file (default: ~/.config/hostbased/config.yml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Path to the ssh-keysign helper
    #[arg(long)]
    pub keysign: Option<PathBuf>,

    /// Maximum time to wait for the helper, e.g. "10s"
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub helper_timeout: Option<Duration>,

    /// Private key for publickey fallback (repeatable)
    #[arg(short = 'i', long = "identity")]
    pub identity_files: Vec<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
