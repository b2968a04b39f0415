// ABOUTME: Entry point for the hostbased CLI application.
// ABOUTME: Connects, authenticates, runs one remote command, and prints its output.

mod cli;

use clap::Parser;
use cli::Cli;
use hostbased::config::{Config, Target};
use hostbased::error::{Error, Result};
use hostbased::ssh::{Session, SessionConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let target = Target::parse(&cli.address)?;
    let config = apply_overrides(Config::discover(cli.config.as_deref())?, &cli);

    let mut ssh_config = SessionConfig::new(&target.host, &cli.user)
        .port(target.port)
        .helper(config.helper_config())
        .command_timeout(config.command_timeout);
    for key in &config.identity_files {
        ssh_config = ssh_config.identity_file(key);
    }

    tracing::debug!("connecting to {} as {}", target, cli.user);
    let session = Session::connect(ssh_config).await?;

    let output = session.exec(&cli.command).await;

    // Always release the connection, even when the command failed
    if let Err(e) = session.disconnect().await {
        tracing::warn!("failed to disconnect cleanly: {}", e);
    }

    let output = output?;
    println!("{}", output.combined);

    if !output.success() {
        return Err(Error::RemoteCommand(output.exit_code));
    }
    Ok(())
}

/// Command-line flags win over the configuration file.
fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(path) = &cli.keysign {
        config.keysign = path.clone();
    }
    if let Some(timeout) = cli.helper_timeout {
        config.helper_timeout = timeout;
    }
    if !cli.identity_files.is_empty() {
        config.identity_files = cli.identity_files.clone();
    }
    config
}
