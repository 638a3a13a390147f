// ABOUTME: Entry point for the slotctl CLI application.
// ABOUTME: Parses arguments, installs logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::BackupAction;
use slotctl::config::Config;
use slotctl::error::{Error, Result};
use slotctl::output::{Output, OutputMode};
use std::env;
use std::path::Path;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

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

    let mode = OutputMode::from_flags(cli.quiet, cli.json);
    if let Err(e) = run(cli, mode).await {
        Output::new(mode).error(&e.to_string());
        tracing::debug!(kind = ?e.kind(), "command failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    match cli.command {
        Commands::Init {
            service,
            image,
            force,
        } => commands::init(service.as_deref(), image.as_deref(), force, &output),
        Commands::Deploy {
            environment,
            image,
            force,
        } => {
            let config = load_config(cli.config.as_deref())?;
            commands::deploy(&config, &environment, &image, force, output).await
        }
        Commands::Rollback {
            environment,
            mode,
            force,
        } => {
            let config = load_config(cli.config.as_deref())?;
            commands::rollback(&config, &environment, mode, force, output).await
        }
        Commands::Health { environment, mode } => {
            let config = load_config(cli.config.as_deref())?;
            commands::health(&config, &environment, mode, output).await
        }
        Commands::Backup {
            environment,
            kind,
            list,
            prune,
            force,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let action = BackupAction::from_flags(list, prune);
            commands::backup(&config, &environment, kind, action, force, output).await
        }
    }
}

/// `--config` if given, else discovery in the current directory.
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) if !path.exists() => return Err(Error::ConfigNotFound(path.to_path_buf())),
        Some(path) => Config::load(path)?,
        None => Config::discover(&env::current_dir()?)?,
    };
    config.validate()?;
    Ok(config)
}
