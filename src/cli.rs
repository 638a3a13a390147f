// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands, their arguments, and the global output flags.

use clap::{Parser, Subcommand};
use slotctl::backup::BackupKind;
use slotctl::health::ReportMode;
use slotctl::rollback::RollbackMode;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "slotctl")]
#[command(about = "Blue/green container rollout with layered rollback for a single host")]
#[command(version)]
pub struct Cli {
    /// Config file (default: slotctl.yml in the current directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON events instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a new slotctl.yml into the current directory
    Init {
        /// Service name
        #[arg(long)]
        service: Option<String>,

        /// Image repository, e.g. ghcr.io/org/app
        #[arg(long)]
        image: Option<String>,

        /// Overwrite an existing slotctl.yml
        #[arg(long)]
        force: bool,
    },

    /// Roll an image out to the inactive slot and switch production to it
    Deploy {
        /// Environment (defined in config)
        environment: String,

        /// Tag of the configured repository, or a full image reference
        image: String,

        /// Break a live lease held by another invocation
        #[arg(long)]
        force: bool,
    },

    /// Return production to the previous image, or to the last data backup
    Rollback {
        /// Environment (defined in config)
        environment: String,

        /// auto, container, or backup
        #[arg(long, default_value_t = RollbackMode::Auto)]
        mode: RollbackMode,

        /// Break a live lease held by another invocation
        #[arg(long)]
        force: bool,
    },

    /// Check the slot currently serving production
    Health {
        /// Environment (defined in config)
        environment: String,

        /// container, http, resources, logs, load, or full
        #[arg(long, default_value_t = ReportMode::Full)]
        mode: ReportMode,
    },

    /// Create, list, or prune backups
    Backup {
        /// Environment (defined in config)
        environment: String,

        /// data, config, database, image, or full
        #[arg(long, default_value_t = BackupKind::Data)]
        kind: BackupKind,

        /// List backups of the selected kind instead of creating one
        #[arg(long, conflicts_with = "prune")]
        list: bool,

        /// Apply the retention policy to all kinds
        #[arg(long)]
        prune: bool,

        /// Break a live lease held by another invocation
        #[arg(long)]
        force: bool,
    },
}
