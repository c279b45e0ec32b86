//! VaultSync: keeps an Obsidian vault in sync with a git remote.
//!
//! # Usage
//!
//! ```text
//! vaultsync [--home DIR] run|start|stop
//! vaultsync [--home DIR] status [--json]
//! vaultsync [--home DIR] config|check
//! vaultsync [--home DIR] setup [--vault-path PATH] [--sync-mode MODE] ...
//! vaultsync [--home DIR] autorun enable|disable|status
//! vaultsync [--home DIR] backup list [--json]|create|restore NAME [--target DIR]|delete NAME
//! vaultsync [--home DIR] pull|push|sync
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{autorun::AutorunCommand, backup::BackupCommand, service::StatusArgs, settings::SetupArgs};
use vaultsync_core::paths;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "vaultsync",
    version,
    about = "Sync an Obsidian vault with git around application sessions",
    long_about = None,
)]
struct Cli {
    /// Directory holding config.yaml and .env. Defaults to $VAULTSYNC_HOME,
    /// then <config dir>/vaultsync.
    #[arg(long, global = true, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run in the foreground until Ctrl-C.
    Run,

    /// Start a detached background instance.
    Start,

    /// Stop the background instance.
    Stop,

    /// Show background process, autorun and application state.
    Status(StatusArgs),

    /// Show the configuration with credentials masked.
    Config,

    /// Validate the configuration and external requirements.
    Check,

    /// Update config.yaml and .env.
    Setup(SetupArgs),

    /// Manage start at login.
    Autorun {
        #[command(subcommand)]
        command: AutorunCommand,
    },

    /// Manage vault snapshots.
    Backup {
        #[command(subcommand)]
        command: BackupCommand,
    },

    /// Pull remote changes once.
    Pull,

    /// Commit and push local changes once.
    Push,

    /// Pull, then push.
    Sync,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let home = match cli.home {
        Some(home) => home,
        None => paths::base_dir().context("could not determine the VaultSync home directory")?,
    };

    match cli.command {
        Commands::Run => commands::service::run(&home),
        Commands::Start => commands::service::start(&home),
        Commands::Stop => commands::service::stop(&home),
        Commands::Status(args) => args.run(&home),
        Commands::Config => commands::settings::show(&home),
        Commands::Check => commands::settings::check(&home),
        Commands::Setup(args) => args.run(&home),
        Commands::Autorun { command } => commands::autorun::run(&home, command),
        Commands::Backup { command } => commands::backup::run(&home, command),
        Commands::Pull => commands::repo::pull(&home),
        Commands::Push => commands::repo::push(&home),
        Commands::Sync => commands::repo::sync(&home),
    }
}
