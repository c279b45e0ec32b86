//! `vaultsync autorun`: start at login.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use vaultsync_daemon::platform_autorun;

#[derive(Subcommand, Debug)]
pub enum AutorunCommand {
    /// Register VaultSync to start at login.
    Enable,
    /// Remove the login registration.
    Disable,
    /// Show whether the login registration exists.
    Status,
}

pub fn run(home: &Path, command: AutorunCommand) -> Result<()> {
    let autorun = platform_autorun(home).context("autorun is not available on this platform")?;

    match command {
        AutorunCommand::Enable => {
            super::load_settings(home)?;
            autorun.enable().context("failed to enable autorun")?;
            println!("{} Autorun enabled: {}", "✓".green(), autorun.location());
        }
        AutorunCommand::Disable => {
            autorun.disable().context("failed to disable autorun")?;
            println!("{} Autorun disabled", "✓".green());
        }
        AutorunCommand::Status => {
            if autorun.is_enabled() {
                println!("Autorun: {}", "ENABLED".green().bold());
            } else {
                println!("Autorun: {}", "DISABLED".bright_black().bold());
            }
            println!("  Location: {}", autorun.location());
        }
    }
    Ok(())
}
