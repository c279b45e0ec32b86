//! `vaultsync backup`: list, create, restore and delete vault snapshots.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use vaultsync_backup::{BackupOutcome, SnapshotManager};

#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// List snapshots, newest first.
    List(ListArgs),
    /// Take a snapshot of the vault now.
    Create,
    /// Copy a snapshot back over the vault or into another directory.
    Restore(RestoreArgs),
    /// Delete one snapshot.
    Delete {
        /// Snapshot name as shown by `backup list`.
        name: String,
    },
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Snapshot name as shown by `backup list`.
    pub name: String,

    /// Restore here instead of the vault.
    #[arg(long, value_name = "DIR")]
    pub target: Option<PathBuf>,
}

#[derive(Tabled)]
struct SnapshotRow {
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "created")]
    created: String,
    #[tabled(rename = "size")]
    size: String,
}

pub fn run(home: &Path, command: BackupCommand) -> Result<()> {
    let config = super::load_config(home)?;
    let manager = SnapshotManager::new(&config.backup, &config.vault.path);

    match command {
        BackupCommand::List(args) => list(&manager, args.json),
        BackupCommand::Create => {
            let _log = super::console_logging(&config)?;
            match manager.create_backup_outcome().context("backup failed")? {
                BackupOutcome::Skipped => {
                    println!("Backups are disabled; enable them with `vaultsync setup --backup enable`");
                }
                BackupOutcome::Created {
                    snapshot,
                    pruned,
                    unpruned,
                } => {
                    println!(
                        "{} Created {} ({})",
                        "✓".green(),
                        snapshot.name,
                        super::human_bytes(snapshot.size_bytes)
                    );
                    for name in pruned {
                        println!("  Removed old snapshot {name}");
                    }
                    for name in unpruned {
                        println!("  {} Could not remove old snapshot {name}", "!".yellow());
                    }
                }
            }
            Ok(())
        }
        BackupCommand::Restore(args) => {
            let _log = super::console_logging(&config)?;
            let restored = manager
                .restore_outcome(&args.name, args.target.as_deref())
                .with_context(|| format!("failed to restore '{}'", args.name))?;
            println!("{} Restored {} to {}", "✓".green(), args.name, restored.display());
            Ok(())
        }
        BackupCommand::Delete { name } => {
            manager
                .delete_outcome(&name)
                .with_context(|| format!("failed to delete '{name}'"))?;
            println!("{} Deleted {name}", "✓".green());
            Ok(())
        }
    }
}

fn list(manager: &SnapshotManager, json: bool) -> Result<()> {
    let snapshots = manager.list_backups();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshots).context("failed to serialize backup list")?
        );
        return Ok(());
    }

    if snapshots.is_empty() {
        println!("No backups in {}", manager.directory().display());
        return Ok(());
    }

    println!("{} backup(s) in {}", snapshots.len(), manager.directory().display());
    let rows: Vec<SnapshotRow> = snapshots
        .into_iter()
        .map(|snapshot| SnapshotRow {
            created: snapshot.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            size: super::human_bytes(snapshot.size_bytes),
            name: snapshot.name,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}
