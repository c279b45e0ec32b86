//! `vaultsync pull|push|sync`: one-shot repository operations.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use vaultsync_git::RepositoryController;

fn controller(home: &Path) -> Result<(RepositoryController, vaultsync_daemon::logging::LogGuard)> {
    let settings = super::load_settings(home)?;
    let guard = super::console_logging(&settings.config)?;
    let config = &settings.config;
    let repository = RepositoryController::new(
        &config.git,
        &config.vault.path,
        settings.remote_url.as_str(),
        config.vault.branch.as_str(),
    );
    repository.setup_outcome().context("git setup failed")?;
    Ok((repository, guard))
}

pub fn pull(home: &Path) -> Result<()> {
    let (repository, _log) = controller(home)?;
    let outcome = repository.pull_outcome().context("pull failed")?;
    println!("{} Pull: {outcome}", "✓".green());
    Ok(())
}

pub fn push(home: &Path) -> Result<()> {
    let (repository, _log) = controller(home)?;
    let outcome = repository.push_outcome().context("push failed")?;
    println!("{} Push: {outcome}", "✓".green());
    Ok(())
}

pub fn sync(home: &Path) -> Result<()> {
    let (repository, _log) = controller(home)?;
    let outcome = repository.sync_outcome().context("sync failed")?;
    println!("{} Pull: {}", "✓".green(), outcome.pull);
    println!("{} Push: {}", "✓".green(), outcome.push);
    Ok(())
}
