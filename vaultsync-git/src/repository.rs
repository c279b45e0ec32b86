//! Repository setup and the pull / push / sync protocol for one vault.
//!
//! # Protocol
//!
//! ```text
//! pull: integrity -> remote branch? -> fetch -> divergence
//!         -> up to date | stash? -> fast-forward or rebase -> restore stash
//! push: integrity -> changes? -> add -> commit
//!         -> fetch + rebase when behind -> push (-u on first push)
//! ```
//!
//! Conflicts are never resolved automatically. A failed rebase is aborted and
//! a conflicting stash is left in place so no local change is lost. Nothing
//! is pulled or committed while a rebase is still in progress.
//!
//! The `*_outcome` methods return typed results; `setup`, `pull`, `push` and
//! `sync` wrap them, log any error and return a success flag.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use vaultsync_core::{GitConfig, IgnoreGroups};

use crate::classify::classify_push_failure;
use crate::error::GitError;
use crate::ignore::{write_ignore_file, IgnoreWrite};
use crate::runner::{CommandResult, CommandRunner};
use crate::status::{repo_identity, ChangeSummary, DivergenceReport, IntegrationStrategy};

const INTEGRITY_TIMEOUT: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAction {
    Added,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetupReport {
    /// A new repository was initialized.
    pub initialized: bool,
    pub remote: RemoteAction,
    /// `None` when writing the ignore file failed (logged, not fatal).
    pub ignore: Option<IgnoreWrite>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// The branch does not exist on the remote yet.
    NoRemoteBranch,
    UpToDate,
    Integrated {
        strategy: IntegrationStrategy,
        /// Remote commits brought in.
        behind: u32,
        /// Local changes were stashed and restored around the integration.
        stashed: bool,
    },
}

impl fmt::Display for PullOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PullOutcome::NoRemoteBranch => write!(f, "remote branch does not exist yet"),
            PullOutcome::UpToDate => write!(f, "already up to date"),
            PullOutcome::Integrated {
                strategy, behind, ..
            } => write!(f, "integrated {behind} remote commit(s) by {strategy}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Working tree was clean.
    NothingToPush,
    /// Staging produced no diff, e.g. only ignored files changed.
    NothingStaged,
    Pushed {
        /// The branch was created on the remote with upstream tracking.
        first_push: bool,
        /// Remote commits were rebased in before pushing.
        presynced: bool,
    },
}

impl fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PushOutcome::NothingToPush => write!(f, "no local changes to push"),
            PushOutcome::NothingStaged => write!(f, "nothing to commit after staging"),
            PushOutcome::Pushed { first_push: true, .. } => write!(f, "created remote branch"),
            PushOutcome::Pushed { presynced: true, .. } => write!(f, "pushed after syncing with remote"),
            PushOutcome::Pushed { .. } => write!(f, "pushed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pull: PullOutcome,
    pub push: PushOutcome,
}

// ---------------------------------------------------------------------------
// RepositoryController
// ---------------------------------------------------------------------------

/// Drives git for a single vault and branch against `origin`.
#[derive(Debug, Clone)]
pub struct RepositoryController {
    runner: CommandRunner,
    vault: PathBuf,
    remote_url: String,
    branch: String,
    user_name: String,
    user_email: String,
    ignore_groups: IgnoreGroups,
}

impl RepositoryController {
    pub fn new(
        config: &GitConfig,
        vault: impl Into<PathBuf>,
        remote_url: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        let vault = vault.into();
        Self {
            runner: CommandRunner::new(&vault, config.command_timeout()),
            vault,
            remote_url: remote_url.into(),
            branch: branch.into(),
            user_name: config.user_name.clone(),
            user_email: config.user_email.clone(),
            ignore_groups: config.gitignore.clone(),
        }
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    pub fn vault(&self) -> &Path {
        &self.vault
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    // -----------------------------------------------------------------------
    // Boolean surface
    // -----------------------------------------------------------------------

    pub fn setup(&self) -> bool {
        report("setup", self.setup_outcome(), |r| {
            tracing::info!(initialized = r.initialized, remote = ?r.remote, "repository ready")
        })
    }

    pub fn pull(&self) -> bool {
        report("pull", self.pull_outcome(), |o| tracing::info!(outcome = %o, "pull complete"))
    }

    pub fn push(&self) -> bool {
        report("push", self.push_outcome(), |o| tracing::info!(outcome = %o, "push complete"))
    }

    pub fn sync(&self) -> bool {
        report("sync", self.sync_outcome(), |o| {
            tracing::info!(pull = %o.pull, push = %o.push, "synchronization complete")
        })
    }

    // -----------------------------------------------------------------------
    // Setup
    // -----------------------------------------------------------------------

    /// Idempotent: init if needed, identity, `origin`, `.gitignore`.
    pub fn setup_outcome(&self) -> Result<SetupReport, GitError> {
        if !self.runner.is_available() {
            return Err(GitError::Unavailable);
        }
        tracing::info!(vault = %self.vault.display(), "setting up repository");

        let initialized = !self.has_metadata();
        if initialized {
            tracing::info!("initializing new repository");
            self.require(self.git(&["init"], "Git init"))?;
            let head = format!("refs/heads/{}", self.branch);
            if !self.git(&["symbolic-ref", "HEAD", head.as_str()], "Set default branch").success {
                tracing::warn!(branch = %self.branch, "could not set default branch");
            }
        }

        self.configure_identity();
        let remote = self.configure_remote()?;

        let ignore = match write_ignore_file(&self.vault, &self.ignore_groups) {
            Ok(write) => Some(write),
            Err(e) => {
                tracing::error!(error = %e, "failed to write ignore file");
                None
            }
        };

        Ok(SetupReport {
            initialized,
            remote,
            ignore,
        })
    }

    fn configure_identity(&self) {
        for (key, value) in [("user.name", &self.user_name), ("user.email", &self.user_email)] {
            if self.git(&["config", key, value.as_str()], "Set identity").success {
                tracing::debug!(key, value = %value, "git identity configured");
            }
        }
    }

    fn configure_remote(&self) -> Result<RemoteAction, GitError> {
        let current = self.git(&["remote", "get-url", "origin"], "Check remote");
        if !current.success {
            tracing::info!("adding remote origin");
            self.require(self.git(&["remote", "add", "origin", self.remote_url.as_str()], "Add remote"))?;
            return Ok(RemoteAction::Added);
        }

        if repo_identity(current.stdout.trim()) == repo_identity(&self.remote_url) {
            tracing::debug!("remote URL already correct");
            return Ok(RemoteAction::Unchanged);
        }

        tracing::info!("updating remote URL");
        self.require(self.git(
            &["remote", "set-url", "origin", self.remote_url.as_str()],
            "Update remote",
        ))?;
        Ok(RemoteAction::Updated)
    }

    // -----------------------------------------------------------------------
    // Pull
    // -----------------------------------------------------------------------

    pub fn pull_outcome(&self) -> Result<PullOutcome, GitError> {
        tracing::info!(branch = %self.branch, "pulling changes from remote");
        self.verify_integrity()?;

        if !self.remote_branch_exists() {
            tracing::info!("remote branch does not exist yet");
            return Ok(PullOutcome::NoRemoteBranch);
        }

        let fetch = self.runner.run_on_worker(
            &["fetch", "origin", self.branch.as_str()],
            "Fetch remote changes",
            Some(self.runner.default_timeout() / 2),
        );
        if !fetch.success {
            if fetch.stderr.to_lowercase().contains("couldn't find remote ref") {
                return Ok(PullOutcome::NoRemoteBranch);
            }
            return Err(command_error("Fetch remote changes", fetch));
        }

        let divergence = self.divergence();
        let Some(strategy) = divergence.pull_strategy() else {
            return Ok(PullOutcome::UpToDate);
        };
        tracing::info!(
            behind = divergence.behind,
            ahead = divergence.ahead,
            "remote has new commits"
        );

        let stashed = self.stash_local_changes()?;

        let integrate = match strategy {
            IntegrationStrategy::Rebase => self.runner.run_on_worker(
                &["pull", "--rebase", "origin", self.branch.as_str()],
                "Pull with rebase",
                None,
            ),
            IntegrationStrategy::FastForward => self.runner.run_on_worker(
                &["pull", "--ff-only", "origin", self.branch.as_str()],
                "Fast-forward pull",
                None,
            ),
        };

        if !integrate.success {
            return Err(self.recover_failed_integration(integrate, stashed));
        }

        if stashed {
            self.restore_stash()?;
        }
        Ok(PullOutcome::Integrated {
            strategy,
            behind: divergence.behind,
            stashed,
        })
    }

    /// Stash uncommitted and untracked changes. Returns whether a stash exists.
    fn stash_local_changes(&self) -> Result<bool, GitError> {
        let Some(changes) = self.local_changes() else {
            return Ok(false);
        };
        tracing::info!(changes = %changes, "found local changes");
        if !self.has_commits() {
            return Ok(false);
        }

        let message = format!(
            "Auto-stash before pull {}",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        let stash = self.git(&["stash", "push", "-u", "-m", message.as_str()], "Stash changes");
        if !stash.success {
            return Err(GitError::StashFailed {
                stderr: stash.stderr.trim().to_string(),
            });
        }
        tracing::info!("stashed local changes");
        Ok(true)
    }

    /// Pop the auto-stash. A conflicting pop leaves the stash in place.
    fn restore_stash(&self) -> Result<(), GitError> {
        let pop = self.git(&["stash", "pop"], "Restore stash");
        if pop.success {
            return Ok(());
        }
        let text = format!("{}\n{}", pop.stdout, pop.stderr).to_lowercase();
        if text.contains("conflict") || text.contains("merge") {
            return Err(GitError::StashRestoreConflict {
                stderr: pop.stderr.trim().to_string(),
            });
        }
        tracing::warn!("could not restore stashed changes; run `git stash pop` manually");
        Ok(())
    }

    fn recover_failed_integration(&self, result: CommandResult, stashed: bool) -> GitError {
        let conflict = result.stderr.to_lowercase().contains("conflict")
            || result.stdout.to_lowercase().contains("conflict");
        if conflict {
            tracing::error!("conflict while integrating remote changes; aborting rebase");
            self.git(&["rebase", "--abort"], "Abort rebase");
        }
        if stashed {
            self.git(&["stash", "pop"], "Restore stash");
        }
        if conflict {
            GitError::IntegrationConflict {
                stderr: result.stderr.trim().to_string(),
            }
        } else {
            command_error("Pull", result)
        }
    }

    // -----------------------------------------------------------------------
    // Push
    // -----------------------------------------------------------------------

    pub fn push_outcome(&self) -> Result<PushOutcome, GitError> {
        tracing::info!(branch = %self.branch, "pushing changes to remote");
        self.verify_integrity()?;

        let Some(changes) = self.local_changes() else {
            return Ok(PushOutcome::NothingToPush);
        };
        tracing::info!(total = changes.total(), changes = %changes, "preparing to push");

        self.require(self.git(&["add", "-A"], "Stage all changes"))?;
        let staged = self.git(&["status", "--porcelain"], "Check staged status");
        if staged.stdout.trim().is_empty() {
            return Ok(PushOutcome::NothingStaged);
        }

        let message = format!("VaultSync: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
        let commit = self.git(&["commit", "-m", message.as_str()], "Create commit");
        if !commit.success {
            if commit.stdout.to_lowercase().contains("nothing to commit") {
                return Ok(PushOutcome::NothingStaged);
            }
            return Err(command_error("Create commit", commit));
        }

        let first_push = !self.remote_branch_exists();
        let presynced = if first_push { false } else { self.presync()? };

        let push = if first_push {
            tracing::info!("first push; creating remote branch");
            self.runner
                .run_on_worker(&["push", "-u", "origin", self.branch.as_str()], "Initial push", None)
        } else {
            self.runner
                .run_on_worker(&["push", "origin", self.branch.as_str()], "Push changes", None)
        };

        if push.success {
            return Ok(PushOutcome::Pushed {
                first_push,
                presynced,
            });
        }
        let kind = classify_push_failure(&push.stderr);
        tracing::error!(kind = %kind, guidance = kind.guidance(), "push failed");
        Err(GitError::PushFailed {
            kind,
            stderr: push.stderr.trim().to_string(),
        })
    }

    /// Rebase onto the remote when it moved ahead. Divergence is not re-checked
    /// after the rebase, so a concurrent writer can still cause a rejection.
    fn presync(&self) -> Result<bool, GitError> {
        let fetch = self.git_with_timeout(
            &["fetch", "origin", self.branch.as_str()],
            "Pre-push fetch",
            self.runner.default_timeout() / 3,
        );
        if !fetch.success {
            return Ok(false);
        }

        let divergence = self.divergence();
        if divergence.behind == 0 {
            return Ok(false);
        }
        tracing::warn!(behind = divergence.behind, "remote has newer commits; rebasing before push");

        let pull = self.git(&["pull", "--rebase", "origin", self.branch.as_str()], "Pre-push pull with rebase");
        if !pull.success {
            if self.rebase_in_progress() {
                tracing::error!("pre-push rebase stopped; aborting it");
                self.git(&["rebase", "--abort"], "Abort rebase");
            }
            return Err(GitError::PresyncFailed {
                stderr: pull.stderr.trim().to_string(),
            });
        }
        tracing::info!("synced with remote before push");
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Sync
    // -----------------------------------------------------------------------

    pub fn sync_outcome(&self) -> Result<SyncOutcome, GitError> {
        tracing::info!("starting full synchronization");
        let pull = self.pull_outcome()?;
        let push = self.push_outcome()?;
        Ok(SyncOutcome { pull, push })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    fn has_metadata(&self) -> bool {
        self.vault.join(".git").exists()
    }

    /// Missing metadata and an unfinished rebase are fatal; `fsck` findings
    /// are logged.
    fn verify_integrity(&self) -> Result<(), GitError> {
        if !self.has_metadata() {
            return Err(GitError::MissingRepository {
                path: self.vault.join(".git"),
            });
        }
        if self.rebase_in_progress() {
            return Err(GitError::RebaseInProgress {
                path: self.vault.clone(),
            });
        }
        let fsck = self.git_with_timeout(&["fsck", "--no-progress"], "Verify repository", INTEGRITY_TIMEOUT);
        if !fsck.success {
            tracing::warn!("repository integrity check found issues");
        }
        Ok(())
    }

    fn rebase_in_progress(&self) -> bool {
        let git_dir = self.vault.join(".git");
        git_dir.join("rebase-merge").exists() || git_dir.join("rebase-apply").exists()
    }

    fn has_commits(&self) -> bool {
        self.git(&["rev-parse", "--verify", "--quiet", "HEAD"], "Check commits").success
    }

    fn remote_branch_exists(&self) -> bool {
        let result = self.git(&["ls-remote", "--heads", "origin", self.branch.as_str()], "Check remote branch");
        result.success && !result.stdout.trim().is_empty()
    }

    /// `None` for a clean working tree.
    fn local_changes(&self) -> Option<ChangeSummary> {
        let status = self.git(&["status", "--porcelain"], "Status check");
        if !status.success || status.stdout.trim().is_empty() {
            return None;
        }
        Some(ChangeSummary::from_porcelain(&status.stdout))
    }

    /// Compare the local branch with `origin/<branch>`. A branch without
    /// commits is behind by every remote commit.
    pub fn divergence(&self) -> DivergenceReport {
        let remote_ref = format!("origin/{}", self.branch);
        let local = self.git(&["rev-parse", "--verify", "--quiet", self.branch.as_str()], "Get local commit");
        let remote = self.git(&["rev-parse", "--verify", "--quiet", remote_ref.as_str()], "Get remote commit");

        if !remote.success {
            return DivergenceReport::default();
        }
        if !local.success {
            return DivergenceReport::new(0, self.count(&remote_ref));
        }
        if local.stdout.trim() == remote.stdout.trim() {
            return DivergenceReport::default();
        }

        let ahead = self.count(&format!("{remote_ref}..{}", self.branch));
        let behind = self.count(&format!("{}..{remote_ref}", self.branch));
        DivergenceReport::new(ahead, behind)
    }

    fn count(&self, range: &str) -> u32 {
        let result = self.git(&["rev-list", "--count", range], "Count commits");
        if !result.success {
            return 0;
        }
        result.stdout.trim().parse().unwrap_or(0)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn git(&self, args: &[&str], description: &str) -> CommandResult {
        self.runner.run(args, description, None)
    }

    fn git_with_timeout(&self, args: &[&str], description: &str, timeout: Duration) -> CommandResult {
        self.runner.run(args, description, Some(timeout))
    }

    fn require(&self, result: CommandResult) -> Result<CommandResult, GitError> {
        if result.success {
            Ok(result)
        } else {
            let description = result.command.clone();
            Err(command_error(&description, result))
        }
    }
}

fn command_error(description: &str, result: CommandResult) -> GitError {
    GitError::Command {
        description: description.to_string(),
        exit_code: result.exit_code,
        stderr: result.stderr.trim().to_string(),
    }
}

fn report<T>(operation: &str, result: Result<T, GitError>, on_success: impl FnOnce(&T)) -> bool {
    match result {
        Ok(value) => {
            on_success(&value);
            true
        }
        Err(e) => {
            tracing::error!(operation, error = %e, "repository operation failed");
            false
        }
    }
}
