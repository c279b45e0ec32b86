//! End-to-end pull/push flows against a local bare repository acting as
//! `origin`. Requires `git` on PATH.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use vaultsync_core::{Config, GitConfig};
use vaultsync_git::{
    GitError, IgnoreWrite, IntegrationStrategy, PullOutcome, PushOutcome, RemoteAction,
    RepositoryController,
};

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

struct Fixture {
    _root: TempDir,
    origin: PathBuf,
    vault: PathBuf,
    root: PathBuf,
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn git_config() -> GitConfig {
    let mut config = Config::template().git;
    config.timeout = 60;
    config.user_name = "Vault Sync".to_string();
    config.user_email = "vault@example.com".to_string();
    config
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().expect("tempdir");
        let origin = root.path().join("origin.git");
        let vault = root.path().join("vault");
        fs::create_dir_all(&origin).expect("origin dir");
        fs::create_dir_all(&vault).expect("vault dir");
        git(&origin, &["init", "--bare", "--quiet"]);
        git(&origin, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        Self {
            root: root.path().to_path_buf(),
            _root: root,
            origin,
            vault,
        }
    }

    fn controller(&self) -> RepositoryController {
        RepositoryController::new(
            &git_config(),
            &self.vault,
            self.origin.to_string_lossy().into_owned(),
            "main",
        )
    }

    /// Vault set up and pushed once with `note.md`.
    fn published(&self) -> RepositoryController {
        let controller = self.controller();
        assert!(controller.setup());
        fs::write(self.vault.join("note.md"), "line one\n").expect("write");
        assert!(controller.push());
        controller
    }

    /// A second working copy that writes to the same origin.
    fn other_clone(&self, name: &str) -> PathBuf {
        let dir = self.root.join(name);
        let url = self.origin.to_string_lossy().into_owned();
        git(&self.root, &["clone", "--quiet", url.as_str(), name]);
        git(&dir, &["config", "user.name", "Other"]);
        git(&dir, &["config", "user.email", "other@example.com"]);
        dir
    }

    fn remote_tip(&self) -> String {
        git(&self.origin, &["rev-parse", "main"])
    }
}

fn commit_file(dir: &Path, file: &str, contents: &str) {
    fs::write(dir.join(file), contents).expect("write");
    git(dir, &["add", "-A"]);
    git(dir, &["commit", "--quiet", "-m", file]);
}

// ---------------------------------------------------------------------------
// Setup
// ---------------------------------------------------------------------------

#[test]
fn fresh_vault_setup_then_first_push() {
    let fx = Fixture::new();
    let controller = fx.controller();

    let report = controller.setup_outcome().expect("setup");
    assert!(report.initialized);
    assert_eq!(report.remote, RemoteAction::Added);
    assert_eq!(report.ignore, Some(IgnoreWrite::Written));
    assert!(fx.vault.join(".git").is_dir());

    assert_eq!(controller.pull_outcome().expect("pull"), PullOutcome::NoRemoteBranch);

    fs::write(fx.vault.join("first.md"), "hello\n").expect("write");
    assert_eq!(
        controller.push_outcome().expect("push"),
        PushOutcome::Pushed {
            first_push: true,
            presynced: false
        }
    );
    assert_eq!(fx.remote_tip(), git(&fx.vault, &["rev-parse", "HEAD"]));
    let upstream = git(&fx.vault, &["rev-parse", "--abbrev-ref", "main@{upstream}"]);
    assert_eq!(upstream, "origin/main");

    assert_eq!(controller.push_outcome().expect("push"), PushOutcome::NothingToPush);
}

#[test]
fn setup_is_idempotent() {
    let fx = Fixture::new();
    let controller = fx.controller();
    assert!(controller.setup());
    let ignore_before = fs::read(fx.vault.join(".gitignore")).expect("ignore");
    let url_before = git(&fx.vault, &["remote", "get-url", "origin"]);

    let second = controller.setup_outcome().expect("setup");
    assert!(!second.initialized);
    assert_eq!(second.remote, RemoteAction::Unchanged);
    assert_eq!(second.ignore, Some(IgnoreWrite::Unchanged));
    assert_eq!(fs::read(fx.vault.join(".gitignore")).expect("ignore"), ignore_before);
    assert_eq!(git(&fx.vault, &["remote", "get-url", "origin"]), url_before);
}

#[test]
fn remote_is_only_rewritten_when_repository_differs() {
    let fx = Fixture::new();
    git(&fx.vault, &["init", "--quiet"]);
    git(&fx.vault, &["remote", "add", "origin", "https://old-token@example.com/ada/notes.git"]);

    let same_repo = RepositoryController::new(
        &git_config(),
        &fx.vault,
        "https://new-token@example.com/ada/notes.git",
        "main",
    );
    assert_eq!(same_repo.setup_outcome().expect("setup").remote, RemoteAction::Unchanged);
    assert_eq!(
        git(&fx.vault, &["remote", "get-url", "origin"]),
        "https://old-token@example.com/ada/notes.git"
    );

    let other_repo = RepositoryController::new(
        &git_config(),
        &fx.vault,
        "https://new-token@example.com/ada/journal.git",
        "main",
    );
    assert_eq!(other_repo.setup_outcome().expect("setup").remote, RemoteAction::Updated);
}

#[test]
fn operations_without_repository_fail() {
    let fx = Fixture::new();
    let controller = fx.controller();
    assert!(matches!(
        controller.pull_outcome(),
        Err(GitError::MissingRepository { .. })
    ));
    assert!(!controller.push());
    assert!(!controller.sync());
}

// ---------------------------------------------------------------------------
// Pull
// ---------------------------------------------------------------------------

#[test]
fn repeated_pull_is_a_no_op() {
    let fx = Fixture::new();
    let controller = fx.published();
    assert_eq!(controller.pull_outcome().expect("pull"), PullOutcome::UpToDate);
    assert_eq!(controller.pull_outcome().expect("pull"), PullOutcome::UpToDate);
    assert_eq!(git(&fx.vault, &["stash", "list"]), "");
}

#[test]
fn pull_stashes_fast_forwards_and_restores_local_edit() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "remote-a.md", "a\n");
    commit_file(&other, "remote-b.md", "b\n");
    git(&other, &["push", "--quiet", "origin", "main"]);

    fs::write(fx.vault.join("note.md"), "line one\nlocal edit\n").expect("edit");

    let outcome = controller.pull_outcome().expect("pull");
    assert_eq!(
        outcome,
        PullOutcome::Integrated {
            strategy: IntegrationStrategy::FastForward,
            behind: 2,
            stashed: true,
        }
    );
    assert!(fx.vault.join("remote-a.md").exists());
    assert!(fx.vault.join("remote-b.md").exists());
    let note = fs::read_to_string(fx.vault.join("note.md")).expect("note");
    assert!(note.contains("local edit"));
    assert_eq!(git(&fx.vault, &["stash", "list"]), "");
}

#[test]
fn pull_rebases_when_both_sides_have_commits() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "remote.md", "remote\n");
    git(&other, &["push", "--quiet", "origin", "main"]);

    commit_file(&fx.vault, "local.md", "local\n");

    let outcome = controller.pull_outcome().expect("pull");
    assert!(matches!(
        outcome,
        PullOutcome::Integrated {
            strategy: IntegrationStrategy::Rebase,
            behind: 1,
            ..
        }
    ));
    let divergence = controller.divergence();
    assert_eq!(divergence.behind, 0);
    assert_eq!(divergence.ahead, 1);
    assert!(fx.vault.join("remote.md").exists());
}

#[test]
fn conflicting_rebase_is_aborted() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "note.md", "remote version\n");
    git(&other, &["push", "--quiet", "origin", "main"]);

    commit_file(&fx.vault, "note.md", "local version\n");
    let local_tip = git(&fx.vault, &["rev-parse", "HEAD"]);

    let err = controller.pull_outcome().unwrap_err();
    assert!(matches!(err, GitError::IntegrationConflict { .. }), "got: {err}");
    assert_eq!(git(&fx.vault, &["rev-parse", "HEAD"]), local_tip);
    assert!(!fx.vault.join(".git").join("rebase-merge").exists());
}

// ---------------------------------------------------------------------------
// Push
// ---------------------------------------------------------------------------

#[test]
fn push_presyncs_when_remote_is_ahead() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    for n in 0..3 {
        commit_file(&other, &format!("remote-{n}.md"), "r\n");
    }
    git(&other, &["push", "--quiet", "origin", "main"]);

    fs::write(fx.vault.join("local.md"), "local\n").expect("write");
    assert_eq!(
        controller.push_outcome().expect("push"),
        PushOutcome::Pushed {
            first_push: false,
            presynced: true
        }
    );
    assert_eq!(fx.remote_tip(), git(&fx.vault, &["rev-parse", "HEAD"]));
    assert_eq!(git(&fx.origin, &["rev-list", "--count", "main"]), "5");
}

#[test]
fn failed_presync_never_pushes() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "note.md", "remote one\n");
    commit_file(&other, "note.md", "remote two\n");
    commit_file(&other, "note.md", "remote three\n");
    git(&other, &["push", "--quiet", "origin", "main"]);
    let remote_before = fx.remote_tip();

    fs::write(fx.vault.join("note.md"), "conflicting local line\n").expect("write");
    let err = controller.push_outcome().unwrap_err();
    assert!(matches!(err, GitError::PresyncFailed { .. }), "got: {err}");
    assert_eq!(fx.remote_tip(), remote_before);
}

#[test]
fn conflicting_stash_restore_keeps_the_stash() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "note.md", "remote version\n");
    git(&other, &["push", "--quiet", "origin", "main"]);

    fs::write(fx.vault.join("note.md"), "local version\n").expect("edit");

    let err = controller.pull_outcome().unwrap_err();
    assert!(matches!(err, GitError::StashRestoreConflict { .. }), "got: {err}");
    assert_eq!(git(&fx.vault, &["rev-parse", "HEAD"]), fx.remote_tip());
    assert!(git(&fx.vault, &["stash", "list"]).contains("Auto-stash before pull"));
}

#[test]
fn failed_presync_aborts_the_rebase() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "note.md", "remote one\n");
    git(&other, &["push", "--quiet", "origin", "main"]);
    let remote_before = fx.remote_tip();

    fs::write(fx.vault.join("note.md"), "conflicting local line\n").expect("write");
    let err = controller.push_outcome().unwrap_err();
    assert!(matches!(err, GitError::PresyncFailed { .. }), "got: {err}");

    let git_dir = fx.vault.join(".git");
    assert!(!git_dir.join("rebase-merge").exists());
    assert!(!git_dir.join("rebase-apply").exists());
    assert_eq!(git(&fx.vault, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(git(&fx.vault, &["show", "HEAD:note.md"]), "conflicting local line");
    let head = git(&fx.vault, &["rev-parse", "HEAD"]);

    assert_eq!(controller.push_outcome().expect("second push"), PushOutcome::NothingToPush);
    assert_eq!(git(&fx.vault, &["rev-parse", "HEAD"]), head);
    assert_eq!(fx.remote_tip(), remote_before);
}

#[test]
fn unfinished_rebase_blocks_pull_and_push() {
    let fx = Fixture::new();
    let controller = fx.published();
    let head = git(&fx.vault, &["rev-parse", "HEAD"]);

    fs::create_dir_all(fx.vault.join(".git").join("rebase-merge")).expect("rebase dir");
    fs::write(fx.vault.join("note.md"), "edited mid-rebase\n").expect("write");

    assert!(matches!(
        controller.push_outcome(),
        Err(GitError::RebaseInProgress { .. })
    ));
    assert!(matches!(
        controller.pull_outcome(),
        Err(GitError::RebaseInProgress { .. })
    ));
    assert_eq!(git(&fx.vault, &["rev-parse", "HEAD"]), head);
}

#[test]
fn ignored_files_do_not_count_as_changes() {
    let fx = Fixture::new();
    let controller = fx.published();
    let head = git(&fx.vault, &["rev-parse", "HEAD"]);

    fs::write(fx.vault.join("scratch.tmp"), "ignored\n").expect("write");
    assert_eq!(controller.push_outcome().expect("push"), PushOutcome::NothingToPush);
    assert_eq!(git(&fx.vault, &["rev-parse", "HEAD"]), head);
}

#[test]
fn sync_pulls_then_pushes() {
    let fx = Fixture::new();
    let controller = fx.published();

    let other = fx.other_clone("other");
    commit_file(&other, "remote.md", "remote\n");
    git(&other, &["push", "--quiet", "origin", "main"]);
    fs::write(fx.vault.join("local.md"), "local\n").expect("write");

    let outcome = controller.sync_outcome().expect("sync");
    assert!(matches!(outcome.pull, PullOutcome::Integrated { stashed: true, .. }));
    assert!(matches!(outcome.push, PushOutcome::Pushed { first_push: false, .. }));
    git(&other, &["pull", "--quiet", "--ff-only", "origin", "main"]);
    assert!(other.join("local.md").exists());
}
