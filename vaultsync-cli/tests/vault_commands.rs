//! Backup and one-shot git commands against a throwaway vault. Requires `git`.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use vaultsync_core::{loader, paths, Config};

struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let root = TempDir::new().expect("root");
        let ws = Self { root };
        fs::create_dir_all(ws.vault().join("daily")).expect("vault");
        fs::write(ws.vault().join("daily/today.md"), "# today\n").expect("note");
        fs::create_dir_all(ws.origin()).expect("origin");
        git(&ws.origin(), &["init", "--bare", "--quiet"]);
        git(&ws.origin(), &["symbolic-ref", "HEAD", "refs/heads/main"]);

        let mut config = Config::template();
        config.vault.path = ws.vault();
        config.backup.directory = ws.root.path().join("snapshots");
        config.notification.enabled = false;
        config.git.user_name = "Ada".to_string();
        config.git.user_email = "ada@example.com".to_string();
        config.git.remote_url = Some(ws.origin().display().to_string());
        loader::save_config_at(&paths::config_path(&ws.home()), &config).expect("save config");
        ws
    }

    fn home(&self) -> PathBuf {
        self.root.path().join("home")
    }

    fn vault(&self) -> PathBuf {
        self.root.path().join("vault")
    }

    fn origin(&self) -> PathBuf {
        self.root.path().join("origin.git")
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("vaultsync").expect("vaultsync binary");
        cmd.arg("--home").arg(self.home()).env("NO_COLOR", "1");
        cmd
    }
}

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

#[test]
fn backup_create_list_restore_delete() {
    let ws = Workspace::new();

    ws.cmd()
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(contains("No backups in"));

    ws.cmd()
        .args(["backup", "create"])
        .assert()
        .success()
        .stdout(contains("Created vault_backup_"));

    let output = ws.cmd().args(["backup", "list", "--json"]).output().expect("list");
    assert!(output.status.success());
    let listed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let snapshots = listed.as_array().expect("array");
    assert_eq!(snapshots.len(), 1);
    let name = snapshots[0]["name"].as_str().expect("name").to_string();

    let target = ws.root.path().join("restored");
    ws.cmd()
        .args(["backup", "restore", name.as_str(), "--target"])
        .arg(&target)
        .assert()
        .success()
        .stdout(contains("Restored"));
    assert_eq!(
        fs::read_to_string(target.join("daily/today.md")).expect("restored note"),
        "# today\n"
    );

    ws.cmd()
        .args(["backup", "delete", name.as_str()])
        .assert()
        .success();
    ws.cmd()
        .args(["backup", "delete", name.as_str()])
        .assert()
        .failure();
}

#[test]
fn restore_rejects_path_like_names() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["backup", "restore", "../escape"])
        .assert()
        .failure()
        .stderr(contains("failed to restore"));
}

#[test]
fn push_then_pull_against_a_local_origin() {
    let ws = Workspace::new();

    ws.cmd()
        .arg("pull")
        .assert()
        .success()
        .stdout(contains("remote branch does not exist yet"));

    ws.cmd()
        .arg("push")
        .assert()
        .success()
        .stdout(contains("created remote branch"));
    assert_eq!(git(&ws.origin(), &["show", "main:daily/today.md"]), "# today");

    ws.cmd()
        .arg("sync")
        .assert()
        .success()
        .stdout(contains("Pull: already up to date"))
        .stdout(contains("Push: no local changes to push"));
}
