//! Snapshot lifecycle through the public API.

use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;
use tempfile::TempDir;
use vaultsync_backup::{parse_snapshot_name, BackupError, BackupOutcome, SnapshotManager};
use vaultsync_core::BackupConfig;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
    fs::write(path, contents).expect("write");
}

fn setup(backup_dir: impl FnOnce(&Path) -> PathBuf) -> (TempDir, PathBuf, SnapshotManager) {
    let root = TempDir::new().expect("tempdir");
    let vault = root.path().join("vault");
    write(&vault, "daily/2025-01-01.md", "# New year\n");
    write(&vault, ".obsidian/app.json", "{}");
    write(&vault, ".git/HEAD", "ref: refs/heads/main\n");
    write(&vault, "scratch.swp", "");
    let config = BackupConfig {
        enabled: true,
        directory: backup_dir(root.path()),
        max_backups: 3,
    };
    let manager = SnapshotManager::new(&config, &vault);
    (root, vault, manager)
}

fn created(outcome: BackupOutcome) -> vaultsync_backup::Snapshot {
    match outcome {
        BackupOutcome::Created { snapshot, .. } => snapshot,
        other => panic!("expected a snapshot, got {other:?}"),
    }
}

#[test]
fn snapshot_copies_vault_without_ignored_entries() {
    let (_root, _vault, manager) = setup(|root| root.join("backups"));
    let snapshot = created(manager.create_backup_outcome().expect("backup"));

    assert!(parse_snapshot_name(&snapshot.name).is_some());
    assert!(snapshot.path.join("daily/2025-01-01.md").is_file());
    assert!(snapshot.path.join(".obsidian/app.json").is_file());
    assert!(!snapshot.path.join(".git").exists());
    assert!(!snapshot.path.join("scratch.swp").exists());
    assert!(snapshot.size_bytes > 0);

    let listed = manager.list_backups();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, snapshot.name);
}

#[test]
fn backup_directory_inside_vault_is_not_copied() {
    let (_root, vault, manager) = setup(|root| root.join("vault").join(".backups"));
    fs::create_dir_all(vault.join(".backups")).expect("mkdir");

    let first = created(manager.create_backup_outcome().expect("first"));
    let second = created(manager.create_backup_outcome().expect("second"));
    assert!(!first.path.join(".backups").exists());
    assert!(!second.path.join(".backups").exists());
}

#[test]
fn disabled_backups_are_a_successful_no_op() {
    let root = TempDir::new().expect("tempdir");
    let config = BackupConfig {
        enabled: false,
        directory: root.path().join("backups"),
        max_backups: 2,
    };
    let manager = SnapshotManager::new(&config, root.path());

    assert_eq!(manager.create_backup_outcome().expect("skip"), BackupOutcome::Skipped);
    assert!(manager.create_backup());
    assert!(!root.path().join("backups").exists());
    assert!(manager.list_backups().is_empty());
    assert!(!manager.restore_backup("anything", None));
}

#[test]
fn empty_copy_fails_verification_and_leaves_nothing() {
    let root = TempDir::new().expect("tempdir");
    let vault = root.path().join("vault");
    write(&vault, ".git/HEAD", "ref");
    let config = BackupConfig {
        enabled: true,
        directory: root.path().join("backups"),
        max_backups: 2,
    };
    let manager = SnapshotManager::new(&config, &vault);

    let err = manager.create_backup_outcome().unwrap_err();
    assert!(matches!(err, BackupError::Empty { .. }), "got: {err}");
    let leftovers = fs::read_dir(root.path().join("backups")).expect("read").count();
    assert_eq!(leftovers, 0);
}

#[test]
fn restore_replaces_target_tree() {
    let (root, _vault, manager) = setup(|root| root.join("backups"));
    let snapshot = created(manager.create_backup_outcome().expect("backup"));

    let target = root.path().join("restored");
    write(&target, "stale.md", "old");
    assert!(manager.restore_backup(&snapshot.name, Some(target.as_path())));

    assert!(!target.join("stale.md").exists());
    let restored = fs::read_to_string(target.join("daily/2025-01-01.md")).expect("read");
    assert_eq!(restored, "# New year\n");
}

#[test]
fn restore_refuses_a_vault_that_holds_the_backup_directory() {
    let (_root, vault, manager) = setup(|root| root.join("vault").join(".backups"));
    let snapshot = created(manager.create_backup_outcome().expect("backup"));

    let err = manager.restore_outcome(&snapshot.name, None).unwrap_err();
    assert!(matches!(err, BackupError::InvalidTarget { .. }), "got: {err}");
    assert!(!manager.restore_backup(&snapshot.name, None));

    assert!(vault.join("daily/2025-01-01.md").is_file());
    assert!(snapshot.path.join("daily/2025-01-01.md").is_file());
    assert_eq!(manager.list_backups().len(), 1);
}

#[test]
fn restore_refuses_targets_inside_the_backup_directory() {
    let (root, _vault, manager) = setup(|root| root.join("backups"));
    let first = created(manager.create_backup_outcome().expect("first"));
    let second = created(manager.create_backup_outcome().expect("second"));

    assert!(matches!(
        manager.restore_outcome(&first.name, Some(second.path.as_path())),
        Err(BackupError::InvalidTarget { .. })
    ));
    assert!(matches!(
        manager.restore_outcome(&first.name, Some(root.path().join("backups/fresh").as_path())),
        Err(BackupError::InvalidTarget { .. })
    ));
    assert!(second.path.join("daily/2025-01-01.md").is_file());
}

#[test]
fn delete_removes_snapshot() {
    let (_root, _vault, manager) = setup(|root| root.join("backups"));
    let snapshot = created(manager.create_backup_outcome().expect("backup"));

    assert!(manager.delete_backup(&snapshot.name));
    assert!(!snapshot.path.exists());
    assert!(matches!(
        manager.delete_outcome(&snapshot.name),
        Err(BackupError::NotFound { .. })
    ));
}

#[rstest]
#[case("../vault")]
#[case("..")]
#[case("nested/name")]
#[case("")]
fn path_like_names_are_rejected(#[case] name: &str) {
    let (_root, _vault, manager) = setup(|root| root.join("backups"));
    assert!(matches!(
        manager.delete_outcome(name),
        Err(BackupError::InvalidName(_))
    ));
    assert!(matches!(
        manager.restore_outcome(name, None),
        Err(BackupError::InvalidName(_))
    ));
}
