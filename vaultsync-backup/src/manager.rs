//! Snapshot creation, retention, listing, restore and deletion.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;
use vaultsync_core::{BackupConfig, RetryPolicy};

use crate::copy::{copy_tree, dir_size, file_count, CopyFilter, DEFAULT_IGNORE};
use crate::error::{io_err, BackupError};
use crate::naming::{is_plain_name, parse_snapshot_name, snapshot_name, SNAPSHOT_PREFIX};

/// One snapshot directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub name: String,
    pub path: PathBuf,
    pub created_at: NaiveDateTime,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Backups are disabled in configuration.
    Skipped,
    Created {
        snapshot: Snapshot,
        /// Names removed by retention.
        pruned: Vec<String>,
        /// Old snapshots retention could not remove; the count is over the limit.
        unpruned: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupStats {
    pub enabled: bool,
    pub directory: PathBuf,
    pub max_backups: usize,
    pub total_created: u64,
    pub last_backup_time: Option<DateTime<Local>>,
    pub last_backup_size: Option<u64>,
    pub in_progress: bool,
    pub available: usize,
}

#[derive(Debug, Default)]
struct Session {
    total_created: u64,
    last_backup_time: Option<DateTime<Local>>,
    last_backup_size: Option<u64>,
}

/// Clears the in-flight flag when dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// SnapshotManager
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct SnapshotManager {
    config: BackupConfig,
    vault: PathBuf,
    in_flight: AtomicBool,
    session: Mutex<Session>,
    retry: RetryPolicy,
}

impl SnapshotManager {
    pub fn new(config: &BackupConfig, vault: impl Into<PathBuf>) -> Self {
        let vault = vault.into();
        if config.enabled {
            tracing::debug!(directory = %config.directory.display(), "snapshot manager ready");
        } else {
            tracing::debug!("snapshot manager ready; backups disabled");
        }
        Self {
            config: config.clone(),
            vault,
            in_flight: AtomicBool::new(false),
            session: Mutex::new(Session::default()),
            retry: RetryPolicy::default(),
        }
    }

    /// Retry policy for removing pruned snapshots.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.config.directory
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// `true` on success or when backups are disabled.
    pub fn create_backup(&self) -> bool {
        match self.create_backup_outcome() {
            Ok(_) => true,
            Err(BackupError::InProgress) => {
                tracing::warn!("backup already in progress");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "backup failed");
                false
            }
        }
    }

    /// Fails immediately with [`BackupError::InProgress`] while another
    /// snapshot is being created.
    pub fn create_backup_outcome(&self) -> Result<BackupOutcome, BackupError> {
        if !self.config.enabled {
            tracing::debug!("backups disabled; skipping");
            return Ok(BackupOutcome::Skipped);
        }
        let _guard = InFlight::acquire(&self.in_flight).ok_or(BackupError::InProgress)?;
        self.create_at(Local::now().naive_local())
    }

    fn create_at(&self, stamp: NaiveDateTime) -> Result<BackupOutcome, BackupError> {
        if !self.vault.exists() {
            return Err(BackupError::VaultMissing {
                path: self.vault.clone(),
            });
        }
        let dir = &self.config.directory;
        fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;

        let (stamp, name, target) = self.free_slot(stamp);
        tracing::info!(snapshot = %name, "creating backup");
        tracing::debug!(source_bytes = dir_size(&self.vault), "vault size");

        let source = canonical(&self.vault);
        let filter = CopyFilter::with_patterns(DEFAULT_IGNORE)?.exclude_dir(canonical(dir));
        let copied = copy_tree(&source, &target, &filter);

        let verified = copied.and_then(|stats| {
            if file_count(&target) == 0 {
                Err(BackupError::Empty {
                    path: target.clone(),
                })
            } else {
                Ok(stats)
            }
        });
        let stats = match verified {
            Ok(stats) => stats,
            Err(e) => {
                if target.exists() {
                    let _ = fs::remove_dir_all(&target);
                }
                return Err(e);
            }
        };

        let size_bytes = dir_size(&target);
        {
            let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
            session.total_created += 1;
            session.last_backup_time = Some(Local::now());
            session.last_backup_size = Some(size_bytes);
        }
        tracing::info!(snapshot = %name, files = stats.files, size_bytes, "backup created");

        let (pruned, unpruned) = self.prune(|path| fs::remove_dir_all(path))?;
        Ok(BackupOutcome::Created {
            snapshot: Snapshot {
                name,
                path: target,
                created_at: stamp,
                size_bytes,
            },
            pruned,
            unpruned,
        })
    }

    /// First unused snapshot name at or after `stamp`, with the stamp it encodes.
    fn free_slot(&self, mut stamp: NaiveDateTime) -> (NaiveDateTime, String, PathBuf) {
        loop {
            let name = snapshot_name(stamp);
            let path = self.config.directory.join(&name);
            if !path.exists() {
                return (stamp, name, path);
            }
            stamp += chrono::Duration::milliseconds(1);
        }
    }

    /// Remove the oldest snapshots beyond the retention count. Directories
    /// whose names do not parse are left alone. Returns `(removed, failed)`.
    fn prune(
        &self,
        remove: impl Fn(&Path) -> std::io::Result<()>,
    ) -> Result<(Vec<String>, Vec<String>), BackupError> {
        let mut snapshots = self.scan()?;
        snapshots.sort_by_key(|(stamp, _)| *stamp);

        let excess = snapshots.len().saturating_sub(self.config.max_backups);
        let mut pruned = Vec::with_capacity(excess);
        let mut unpruned = Vec::new();
        for (_, path) in snapshots.into_iter().take(excess) {
            let name = file_name(&path);
            let removed = self.retry.run(
                |_| remove(&path),
                |e| e.kind() != std::io::ErrorKind::NotFound,
            );
            match removed {
                Ok(()) => {
                    tracing::info!(snapshot = %name, "removed old backup");
                    pruned.push(name);
                }
                Err(e) => {
                    tracing::error!(
                        snapshot = %name,
                        error = %e,
                        max_backups = self.config.max_backups,
                        "could not remove old backup; retention limit exceeded"
                    );
                    unpruned.push(name);
                }
            }
        }
        Ok((pruned, unpruned))
    }

    /// `(timestamp, path)` for every snapshot directory with a valid name.
    fn scan(&self) -> Result<Vec<(NaiveDateTime, PathBuf)>, BackupError> {
        let dir = &self.config.directory;
        let entries = fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
        let mut found = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(dir, e))?;
            let path = entry.path();
            let name = file_name(&path);
            if !name.starts_with(SNAPSHOT_PREFIX) || !path.is_dir() {
                continue;
            }
            match parse_snapshot_name(&name) {
                Some(stamp) => found.push((stamp, path)),
                None => tracing::warn!(name = %name, "skipping backup with invalid name"),
            }
        }
        Ok(found)
    }

    // -----------------------------------------------------------------------
    // List
    // -----------------------------------------------------------------------

    /// Snapshots, newest first. Empty when disabled or on read errors.
    pub fn list_backups(&self) -> Vec<Snapshot> {
        if !self.config.enabled || !self.config.directory.exists() {
            return Vec::new();
        }
        match self.scan() {
            Ok(mut found) => {
                found.sort_by(|a, b| b.0.cmp(&a.0));
                found
                    .into_iter()
                    .map(|(created_at, path)| Snapshot {
                        name: file_name(&path),
                        size_bytes: dir_size(&path),
                        path,
                        created_at,
                    })
                    .collect()
            }
            Err(e) => {
                tracing::error!(error = %e, "error listing backups");
                Vec::new()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Restore / delete
    // -----------------------------------------------------------------------

    /// Replace `target` (default: the vault) with the contents of `name`.
    pub fn restore_backup(&self, name: &str, target: Option<&Path>) -> bool {
        match self.restore_outcome(name, target) {
            Ok(path) => {
                tracing::info!(snapshot = name, target = %path.display(), "backup restored");
                true
            }
            Err(e) => {
                tracing::error!(snapshot = name, error = %e, "backup restore failed");
                false
            }
        }
    }

    /// The existing target tree is deleted before copying; the swap is not atomic.
    /// A target that contains or lies inside the backup directory is refused.
    pub fn restore_outcome(&self, name: &str, target: Option<&Path>) -> Result<PathBuf, BackupError> {
        if !self.config.enabled {
            return Err(BackupError::Disabled);
        }
        let source = self.resolve(name)?;
        let target = target.unwrap_or(&self.vault).to_path_buf();
        tracing::info!(snapshot = name, target = %target.display(), "restoring backup");

        let backups = canonical(&self.config.directory);
        let resolved = canonical_target(&target);
        if backups.starts_with(&resolved) || resolved.starts_with(&backups) {
            return Err(BackupError::InvalidTarget {
                target,
                directory: self.config.directory.clone(),
            });
        }

        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
        }
        if target.exists() {
            fs::remove_dir_all(&target).map_err(|e| io_err(&target, e))?;
        }
        copy_tree(&source, &target, &CopyFilter::none())?;
        Ok(target)
    }

    pub fn delete_backup(&self, name: &str) -> bool {
        match self.delete_outcome(name) {
            Ok(()) => {
                tracing::info!(snapshot = name, "backup deleted");
                true
            }
            Err(e) => {
                tracing::error!(snapshot = name, error = %e, "failed to delete backup");
                false
            }
        }
    }

    pub fn delete_outcome(&self, name: &str) -> Result<(), BackupError> {
        let path = self.resolve(name)?;
        fs::remove_dir_all(&path).map_err(|e| io_err(&path, e))
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, BackupError> {
        if !is_plain_name(name) {
            return Err(BackupError::InvalidName(name.to_string()));
        }
        let path = self.config.directory.join(name);
        if !path.is_dir() {
            return Err(BackupError::NotFound {
                name: name.to_string(),
            });
        }
        Ok(path)
    }

    // -----------------------------------------------------------------------
    // Stats
    // -----------------------------------------------------------------------

    pub fn stats(&self) -> BackupStats {
        let session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        BackupStats {
            enabled: self.config.enabled,
            directory: self.config.directory.clone(),
            max_backups: self.config.max_backups,
            total_created: session.total_created,
            last_backup_time: session.last_backup_time,
            last_backup_size: session.last_backup_size,
            in_progress: self.is_in_progress(),
            available: self.list_backups().len(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Like [`canonical`], but resolves through the parent when `path` does not exist yet.
fn canonical_target(path: &Path) -> PathBuf {
    if path.exists() {
        return canonical(path);
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => {
            canonical_target(parent).join(name)
        }
        _ => path.to_path_buf(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn stamp(day: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, day)
            .and_then(|d| d.and_hms_milli_opt(12, 0, 0, ms))
            .expect("valid stamp")
    }

    fn manager(root: &TempDir, max_backups: usize) -> SnapshotManager {
        let vault = root.path().join("vault");
        fs::create_dir_all(&vault).unwrap();
        fs::write(vault.join("note.md"), "hello").unwrap();
        let config = BackupConfig {
            enabled: true,
            directory: root.path().join("backups"),
            max_backups,
        };
        SnapshotManager::new(&config, vault)
    }

    fn names(manager: &SnapshotManager) -> Vec<String> {
        manager.list_backups().into_iter().map(|s| s.name).collect()
    }

    #[test]
    fn retention_keeps_most_recent_by_timestamp() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root, 2);
        for day in [3, 1, 2, 4] {
            manager.create_at(stamp(day, 0)).unwrap();
        }
        assert_eq!(
            names(&manager),
            vec![snapshot_name(stamp(4, 0)), snapshot_name(stamp(3, 0))]
        );
    }

    #[test]
    fn unparseable_directories_are_never_pruned() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root, 1);
        let junk = root.path().join("backups").join("vault_backup_manual-copy");
        fs::create_dir_all(&junk).unwrap();

        manager.create_at(stamp(1, 0)).unwrap();
        let outcome = manager.create_at(stamp(2, 0)).unwrap();

        match outcome {
            BackupOutcome::Created { pruned, .. } => {
                assert_eq!(pruned, vec![snapshot_name(stamp(1, 0))])
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(junk.exists());
        assert_eq!(names(&manager).len(), 1);
    }

    #[test]
    fn same_millisecond_gets_next_free_name() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root, 5);
        manager.create_at(stamp(1, 7)).unwrap();
        let second = manager.create_at(stamp(1, 7)).unwrap();
        match second {
            BackupOutcome::Created { snapshot, .. } => {
                assert_eq!(snapshot.name, snapshot_name(stamp(1, 8)));
                assert_eq!(snapshot.created_at, stamp(1, 8));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn failed_removal_is_reported_as_unpruned() {
        let root = TempDir::new().unwrap();
        let mut manager = manager(&root, 2).with_retry(RetryPolicy::once());
        manager.create_at(stamp(1, 0)).unwrap();
        manager.create_at(stamp(2, 0)).unwrap();
        manager.config.max_backups = 1;

        let (pruned, unpruned) = manager
            .prune(|_| Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked")))
            .unwrap();
        assert!(pruned.is_empty());
        assert_eq!(unpruned, vec![snapshot_name(stamp(1, 0))]);
        assert_eq!(names(&manager).len(), 2);
    }

    #[test]
    fn concurrent_create_is_rejected_not_queued() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root, 2);
        let _held = InFlight::acquire(&manager.in_flight).expect("first acquire");

        assert!(matches!(
            manager.create_backup_outcome(),
            Err(BackupError::InProgress)
        ));
        assert!(!manager.create_backup());
        assert!(manager.list_backups().is_empty());
    }

    #[test]
    fn guard_is_released_after_failure() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root, 2);
        fs::remove_dir_all(root.path().join("vault")).unwrap();

        assert!(matches!(
            manager.create_backup_outcome(),
            Err(BackupError::VaultMissing { .. })
        ));
        assert!(!manager.is_in_progress());
    }

    #[test]
    fn stats_track_session() {
        let root = TempDir::new().unwrap();
        let manager = manager(&root, 3);
        manager.create_at(stamp(1, 0)).unwrap();
        let stats = manager.stats();
        assert!(stats.enabled);
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.last_backup_size, Some(5));
        assert_eq!(stats.available, 1);
        assert!(!stats.in_progress);
    }
}
