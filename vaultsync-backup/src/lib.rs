//! vaultsync-backup: timestamped snapshots of the vault taken before risky
//! repository operations.

pub mod copy;
pub mod error;
pub mod manager;
pub mod naming;

pub use error::BackupError;
pub use manager::{BackupOutcome, BackupStats, Snapshot, SnapshotManager};
pub use naming::{parse_snapshot_name, snapshot_name, SNAPSHOT_PREFIX};
