//! Error types for vaultsync-backup.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("backups are disabled")]
    Disabled,

    /// Another snapshot is being created right now.
    #[error("a backup is already in progress")]
    InProgress,

    #[error("vault path does not exist: {path}")]
    VaultMissing { path: PathBuf },

    /// The copy produced no files; the partial snapshot was removed.
    #[error("backup verification failed: no files copied into {path}")]
    Empty { path: PathBuf },

    #[error("backup not found: {name}")]
    NotFound { name: String },

    /// Names must be a single plain path component.
    #[error("invalid backup name '{0}'")]
    InvalidName(String),

    /// Restoring here would delete the snapshots themselves.
    #[error("cannot restore into {target}: it overlaps the backup directory {directory}")]
    InvalidTarget { target: PathBuf, directory: PathBuf },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("invalid ignore pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> BackupError {
    BackupError::Io {
        path: path.into(),
        source,
    }
}
