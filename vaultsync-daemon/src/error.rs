use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the runtime, logging, autorun and background-process management.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(#[from] vaultsync_core::ConfigError),

    #[error("repository setup failed")]
    SetupFailed,

    #[error("logging error: {0}")]
    Logging(String),

    #[error("autorun error: {0}")]
    Autorun(String),

    #[error("background process error: {0}")]
    Process(String),

    #[error("VaultSync is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("VaultSync is not running")]
    NotRunning,

    #[error("runtime error: {0}")]
    Runtime(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
