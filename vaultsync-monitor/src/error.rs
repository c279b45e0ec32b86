//! Error types for vaultsync-monitor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    /// The process table cannot be read on this platform.
    #[error("process listing is not supported on this platform")]
    Unsupported,

    #[error("process query failed: {0}")]
    Query(String),
}
