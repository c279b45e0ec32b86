//! VaultSync core library: configuration model, loading, paths, retry policy.
//!
//! - [`config`]: serde model of `config.yaml`
//! - [`loader`]: load / validate / save, remote URL resolution
//! - [`paths`]: base-directory layout
//! - [`retry`]: explicit [`RetryPolicy`]
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod loader;
pub mod paths;
pub mod retry;

pub use config::{
    BackupConfig, Config, GitConfig, IgnoreGroups, LoggingConfig, NotificationConfig, SyncConfig,
    SyncMode, VaultConfig,
};
pub use error::ConfigError;
pub use loader::Settings;
pub use retry::RetryPolicy;
