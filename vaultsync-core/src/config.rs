//! Configuration model for VaultSync.
//!
//! The on-disk shape mirrors `config.yaml`:
//!
//! ```yaml
//! vault:    { path: ..., branch: main }
//! sync:     { mode: on_close, interval_minutes: 2, process_name: obsidian }
//! backup:   { enabled: true, directory: ..., max_backups: 2 }
//! notification: { enabled: true, timeout: 3, icon_path: null }
//! logging:  { file: vaultsync.log, level: INFO }
//! git:      { timeout: 120, user_name: ..., user_email: ..., gitignore: {...} }
//! ```
//!
//! All path fields use `PathBuf`. Every section is read-only once loaded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How synchronization is triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Pull when the application starts, push when it closes.
    #[default]
    OnClose,
    /// Pull once on start, then push on a fixed-minute timer.
    Interval,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::OnClose => write!(f, "on_close"),
            SyncMode::Interval => write!(f, "interval"),
        }
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on_close" => Ok(SyncMode::OnClose),
            "interval" => Ok(SyncMode::Interval),
            other => Err(format!(
                "invalid sync mode '{other}'; expected: on_close, interval"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Root of the synchronized directory tree.
    pub path: PathBuf,
    #[serde(default = "default_branch")]
    pub branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub interval_minutes: u64,
    /// Exact process name of the watched application.
    pub process_name: String,
}

impl SyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupConfig {
    pub enabled: bool,
    /// Target directory for snapshots. Empty means unset.
    #[serde(default)]
    pub directory: PathBuf,
    /// Retention count.
    pub max_backups: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Seconds a desktop notification stays visible.
    #[serde(default = "default_notification_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub icon_path: Option<PathBuf>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: default_notification_timeout(),
            icon_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log file, relative to the base directory unless absolute.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            level: default_log_level(),
        }
    }
}

/// Ignore-pattern groups keyed by category name.
pub type IgnoreGroups = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitConfig {
    /// Default per-command timeout in seconds.
    pub timeout: u64,
    pub user_name: String,
    pub user_email: String,
    #[serde(default)]
    pub gitignore: IgnoreGroups,
    /// Fully-formed remote URL. When absent it is built from `.env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
}

impl GitConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub vault: VaultConfig,
    pub sync: SyncConfig,
    pub backup: BackupConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub git: GitConfig,
}

impl Config {
    /// Template written by `vaultsync setup` when no configuration exists yet.
    pub fn template() -> Self {
        let mut gitignore = IgnoreGroups::new();
        gitignore.insert("obsidian".to_string(), Vec::new());
        gitignore.insert(
            "system".to_string(),
            [".DS_Store", "Thumbs.db", "*.tmp", "*.lock", "*.swp", "*~"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        gitignore.insert(
            "directories".to_string(),
            [".trash/", "__pycache__/", ".vscode/", ".idea/"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        );
        gitignore.insert("custom".to_string(), Vec::new());

        Self {
            vault: VaultConfig {
                path: PathBuf::new(),
                branch: default_branch(),
            },
            sync: SyncConfig {
                mode: SyncMode::OnClose,
                interval_minutes: 2,
                process_name: default_process_name().to_string(),
            },
            backup: BackupConfig {
                enabled: true,
                directory: PathBuf::new(),
                max_backups: 2,
            },
            notification: NotificationConfig::default(),
            logging: LoggingConfig::default(),
            git: GitConfig {
                timeout: 120,
                user_name: String::new(),
                user_email: String::new(),
                gitignore,
                remote_url: None,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Serde defaults
// ---------------------------------------------------------------------------

fn default_branch() -> String {
    "main".to_string()
}

fn default_notification_timeout() -> u64 {
    3
}

fn default_log_file() -> PathBuf {
    PathBuf::from("vaultsync.log")
}

fn default_log_level() -> String {
    "INFO".to_string()
}

#[cfg(windows)]
fn default_process_name() -> &'static str {
    "Obsidian.exe"
}

#[cfg(target_os = "macos")]
fn default_process_name() -> &'static str {
    "Obsidian"
}

#[cfg(not(any(windows, target_os = "macos")))]
fn default_process_name() -> &'static str {
    "obsidian"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
