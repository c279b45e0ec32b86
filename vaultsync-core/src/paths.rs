//! Base-directory layout.
//!
//! ```text
//! <base>/
//!   config.yaml     (mode 0600)
//!   .env            (mode 0600, remote credentials)
//!   vaultsync.log   (default log file)
//!   .pid            (background process id)
//! ```
//!
//! `<base>` is `$VAULTSYNC_HOME` when set, otherwise `<config_dir>/vaultsync`.
//! Functions taking `base: &Path` never consult the environment; tests use them
//! with a `TempDir`.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub const HOME_ENV: &str = "VAULTSYNC_HOME";
pub const CONFIG_FILE: &str = "config.yaml";
pub const ENV_FILE: &str = ".env";
pub const PID_FILE: &str = ".pid";

/// Resolve the base directory from `$VAULTSYNC_HOME` or the platform config dir.
pub fn base_dir() -> Result<PathBuf, ConfigError> {
    if let Some(explicit) = std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(explicit));
    }
    dirs::config_dir()
        .map(|dir| dir.join("vaultsync"))
        .ok_or(ConfigError::HomeNotFound)
}

pub fn config_path(base: &Path) -> PathBuf {
    base.join(CONFIG_FILE)
}

pub fn env_path(base: &Path) -> PathBuf {
    base.join(ENV_FILE)
}

pub fn pid_path(base: &Path) -> PathBuf {
    base.join(PID_FILE)
}

/// Resolve a possibly-relative log file against the base directory.
pub fn log_path(base: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        base.join(configured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_log_file_is_joined_to_base() {
        let base = Path::new("/srv/vaultsync");
        assert_eq!(
            log_path(base, Path::new("vaultsync.log")),
            PathBuf::from("/srv/vaultsync/vaultsync.log")
        );
    }

    #[test]
    #[cfg(unix)]
    fn absolute_log_file_is_kept() {
        let base = Path::new("/srv/vaultsync");
        assert_eq!(
            log_path(base, Path::new("/var/log/vs.log")),
            PathBuf::from("/var/log/vs.log")
        );
    }

    #[test]
    fn file_names_are_stable() {
        let base = Path::new("base");
        assert!(config_path(base).ends_with("config.yaml"));
        assert!(env_path(base).ends_with(".env"));
        assert!(pid_path(base).ends_with(".pid"));
    }
}
