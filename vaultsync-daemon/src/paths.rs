use std::path::{Path, PathBuf};
use std::time::Duration;

pub const AGENT_LABEL: &str = "dev.vaultsync.agent";
pub const APP_NAME: &str = "VaultSync";

/// Registry key holding per-user startup programs.
pub const RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";

pub const AGENT_STDOUT_LOG: &str = "agent.log";
pub const AGENT_STDERR_LOG: &str = "agent-err.log";

/// Grace period between terminate and kill when stopping the background process.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

pub fn launch_agents_dir(user_home: &Path) -> PathBuf {
    user_home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(user_home: &Path) -> PathBuf {
    launch_agents_dir(user_home).join(format!("{AGENT_LABEL}.plist"))
}

pub fn autostart_dir(config_dir: &Path) -> PathBuf {
    config_dir.join("autostart")
}

pub fn desktop_entry_path(config_dir: &Path) -> PathBuf {
    autostart_dir(config_dir).join("vaultsync.desktop")
}

pub fn stdout_log_path(base: &Path) -> PathBuf {
    base.join(AGENT_STDOUT_LOG)
}

pub fn stderr_log_path(base: &Path) -> PathBuf {
    base.join(AGENT_STDERR_LOG)
}
