//! Start VaultSync automatically at login.
//!
//! One [`Autorun`] implementation per platform:
//!
//! | Platform | Mechanism                                           |
//! |----------|-----------------------------------------------------|
//! | macOS    | LaunchAgent plist + `launchctl bootstrap/bootout`   |
//! | Linux    | `~/.config/autostart/vaultsync.desktop`             |
//! | Windows  | `HKCU\...\Run` value written through `reg.exe`      |
//!
//! [`platform_autorun`] is the only place that selects by target OS.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::{io_err, DaemonError};
use crate::paths::{
    autostart_dir, desktop_entry_path, launch_agents_dir, launchd_plist_path, stderr_log_path,
    stdout_log_path, AGENT_LABEL, APP_NAME, RUN_KEY,
};

pub trait Autorun {
    fn enable(&self) -> Result<(), DaemonError>;
    fn disable(&self) -> Result<(), DaemonError>;
    fn is_enabled(&self) -> bool;
    /// Where the registration lives, for status output.
    fn location(&self) -> String;
}

/// The command line registered for login: `<binary> --home <base> <subcommand>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub binary: PathBuf,
    pub base_dir: PathBuf,
}

impl AgentCommand {
    pub fn new(binary: impl Into<PathBuf>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            base_dir: base_dir.into(),
        }
    }

    pub fn args(&self, subcommand: &str) -> Vec<String> {
        vec![
            self.binary.display().to_string(),
            "--home".to_string(),
            self.base_dir.display().to_string(),
            subcommand.to_string(),
        ]
    }

    /// Single-string form with every argument containing whitespace quoted.
    pub fn command_line(&self, subcommand: &str) -> String {
        self.args(subcommand)
            .iter()
            .map(|arg| quote_arg(arg))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if arg.is_empty() || arg.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("\"{}\"", arg.replace('"', "\\\""))
    } else {
        arg.to_string()
    }
}

// ---------------------------------------------------------------------------
// macOS: launchd
// ---------------------------------------------------------------------------

/// Generate the LaunchAgent plist running `vaultsync run` at login.
///
/// launchd keeps the foreground process alive and restarts it only after an
/// unsuccessful exit.
pub fn generate_plist(command: &AgentCommand, log_dir: &Path) -> String {
    let program_args: String = command
        .args("run")
        .iter()
        .map(|arg| format!("    <string>{}</string>\n", xml_escape(arg)))
        .collect();
    let stdout = xml_escape(&stdout_log_path(log_dir).display().to_string());
    let stderr = xml_escape(&stderr_log_path(log_dir).display().to_string());

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
{program_args}  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <dict>
    <key>SuccessfulExit</key>
    <false/>
  </dict>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        label = AGENT_LABEL,
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[derive(Debug, Clone)]
pub struct LaunchdAutorun {
    user_home: PathBuf,
    command: AgentCommand,
}

impl LaunchdAutorun {
    pub fn new(user_home: impl Into<PathBuf>, command: AgentCommand) -> Self {
        Self {
            user_home: user_home.into(),
            command,
        }
    }

    pub fn plist_path(&self) -> PathBuf {
        launchd_plist_path(&self.user_home)
    }
}

impl Autorun for LaunchdAutorun {
    fn enable(&self) -> Result<(), DaemonError> {
        ensure_macos()?;

        let launch_agents = launch_agents_dir(&self.user_home);
        fs::create_dir_all(&launch_agents).map_err(|e| io_err(&launch_agents, e))?;

        let plist = self.plist_path();
        fs::write(&plist, generate_plist(&self.command, &self.command.base_dir))
            .map_err(|e| io_err(&plist, e))?;

        let domain = launchctl_domain()?;
        let service = format!("{domain}/{AGENT_LABEL}");
        run_tool("launchctl", &["bootout", service.as_str()], true)?;
        let plist_arg = plist.display().to_string();
        run_tool(
            "launchctl",
            &["bootstrap", domain.as_str(), plist_arg.as_str()],
            false,
        )?;
        tracing::info!(plist = %plist.display(), "launch agent installed");
        Ok(())
    }

    fn disable(&self) -> Result<(), DaemonError> {
        ensure_macos()?;

        let plist = self.plist_path();
        if plist.exists() {
            let domain = launchctl_domain()?;
            let service = format!("{domain}/{AGENT_LABEL}");
            run_tool("launchctl", &["bootout", service.as_str()], true)?;
            fs::remove_file(&plist).map_err(|e| io_err(&plist, e))?;
            tracing::info!(plist = %plist.display(), "launch agent removed");
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.plist_path().exists()
    }

    fn location(&self) -> String {
        self.plist_path().display().to_string()
    }
}

#[cfg(target_os = "macos")]
fn ensure_macos() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn ensure_macos() -> Result<(), DaemonError> {
    Err(DaemonError::Autorun(
        "launchd management is only supported on macOS".to_string(),
    ))
}

fn launchctl_domain() -> Result<String, DaemonError> {
    let output = Command::new("id")
        .arg("-u")
        .output()
        .map_err(|e| io_err("id -u", e))?;
    if !output.status.success() {
        return Err(DaemonError::Autorun(format!(
            "failed to resolve current uid (status {})",
            output.status
        )));
    }

    let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if uid.is_empty() {
        return Err(DaemonError::Autorun(
            "current uid from `id -u` was empty".to_string(),
        ));
    }
    Ok(format!("gui/{uid}"))
}

// ---------------------------------------------------------------------------
// Linux: XDG autostart
// ---------------------------------------------------------------------------

/// Render the autostart desktop entry launching `vaultsync start`.
pub fn desktop_entry(command: &AgentCommand) -> String {
    format!(
        "[Desktop Entry]\n\
         Type=Application\n\
         Name={APP_NAME}\n\
         Comment=Synchronize your vault with its git remote\n\
         Exec={exec}\n\
         Terminal=false\n\
         X-GNOME-Autostart-enabled=true\n",
        exec = command.command_line("start"),
    )
}

#[derive(Debug, Clone)]
pub struct XdgAutorun {
    config_dir: PathBuf,
    command: AgentCommand,
}

impl XdgAutorun {
    pub fn new(config_dir: impl Into<PathBuf>, command: AgentCommand) -> Self {
        Self {
            config_dir: config_dir.into(),
            command,
        }
    }

    pub fn entry_path(&self) -> PathBuf {
        desktop_entry_path(&self.config_dir)
    }
}

impl Autorun for XdgAutorun {
    fn enable(&self) -> Result<(), DaemonError> {
        let dir = autostart_dir(&self.config_dir);
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        let entry = self.entry_path();
        fs::write(&entry, desktop_entry(&self.command)).map_err(|e| io_err(&entry, e))?;
        tracing::info!(entry = %entry.display(), "autostart entry written");
        Ok(())
    }

    fn disable(&self) -> Result<(), DaemonError> {
        let entry = self.entry_path();
        match fs::remove_file(&entry) {
            Ok(()) => {
                tracing::info!(entry = %entry.display(), "autostart entry removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&entry, e)),
        }
    }

    fn is_enabled(&self) -> bool {
        self.entry_path().exists()
    }

    fn location(&self) -> String {
        self.entry_path().display().to_string()
    }
}

// ---------------------------------------------------------------------------
// Windows: registry Run key
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RegistryAutorun {
    command: AgentCommand,
}

impl RegistryAutorun {
    pub fn new(command: AgentCommand) -> Self {
        Self { command }
    }
}

impl Autorun for RegistryAutorun {
    fn enable(&self) -> Result<(), DaemonError> {
        ensure_windows()?;
        let value = self.command.command_line("start");
        run_tool(
            "reg",
            &["add", RUN_KEY, "/v", APP_NAME, "/t", "REG_SZ", "/d", value.as_str(), "/f"],
            false,
        )?;
        tracing::info!(key = RUN_KEY, "autorun registry value written");
        Ok(())
    }

    fn disable(&self) -> Result<(), DaemonError> {
        ensure_windows()?;
        if !self.is_enabled() {
            return Ok(());
        }
        run_tool("reg", &["delete", RUN_KEY, "/v", APP_NAME, "/f"], false)?;
        tracing::info!(key = RUN_KEY, "autorun registry value removed");
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        ensure_windows().is_ok()
            && Command::new("reg")
                .args(["query", RUN_KEY, "/v", APP_NAME])
                .output()
                .map(|output| output.status.success())
                .unwrap_or(false)
    }

    fn location(&self) -> String {
        format!("{RUN_KEY}\\{APP_NAME}")
    }
}

#[cfg(windows)]
fn ensure_windows() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(windows))]
fn ensure_windows() -> Result<(), DaemonError> {
    Err(DaemonError::Autorun(
        "registry autorun is only supported on Windows".to_string(),
    ))
}

// ---------------------------------------------------------------------------
// Selection + helpers
// ---------------------------------------------------------------------------

/// The autorun mechanism for the current platform, registering the running
/// executable against `base_dir`.
pub fn platform_autorun(base_dir: &Path) -> Result<Box<dyn Autorun>, DaemonError> {
    let binary = std::env::current_exe().map_err(|e| io_err("current executable", e))?;
    let command = AgentCommand::new(binary, base_dir);

    if cfg!(target_os = "macos") {
        let home = dirs::home_dir()
            .ok_or_else(|| DaemonError::Autorun("cannot determine home directory".to_string()))?;
        Ok(Box::new(LaunchdAutorun::new(home, command)))
    } else if cfg!(windows) {
        Ok(Box::new(RegistryAutorun::new(command)))
    } else if cfg!(unix) {
        let config = dirs::config_dir().ok_or_else(|| {
            DaemonError::Autorun("cannot determine configuration directory".to_string())
        })?;
        Ok(Box::new(XdgAutorun::new(config, command)))
    } else {
        Err(DaemonError::Autorun(
            "autorun is not supported on this platform".to_string(),
        ))
    }
}

fn run_tool(program: &str, args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| io_err(program, e))?;

    if output.status.success() || ignore_failure {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Err(DaemonError::Autorun(format!(
        "{program} failed (status {}): {} {}",
        output.status, stdout, stderr
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use plist::Value;
    use tempfile::TempDir;

    fn command() -> AgentCommand {
        AgentCommand::new(
            "/usr/local/bin/vaultsync",
            "/Users/tester/Library/Application Support/vaultsync",
        )
    }

    #[test]
    fn plist_contains_required_launchd_fields() {
        let log_dir = Path::new("/Users/tester/Library/Application Support/vaultsync");
        let plist = generate_plist(&command(), log_dir);

        let value = Value::from_reader_xml(plist.as_bytes()).expect("parse plist");
        let dict = value.as_dictionary().expect("plist root dict");

        assert_eq!(
            dict.get("Label").and_then(Value::as_string),
            Some("dev.vaultsync.agent")
        );
        assert_eq!(dict.get("RunAtLoad").and_then(Value::as_boolean), Some(true));
        let keep_alive = dict
            .get("KeepAlive")
            .and_then(Value::as_dictionary)
            .expect("KeepAlive dict");
        assert_eq!(
            keep_alive.get("SuccessfulExit").and_then(Value::as_boolean),
            Some(false)
        );

        let args: Vec<&str> = dict
            .get("ProgramArguments")
            .and_then(Value::as_array)
            .expect("ProgramArguments array")
            .iter()
            .map(|v| v.as_string().expect("program arg as string"))
            .collect();
        assert_eq!(
            args,
            vec![
                "/usr/local/bin/vaultsync",
                "--home",
                "/Users/tester/Library/Application Support/vaultsync",
                "run"
            ]
        );
        assert_eq!(
            dict.get("StandardErrorPath").and_then(Value::as_string),
            Some("/Users/tester/Library/Application Support/vaultsync/agent-err.log")
        );
    }

    #[test]
    fn plist_escapes_markup_in_paths() {
        let command = AgentCommand::new("/opt/R&D/vaultsync", "/tmp/<vault>");
        let plist = generate_plist(&command, Path::new("/tmp"));
        let value = Value::from_reader_xml(plist.as_bytes()).expect("parse plist");
        let args = value
            .as_dictionary()
            .and_then(|d| d.get("ProgramArguments"))
            .and_then(Value::as_array)
            .expect("args");
        assert_eq!(args[0].as_string(), Some("/opt/R&D/vaultsync"));
        assert_eq!(args[2].as_string(), Some("/tmp/<vault>"));
    }

    #[test]
    fn command_line_quotes_arguments_with_spaces() {
        assert_eq!(
            command().command_line("start"),
            "/usr/local/bin/vaultsync --home \"/Users/tester/Library/Application Support/vaultsync\" start"
        );
    }

    #[test]
    fn desktop_entry_runs_background_start() {
        let entry = desktop_entry(&AgentCommand::new("/usr/bin/vaultsync", "/home/ada/.config/vaultsync"));
        assert!(entry.starts_with("[Desktop Entry]\n"));
        assert!(entry.contains("Name=VaultSync\n"));
        assert!(entry.contains("Exec=/usr/bin/vaultsync --home /home/ada/.config/vaultsync start\n"));
        assert!(entry.contains("Terminal=false\n"));
    }

    #[test]
    fn xdg_autorun_enable_disable_cycle() {
        let config = TempDir::new().expect("config dir");
        let autorun = XdgAutorun::new(config.path(), command());

        assert!(!autorun.is_enabled());
        autorun.enable().expect("enable");
        assert!(autorun.is_enabled());
        assert!(config.path().join("autostart/vaultsync.desktop").exists());

        autorun.disable().expect("disable");
        assert!(!autorun.is_enabled());
        autorun.disable().expect("disabling twice is fine");
    }

    #[test]
    #[cfg(not(target_os = "macos"))]
    fn launchd_is_rejected_off_macos() {
        let home = TempDir::new().expect("home");
        let autorun = LaunchdAutorun::new(home.path(), command());
        assert!(matches!(autorun.enable(), Err(DaemonError::Autorun(_))));
        assert!(!autorun.is_enabled());
        assert!(autorun.location().ends_with("dev.vaultsync.agent.plist"));
    }

    #[test]
    #[cfg(not(windows))]
    fn registry_is_rejected_off_windows() {
        let autorun = RegistryAutorun::new(command());
        assert!(autorun.enable().is_err());
        assert!(!autorun.is_enabled());
        assert!(autorun.location().ends_with("\\Run\\VaultSync"));
    }
}
