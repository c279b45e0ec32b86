//! Detached background instance tracked through `<base>/.pid`.
//!
//! `vaultsync start` spawns `vaultsync --home <base> run` in its own process
//! group with no console and no inherited stdio, then records its PID. The
//! foreground runtime holds a [`PidFile`] for its lifetime, so a process
//! started by launchd or a login item is visible to `status` and `stop` too.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, Signal, System};
use vaultsync_core::{paths, RetryPolicy};
use vaultsync_monitor::{ProcessInfo, ProcessTable, SysinfoTable};

use crate::error::{io_err, DaemonError};
use crate::paths::STOP_GRACE;

const STOP_POLL: Duration = Duration::from_millis(250);
const STARTUP_SETTLE: Duration = Duration::from_secs(1);

pub trait BackgroundProcess {
    /// Start the detached instance and return its PID.
    fn spawn_detached(&self) -> Result<u32, DaemonError>;

    /// PID of the live instance, if any. Stale PID files are removed.
    fn running_pid(&self) -> Option<u32>;

    fn is_running(&self) -> bool {
        self.running_pid().is_some()
    }

    /// Terminate gracefully, killing after the grace period.
    fn stop(&self) -> Result<u32, DaemonError>;

    fn info(&self) -> Option<ProcessInfo>;
}

#[derive(Debug, Clone)]
pub struct PidFileProcess {
    base_dir: PathBuf,
    binary: PathBuf,
    pid_file: PathBuf,
    startup: RetryPolicy,
    grace: Duration,
}

impl PidFileProcess {
    pub fn new(base_dir: impl Into<PathBuf>, binary: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            pid_file: paths::pid_path(&base_dir),
            base_dir,
            binary: binary.into(),
            startup: RetryPolicy::new(10, Duration::from_millis(300)),
            grace: STOP_GRACE,
        }
    }

    /// Manage instances of the currently running executable.
    pub fn for_current_exe(base_dir: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let binary = std::env::current_exe().map_err(|e| io_err("current executable", e))?;
        Ok(Self::new(base_dir, binary))
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn pid_file(&self) -> &Path {
        &self.pid_file
    }

    fn expected_name(&self) -> String {
        self.binary
            .file_stem()
            .map(|s| s.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn build_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .arg("--home")
            .arg(&self.base_dir)
            .arg("run")
            .current_dir(&self.base_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        detach(&mut command);
        command
    }

    fn confirm_started(&self, child: &mut Child) -> Result<(), DaemonError> {
        let pid = child.id();
        self.startup
            .run(
                |_| match child.try_wait() {
                    Ok(Some(status)) => Err(Startup::Exited(status.to_string())),
                    Err(e) => Err(Startup::Exited(e.to_string())),
                    Ok(None) if is_live(pid) => Ok(()),
                    Ok(None) => Err(Startup::Pending(pid)),
                },
                |e| matches!(e, Startup::Pending(_)),
            )
            .map_err(|e| DaemonError::Process(e.to_string()))?;

        thread::sleep(STARTUP_SETTLE);
        match child.try_wait() {
            Ok(Some(status)) => Err(DaemonError::Process(format!(
                "background process exited during startup ({status}); check the log file"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
enum Startup {
    Pending(u32),
    Exited(String),
}

impl fmt::Display for Startup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Startup::Pending(pid) => write!(f, "process {pid} not visible yet"),
            Startup::Exited(status) => write!(f, "background process exited early: {status}"),
        }
    }
}

impl BackgroundProcess for PidFileProcess {
    fn spawn_detached(&self) -> Result<u32, DaemonError> {
        if let Some(pid) = self.running_pid() {
            return Err(DaemonError::AlreadyRunning { pid });
        }

        let mut child = self
            .build_command()
            .spawn()
            .map_err(|e| io_err(&self.binary, e))?;
        let pid = child.id();
        tracing::info!(pid, binary = %self.binary.display(), "spawned background process");

        self.confirm_started(&mut child)?;
        write_pid(&self.pid_file, pid)?;
        Ok(pid)
    }

    fn running_pid(&self) -> Option<u32> {
        let pid = read_pid(&self.pid_file)?;
        let expected = self.expected_name();
        if is_live(pid) && name_matches(pid, &expected) {
            return Some(pid);
        }
        tracing::debug!(pid, "removing stale pid file");
        let _ = fs::remove_file(&self.pid_file);
        None
    }

    fn stop(&self) -> Result<u32, DaemonError> {
        let pid = self.running_pid().ok_or(DaemonError::NotRunning)?;
        let sys_pid = Pid::from_u32(pid);
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);

        if let Some(process) = system.process(sys_pid) {
            tracing::info!(pid, "stopping background process");
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
        }

        let deadline = Instant::now() + self.grace;
        while is_live(pid) {
            if Instant::now() >= deadline {
                tracing::warn!(pid, "process did not exit in time; killing");
                system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
                if let Some(process) = system.process(sys_pid) {
                    process.kill();
                }
                break;
            }
            thread::sleep(STOP_POLL);
        }

        match fs::remove_file(&self.pid_file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(&self.pid_file, e)),
        }
        Ok(pid)
    }

    fn info(&self) -> Option<ProcessInfo> {
        let pid = self.running_pid()?;
        SysinfoTable::new().describe(pid)
    }
}

// ---------------------------------------------------------------------------
// PID file held by the foreground runtime
// ---------------------------------------------------------------------------

/// Records the current process in the PID file and removes it on drop,
/// unless another process has taken the file over meanwhile.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
    pid: u32,
}

impl PidFile {
    /// Fails with [`DaemonError::AlreadyRunning`] when the file names another
    /// live process.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self, DaemonError> {
        let path = path.into();
        let pid = std::process::id();
        if let Some(existing) = read_pid(&path) {
            if existing != pid && is_live(existing) {
                return Err(DaemonError::AlreadyRunning { pid: existing });
            }
        }
        write_pid(&path, pid)?;
        Ok(Self { path, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if read_pid(&self.path) == Some(self.pid) {
            let _ = fs::remove_file(&self.path);
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

fn write_pid(path: &Path, pid: u32) -> Result<(), DaemonError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    fs::write(path, pid.to_string()).map_err(|e| io_err(path, e))
}

fn is_live(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    system
        .process(pid)
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}

/// Process names may be truncated by the OS, so either side may be a prefix.
fn name_matches(pid: u32, expected: &str) -> bool {
    if expected.is_empty() {
        return true;
    }
    let mut table = SysinfoTable::new();
    let Some(info) = table.describe(pid) else {
        return false;
    };
    let name = info.name.to_ascii_lowercase();
    let name = name.trim_end_matches(".exe");
    !name.is_empty() && (expected.starts_with(name) || name.starts_with(expected))
}

#[cfg(unix)]
fn detach(command: &mut Command) {
    use std::os::unix::process::CommandExt;
    command.process_group(0);
}

#[cfg(windows)]
fn detach(command: &mut Command) {
    use std::os::windows::process::CommandExt;
    const DETACHED_PROCESS: u32 = 0x0000_0008;
    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn detach(_command: &mut Command) {}
