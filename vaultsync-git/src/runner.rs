//! Serialized execution of `git` commands against one working tree.
//!
//! Every invocation for a given [`CommandRunner`] goes through a single mutex so
//! commands queue instead of interleaving on the same repository. A timed-out
//! command is killed and reported with [`TIMEOUT_EXIT_CODE`].

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Exit code reported for commands that exceeded their deadline.
pub const TIMEOUT_EXIT_CODE: i32 = 124;
/// Exit code reported when the process could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 1;

const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Stderr fragments git prints on perfectly healthy runs.
const BENIGN_STDERR: &[&str] = &[
    "lf will be replaced by crlf",
    "crlf will be replaced by lf",
    "warning: adding embedded git repository",
    "set up to track",
    "-> fetch_head",
    "[new branch]",
    "to https://github.com",
    "main -> main",
    "fast-forward",
    "switched to a new branch",
    "successfully rebased",
];

// ---------------------------------------------------------------------------
// CommandResult
// ---------------------------------------------------------------------------

/// Captured outcome of one command. Output is decoded lossily.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// The command line as executed, for logs.
    pub command: String,
    pub success: bool,
}

impl CommandResult {
    pub fn new(exit_code: i32, stdout: String, stderr: String, command: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            command,
            success: exit_code == 0,
        }
    }

    fn timed_out(command: String, timeout: Duration) -> Self {
        Self::new(
            TIMEOUT_EXIT_CODE,
            String::new(),
            format!("Command timed out after {}s", timeout.as_secs()),
            command,
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.exit_code == TIMEOUT_EXIT_CODE
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

/// Runs `git` in a fixed working directory. Cheap to clone; clones share the
/// lock and the cached availability flag.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    program: String,
    workdir: PathBuf,
    default_timeout: Duration,
    lock: Mutex<()>,
    available: OnceLock<bool>,
}

impl CommandRunner {
    pub fn new(workdir: impl Into<PathBuf>, default_timeout: Duration) -> Self {
        Self::with_program("git", workdir, default_timeout)
    }

    /// Use a different executable, e.g. an absolute path to `git`.
    pub fn with_program(
        program: impl Into<String>,
        workdir: impl Into<PathBuf>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                program: program.into(),
                workdir: workdir.into(),
                default_timeout,
                lock: Mutex::new(()),
                available: OnceLock::new(),
            }),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.inner.workdir
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Whether the executable answers `--version`. Computed once per runner.
    pub fn is_available(&self) -> bool {
        *self.inner.available.get_or_init(|| {
            let result = self.run(&["--version"], "Git availability check", Some(AVAILABILITY_TIMEOUT));
            if result.success {
                tracing::debug!(version = %result.stdout.trim(), "git available");
            } else {
                tracing::error!(program = %self.inner.program, "git not found on PATH");
            }
            result.success
        })
    }

    /// Run one command synchronously, holding the repository lock for its
    /// whole duration. `timeout` defaults to the configured command timeout.
    pub fn run(&self, args: &[&str], description: &str, timeout: Option<Duration>) -> CommandResult {
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let command = self.command_line(args);
        let _guard = self.inner.lock.lock().unwrap_or_else(|e| e.into_inner());

        tracing::debug!(command = %command, "executing");
        let result = self.execute(args, command, timeout);
        log_result(&result, description, timeout);
        result
    }

    /// Run on a dedicated worker thread and wait at most `timeout` for it.
    ///
    /// Any failure to schedule or collect the worker collapses into the same
    /// timeout-shaped result.
    pub fn run_on_worker(
        &self,
        args: &[&str],
        description: &str,
        timeout: Option<Duration>,
    ) -> CommandResult {
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let command = self.command_line(args);
        let owned: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        let runner = self.clone();
        let label = description.to_string();
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("git-worker".to_string())
            .spawn(move || {
                let refs: Vec<&str> = owned.iter().map(String::as_str).collect();
                let _ = tx.send(runner.run(&refs, &label, Some(timeout)));
            });
        if let Err(e) = spawned {
            tracing::error!(description, error = %e, "failed to start git worker");
            return CommandResult::timed_out(command, timeout);
        }

        match rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(description, timeout_secs = timeout.as_secs(), "git worker timed out");
                CommandResult::timed_out(command, timeout)
            }
        }
    }

    fn command_line(&self, args: &[&str]) -> String {
        std::iter::once(self.inner.program.as_str())
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn execute(&self, args: &[&str], command: String, timeout: Duration) -> CommandResult {
        let mut cmd = Command::new(&self.inner.program);
        cmd.args(args)
            .current_dir(&self.inner.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        hide_console(&mut cmd);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandResult::new(SPAWN_FAILURE_EXIT_CODE, String::new(), e.to_string(), command)
            }
        };

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        match wait_with_deadline(&mut child, timeout) {
            Ok(Some(status)) => CommandResult::new(
                status.code().unwrap_or(SPAWN_FAILURE_EXIT_CODE),
                collect(stdout),
                collect(stderr),
                command,
            ),
            // Readers are left detached: grandchildren may still hold the pipes.
            Ok(None) => CommandResult::timed_out(command, timeout),
            Err(e) => CommandResult::new(SPAWN_FAILURE_EXIT_CODE, String::new(), e.to_string(), command),
        }
    }
}

// ---------------------------------------------------------------------------
// Process helpers
// ---------------------------------------------------------------------------

/// Poll `child` until it exits or `timeout` elapses. `Ok(None)` means the
/// child was killed at the deadline.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<std::process::ExitStatus>> {
    let start = Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => return Ok(Some(status)),
            None if start.elapsed() >= timeout => {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            None => thread::sleep(POLL_INTERVAL),
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

#[cfg(windows)]
fn hide_console(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
fn hide_console(_cmd: &mut Command) {}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn log_result(result: &CommandResult, description: &str, timeout: Duration) {
    if result.is_timeout() {
        tracing::error!(description, timeout_secs = timeout.as_secs(), "command timed out");
        return;
    }
    if result.success {
        let out = result.stdout.trim();
        if !out.is_empty() && !out.to_lowercase().contains("nothing to commit") {
            tracing::debug!(description, stdout = %out, "command succeeded");
        }
    } else {
        tracing::error!(description, exit_code = result.exit_code, "command failed");
        if !result.stderr.trim().is_empty() {
            tracing::error!(description, stderr = %result.stderr.trim(), "command error output");
        }
    }
    let stderr = result.stderr.trim();
    if !stderr.is_empty() {
        if is_benign(stderr) {
            tracing::debug!(description, stderr, "git progress output");
        } else {
            tracing::warn!(description, stderr, "git reported warnings");
        }
    }
}

/// Whether stderr contains only messages git emits during normal operation.
pub fn is_benign(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    BENIGN_STDERR.iter().any(|pattern| lower.contains(pattern))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
