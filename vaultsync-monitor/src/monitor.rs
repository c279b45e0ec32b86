//! Cached presence detection for one named process.
//!
//! Lookup order on [`ProcessPresenceMonitor::is_running`]:
//!
//! 1. a result younger than `cache_ttl` is returned as-is;
//! 2. previously found PIDs are re-validated (cheap);
//! 3. otherwise, or when `full_scan_interval` has passed, the whole process
//!    table is scanned by exact name.

use std::collections::BTreeSet;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use crate::table::{ProcessInfo, ProcessTable, SysinfoTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorTiming {
    pub cache_ttl: Duration,
    pub full_scan_interval: Duration,
    /// Sampling period of the `wait_for_*` helpers.
    pub poll_interval: Duration,
}

impl Default for MonitorTiming {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(2),
            full_scan_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
struct State<T> {
    table: T,
    pids: BTreeSet<u32>,
    last_full_scan: Option<Instant>,
    last_check: Option<(Instant, bool)>,
}

#[derive(Debug)]
pub struct ProcessPresenceMonitor<T: ProcessTable = SysinfoTable> {
    process_name: String,
    timing: MonitorTiming,
    state: Mutex<State<T>>,
}

impl ProcessPresenceMonitor<SysinfoTable> {
    pub fn new(process_name: impl Into<String>) -> Self {
        Self::with_table(process_name, SysinfoTable::new(), MonitorTiming::default())
    }
}

impl<T: ProcessTable> ProcessPresenceMonitor<T> {
    pub fn with_table(process_name: impl Into<String>, table: T, timing: MonitorTiming) -> Self {
        let process_name = process_name.into();
        tracing::debug!(process = %process_name, "process monitor ready");
        Self {
            process_name,
            timing,
            state: Mutex::new(State {
                table,
                pids: BTreeSet::new(),
                last_full_scan: None,
                last_check: None,
            }),
        }
    }

    pub fn process_name(&self) -> &str {
        &self.process_name
    }

    /// Whether the process is running, with at most `cache_ttl` staleness.
    /// Query errors are logged and read as "not running".
    pub fn is_running(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if let Some((at, result)) = state.last_check {
            if now.duration_since(at) < self.timing.cache_ttl {
                return result;
            }
        }

        let running = match self.check(&mut state, now) {
            Ok(running) => running,
            Err(e) => {
                tracing::warn!(process = %self.process_name, error = %e, "process monitoring error");
                false
            }
        };
        state.last_check = Some((now, running));
        running
    }

    fn check(&self, state: &mut State<T>, now: Instant) -> Result<bool, crate::MonitorError> {
        let scan_due = state
            .last_full_scan
            .map_or(true, |at| now.duration_since(at) >= self.timing.full_scan_interval);

        if !state.pids.is_empty() && !scan_due {
            let mut alive = BTreeSet::new();
            for pid in std::mem::take(&mut state.pids) {
                if state.table.is_alive(pid, &self.process_name)? {
                    alive.insert(pid);
                }
            }
            if !alive.is_empty() {
                state.pids = alive;
                return Ok(true);
            }
        }

        state.pids = state.table.find_by_name(&self.process_name)?;
        state.last_full_scan = Some(now);
        Ok(!state.pids.is_empty())
    }

    /// Block until the process appears or `timeout` passes.
    pub fn wait_for_start(&self, timeout: Duration) -> bool {
        tracing::info!(process = %self.process_name, timeout_secs = timeout.as_secs(), "waiting for start");
        let started = self.wait_until(timeout, true);
        if !started {
            tracing::warn!(process = %self.process_name, "timed out waiting for start");
        }
        started
    }

    /// Block until the process is gone or `timeout` passes.
    pub fn wait_for_stop(&self, timeout: Duration) -> bool {
        tracing::info!(process = %self.process_name, timeout_secs = timeout.as_secs(), "waiting for stop");
        let stopped = self.wait_until(timeout, false);
        if !stopped {
            tracing::warn!(process = %self.process_name, "timed out waiting for stop");
        }
        stopped
    }

    fn wait_until(&self, timeout: Duration, running: bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if self.is_running() == running {
                return true;
            }
            thread::sleep(self.timing.poll_interval);
        }
        false
    }

    /// Forget cached PIDs and results so the next query does a full scan.
    pub fn clear_cache(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.pids.clear();
        state.last_full_scan = None;
        state.last_check = None;
    }

    /// Details of one matching process, if running.
    pub fn process_info(&self) -> Option<ProcessInfo> {
        if !self.is_running() {
            return None;
        }
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let pid = *state.pids.iter().next()?;
        state.table.describe(pid)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
