//! OS process-table access.

use std::collections::BTreeSet;
use std::ffi::OsStr;

use serde::Serialize;
use sysinfo::{Pid, Process, ProcessStatus, ProcessesToUpdate, System};

use crate::error::MonitorError;

/// Snapshot of one process, for status displays.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
    pub status: String,
    pub memory_bytes: u64,
    pub cpu_percent: f32,
    /// Seconds since the Unix epoch.
    pub start_time: u64,
}

/// The queries the presence monitor needs from the OS.
pub trait ProcessTable: Send {
    /// PIDs of live processes named exactly `name`.
    fn find_by_name(&mut self, name: &str) -> Result<BTreeSet<u32>, MonitorError>;

    /// Whether `pid` still exists and is still named `name`.
    fn is_alive(&mut self, pid: u32, name: &str) -> Result<bool, MonitorError>;

    fn describe(&mut self, pid: u32) -> Option<ProcessInfo>;
}

/// [`ProcessTable`] backed by `sysinfo`. Zombies count as gone.
#[derive(Debug)]
pub struct SysinfoTable {
    system: System,
}

impl SysinfoTable {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }

    fn ensure_supported() -> Result<(), MonitorError> {
        if sysinfo::IS_SUPPORTED_SYSTEM {
            Ok(())
        } else {
            Err(MonitorError::Unsupported)
        }
    }
}

impl Default for SysinfoTable {
    fn default() -> Self {
        Self::new()
    }
}

fn is_live_match(process: &Process, name: &str) -> bool {
    process.name() == OsStr::new(name) && process.status() != ProcessStatus::Zombie
}

impl ProcessTable for SysinfoTable {
    fn find_by_name(&mut self, name: &str) -> Result<BTreeSet<u32>, MonitorError> {
        Self::ensure_supported()?;
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let found: BTreeSet<u32> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| is_live_match(process, name))
            .map(|(pid, _)| pid.as_u32())
            .collect();
        for pid in &found {
            tracing::debug!(process = name, pid, "found process");
        }
        Ok(found)
    }

    fn is_alive(&mut self, pid: u32, name: &str) -> Result<bool, MonitorError> {
        Self::ensure_supported()?;
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        Ok(self
            .system
            .process(pid)
            .is_some_and(|process| is_live_match(process, name)))
    }

    fn describe(&mut self, pid: u32) -> Option<ProcessInfo> {
        let pid = Pid::from_u32(pid);
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|process| ProcessInfo {
            pid: pid.as_u32(),
            name: process.name().to_string_lossy().into_owned(),
            status: process.status().to_string(),
            memory_bytes: process.memory(),
            cpu_percent: process.cpu_usage(),
            start_time: process.start_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_the_current_process_by_its_own_name() {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return;
        }
        let mut table = SysinfoTable::new();
        let me = std::process::id();
        let info = table.describe(me).expect("current process is visible");
        assert_eq!(info.pid, me);

        assert!(table.is_alive(me, &info.name).expect("query"));
        assert!(table.find_by_name(&info.name).expect("scan").contains(&me));
        assert!(!table.is_alive(me, "vaultsync-not-this-name").expect("query"));
    }
}
