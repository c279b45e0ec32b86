//! `vaultsync run|start|stop|status`: process lifecycle and visibility.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use vaultsync_core::{loader, paths, Config};
use vaultsync_daemon::{
    platform_autorun, start_blocking, BackgroundProcess, DaemonError, PidFileProcess,
};
use vaultsync_monitor::{ProcessInfo, ProcessPresenceMonitor};

pub fn run(home: &Path) -> Result<()> {
    println!("{} Starting VaultSync in the foreground (Ctrl-C to stop)", "▶".green());
    match start_blocking(home) {
        Ok(()) => Ok(()),
        Err(DaemonError::AlreadyRunning { pid }) => {
            println!("VaultSync is already running in the background (pid {pid})");
            println!("Run `vaultsync stop` first, then `vaultsync run`.");
            Ok(())
        }
        Err(err) => Err(err).context("VaultSync exited with an error"),
    }
}

pub fn start(home: &Path) -> Result<()> {
    let settings = super::load_settings(home)?;
    let process = PidFileProcess::for_current_exe(home).context("failed to locate the vaultsync binary")?;
    if let Some(pid) = process.running_pid() {
        println!("VaultSync is already running in the background (pid {pid})");
        return Ok(());
    }
    let pid = process
        .spawn_detached()
        .context("failed to start VaultSync in the background")?;
    println!("{} VaultSync started in the background (pid {pid})", "✓".green());
    println!("  Logs: {}", settings.log_file().display());
    Ok(())
}

pub fn stop(home: &Path) -> Result<()> {
    let process = PidFileProcess::for_current_exe(home).context("failed to locate the vaultsync binary")?;
    match process.stop() {
        Ok(pid) => println!("{} VaultSync stopped (pid {pid})", "✓".green()),
        Err(DaemonError::NotRunning) => println!("VaultSync is not running"),
        Err(err) => return Err(err).context("failed to stop VaultSync"),
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

/// Arguments for `vaultsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    home: String,
    background: BackgroundStatus,
    autorun: AutorunStatus,
    application: ApplicationStatus,
}

#[derive(Debug, Serialize)]
struct BackgroundStatus {
    running: bool,
    pid: Option<u32>,
    process: Option<ProcessInfo>,
}

#[derive(Debug, Serialize)]
struct AutorunStatus {
    supported: bool,
    enabled: bool,
    location: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApplicationStatus {
    process_name: String,
    running: bool,
    process: Option<ProcessInfo>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "component")]
    component: &'static str,
    #[tabled(rename = "state")]
    state: String,
    #[tabled(rename = "detail")]
    detail: String,
}

impl StatusArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let report = build_report(home)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&report);
        Ok(())
    }
}

fn build_report(home: &Path) -> Result<StatusReport> {
    let process = PidFileProcess::for_current_exe(home).context("failed to locate the vaultsync binary")?;
    let pid = process.running_pid();
    let background = BackgroundStatus {
        running: pid.is_some(),
        pid,
        process: pid.and_then(|_| process.info()),
    };

    let autorun = match platform_autorun(home) {
        Ok(autorun) => AutorunStatus {
            supported: true,
            enabled: autorun.is_enabled(),
            location: Some(autorun.location()),
        },
        Err(_) => AutorunStatus {
            supported: false,
            enabled: false,
            location: None,
        },
    };

    // An incomplete config still has a meaningful process name to report.
    let process_name = loader::load_config_at(&paths::config_path(home))
        .unwrap_or_else(|_| Config::template())
        .sync
        .process_name;
    let monitor = ProcessPresenceMonitor::new(process_name.as_str());
    let app_running = monitor.is_running();
    let application = ApplicationStatus {
        process: if app_running { monitor.process_info() } else { None },
        running: app_running,
        process_name,
    };

    Ok(StatusReport {
        home: home.display().to_string(),
        background,
        autorun,
        application,
    })
}

fn print_table(report: &StatusReport) {
    println!(
        "VaultSync v{} | home {}",
        env!("CARGO_PKG_VERSION"),
        report.home
    );

    let background_detail = match &report.background.process {
        Some(info) => format!(
            "pid {} | {} | {}",
            info.pid,
            info.status,
            super::human_bytes(info.memory_bytes)
        ),
        None => match report.background.pid {
            Some(pid) => format!("pid {pid}"),
            None => "use `vaultsync start`".to_string(),
        },
    };
    let autorun_detail = match (&report.autorun.location, report.autorun.supported) {
        (Some(location), _) => location.clone(),
        (None, false) => "not supported on this platform".to_string(),
        (None, true) => String::new(),
    };
    let application_detail = match &report.application.process {
        Some(info) => format!("{} (pid {})", report.application.process_name, info.pid),
        None => report.application.process_name.clone(),
    };

    let rows = vec![
        StatusTableRow {
            component: "background",
            state: state_label(report.background.running, "RUNNING", "STOPPED"),
            detail: background_detail,
        },
        StatusTableRow {
            component: "autorun",
            state: state_label(report.autorun.enabled, "ENABLED", "DISABLED"),
            detail: autorun_detail,
        },
        StatusTableRow {
            component: "application",
            state: state_label(report.application.running, "OPEN", "CLOSED"),
            detail: application_detail,
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

fn state_label(on: bool, yes: &str, no: &str) -> String {
    if on {
        yes.green().bold().to_string()
    } else {
        no.bright_black().bold().to_string()
    }
}
