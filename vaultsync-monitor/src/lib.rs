//! vaultsync-monitor: is the watched application running?

pub mod error;
pub mod monitor;
pub mod table;

pub use error::MonitorError;
pub use monitor::{MonitorTiming, ProcessPresenceMonitor};
pub use table::{ProcessInfo, ProcessTable, SysinfoTable};
