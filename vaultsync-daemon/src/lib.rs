//! vaultsync-daemon: the long-running side of VaultSync.
//!
//! - [`engine`]: the sync loop and its in-flight guard
//! - [`notify`]: desktop notifications
//! - [`logging`] / [`log_rotation`]: subscriber setup and size-based rotation
//! - [`autorun`]: start at login, one implementation per platform
//! - [`process`]: detached background instance and PID file
//! - `runtime`: foreground entry point wiring everything together

pub mod autorun;
pub mod engine;
mod error;
pub mod log_rotation;
pub mod logging;
pub mod notify;
pub mod paths;
pub mod process;
mod runtime;

pub use autorun::{platform_autorun, AgentCommand, Autorun};
pub use engine::{EngineParts, EngineTiming, HandlerOutcome, SyncEngine};
pub use error::DaemonError;
pub use notify::{DesktopNotifier, LogNotifier, Notifier};
pub use process::{BackgroundProcess, PidFile, PidFileProcess};
pub use runtime::{run, start_blocking};
