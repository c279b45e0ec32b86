//! The sync loop: watches the application and triggers pulls and pushes.
//!
//! | Mode       | On entry        | App starts                     | App stops | Timer |
//! |------------|-----------------|--------------------------------|-----------|-------|
//! | `interval` | snapshot + pull | re-pull once a pull succeeded  | -         | push  |
//! | `on_close` | -               | snapshot + pull                | push      | -     |
//!
//! Every handler runs behind one in-flight flag. A handler triggered while
//! another is running logs and is skipped, never queued. The flag is released
//! on every exit path, panics included.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use vaultsync_backup::SnapshotManager;
use vaultsync_core::{SyncConfig, SyncMode};
use vaultsync_git::RepositoryController;
use vaultsync_monitor::{ProcessPresenceMonitor, ProcessTable};

use crate::error::DaemonError;
use crate::notify::Notifier;

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

pub trait VaultRepository: Send + Sync {
    fn pull(&self) -> bool;
    fn push(&self) -> bool;
}

impl VaultRepository for RepositoryController {
    fn pull(&self) -> bool {
        RepositoryController::pull(self)
    }

    fn push(&self) -> bool {
        RepositoryController::push(self)
    }
}

pub trait SnapshotTaker: Send + Sync {
    fn create_backup(&self) -> bool;
}

impl SnapshotTaker for SnapshotManager {
    fn create_backup(&self) -> bool {
        SnapshotManager::create_backup(self)
    }
}

pub trait PresenceProbe: Send + Sync {
    fn is_running(&self) -> bool;
}

impl<T: ProcessTable> PresenceProbe for ProcessPresenceMonitor<T> {
    fn is_running(&self) -> bool {
        ProcessPresenceMonitor::is_running(self)
    }
}

/// Collaborators of the engine.
#[derive(Clone)]
pub struct EngineParts {
    pub repository: Arc<dyn VaultRepository>,
    pub snapshots: Arc<dyn SnapshotTaker>,
    pub presence: Arc<dyn PresenceProbe>,
    pub notifier: Arc<dyn Notifier>,
}

// ---------------------------------------------------------------------------
// Timing + transitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineTiming {
    /// Loop sampling period.
    pub tick: Duration,
    /// Presence check period in `interval` mode.
    pub interval_check: Duration,
    /// Presence check period in `on_close` mode.
    pub on_close_check: Duration,
}

impl Default for EngineTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            interval_check: Duration::from_secs(5),
            on_close_check: Duration::from_secs(3),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Started,
    Stopped,
    Unchanged,
}

pub fn transition(previous: bool, current: bool) -> Transition {
    match (previous, current) {
        (false, true) => Transition::Started,
        (true, false) => Transition::Stopped,
        _ => Transition::Unchanged,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Startup,
    Shutdown,
    Periodic,
}

impl HandlerKind {
    fn label(self) -> &'static str {
        match self {
            HandlerKind::Startup => "Startup",
            HandlerKind::Shutdown => "Shutdown",
            HandlerKind::Periodic => "Periodic",
        }
    }

    fn messages(self) -> (&'static str, &'static str) {
        match self {
            HandlerKind::Startup => ("Synced with remote on startup", "Failed to sync on startup"),
            HandlerKind::Shutdown => ("Changes pushed on shutdown", "Failed to push on shutdown"),
            HandlerKind::Periodic => ("Periodic sync completed", "Periodic sync failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler ran; `true` when its repository operation succeeded.
    Completed(bool),
    /// Another handler was in flight.
    Skipped,
}

struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// SyncEngine
// ---------------------------------------------------------------------------

struct Inner {
    parts: EngineParts,
    mode: SyncMode,
    push_interval: Duration,
    timing: EngineTiming,
    in_flight: AtomicBool,
    initial_pull_done: AtomicBool,
    app_running: AtomicBool,
}

/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<Inner>,
}

impl SyncEngine {
    pub fn new(parts: EngineParts, mode: SyncMode, push_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                parts,
                mode,
                push_interval,
                timing: EngineTiming::default(),
                in_flight: AtomicBool::new(false),
                initial_pull_done: AtomicBool::new(false),
                app_running: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(parts: EngineParts, sync: &SyncConfig) -> Self {
        Self::new(parts, sync.mode, sync.interval())
    }

    /// Replace the loop timing. Has no effect once the engine is cloned.
    pub fn with_timing(mut self, timing: EngineTiming) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.timing = timing,
            None => tracing::warn!("engine already shared; timing unchanged"),
        }
        self
    }

    pub fn mode(&self) -> SyncMode {
        self.inner.mode
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    pub fn initial_pull_done(&self) -> bool {
        self.inner.initial_pull_done.load(Ordering::Acquire)
    }

    /// Application presence as of the last check.
    pub fn app_running(&self) -> bool {
        self.inner.app_running.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Handlers (blocking)
    // -----------------------------------------------------------------------

    /// Snapshot, then pull. A failed snapshot does not block the pull.
    pub fn handle_startup(&self) -> HandlerOutcome {
        self.guarded(HandlerKind::Startup, || {
            tracing::info!("application startup detected; pulling latest changes");
            if !self.inner.parts.snapshots.create_backup() {
                tracing::warn!("backup failed; continuing with sync");
            }
            let ok = self.inner.parts.repository.pull();
            self.inner.initial_pull_done.store(ok, Ordering::Release);
            ok
        })
    }

    pub fn handle_shutdown(&self) -> HandlerOutcome {
        self.guarded(HandlerKind::Shutdown, || {
            tracing::info!("application shutdown detected; pushing changes");
            self.inner.parts.repository.push()
        })
    }

    pub fn handle_periodic(&self) -> HandlerOutcome {
        self.guarded(HandlerKind::Periodic, || {
            tracing::info!("periodic sync triggered");
            self.inner.parts.repository.push()
        })
    }

    /// Best-effort push on exit: always in `interval` mode, in `on_close` mode
    /// only while the application is still open. `None` when not attempted.
    pub fn final_push(&self) -> Option<bool> {
        if self.inner.mode == SyncMode::OnClose && !self.app_running() {
            return None;
        }
        let Some(_guard) = InFlight::acquire(&self.inner.in_flight) else {
            tracing::warn!("sync in progress; skipping final push");
            return None;
        };
        tracing::info!("performing final push");
        let pushed = catch_unwind(AssertUnwindSafe(|| self.inner.parts.repository.push()))
            .unwrap_or_else(|payload| {
                tracing::error!(error = %panic_message(payload.as_ref()), "final push error");
                false
            });
        Some(pushed)
    }

    fn guarded(&self, kind: HandlerKind, body: impl FnOnce() -> bool) -> HandlerOutcome {
        let Some(_guard) = InFlight::acquire(&self.inner.in_flight) else {
            tracing::warn!(handler = kind.label(), "sync already in progress; skipping");
            return HandlerOutcome::Skipped;
        };

        let notifier = &self.inner.parts.notifier;
        match catch_unwind(AssertUnwindSafe(body)) {
            Ok(ok) => {
                let (success, failure) = kind.messages();
                if ok {
                    tracing::info!(handler = kind.label(), "sync completed");
                    notifier.send(true, success);
                } else {
                    tracing::error!(handler = kind.label(), "sync failed");
                    notifier.send(false, failure);
                }
                HandlerOutcome::Completed(ok)
            }
            Err(payload) => {
                let message = format!(
                    "{} sync error: {}",
                    kind.label(),
                    panic_message(payload.as_ref())
                );
                tracing::error!(critical = true, "{message}");
                notifier.send(false, &message);
                HandlerOutcome::Completed(false)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Loop
    // -----------------------------------------------------------------------

    /// Drive the configured mode until `shutdown` fires.
    ///
    /// Handlers and presence checks run on the blocking pool and are awaited
    /// one at a time.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<(), DaemonError> {
        let timing = self.inner.timing;
        let mode = self.inner.mode;
        let check_every = match mode {
            SyncMode::Interval => timing.interval_check,
            SyncMode::OnClose => timing.on_close_check,
        };

        let mut next_push = None;
        if mode == SyncMode::Interval {
            tracing::info!(
                minutes = self.inner.push_interval.as_secs() / 60,
                "starting interval mode"
            );
            let running = self.probe().await?;
            self.inner.app_running.store(running, Ordering::Release);
            self.dispatch(HandlerKind::Startup).await?;
            next_push = Some(Instant::now() + self.inner.push_interval);
        } else {
            tracing::info!("starting on-close mode; monitoring application");
        }

        let mut ticker = tokio::time::interval(timing.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_check = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            if last_check.elapsed() >= check_every {
                last_check = Instant::now();
                let running = self.probe().await?;
                let previous = self.inner.app_running.swap(running, Ordering::AcqRel);
                match (mode, transition(previous, running)) {
                    (SyncMode::Interval, Transition::Started) if self.initial_pull_done() => {
                        tracing::info!("application restarted; pulling updates");
                        self.dispatch(HandlerKind::Startup).await?;
                    }
                    (SyncMode::OnClose, Transition::Started) => {
                        self.dispatch(HandlerKind::Startup).await?;
                    }
                    (SyncMode::OnClose, Transition::Stopped) => {
                        self.dispatch(HandlerKind::Shutdown).await?;
                        tracing::info!("continuing to monitor for the next session");
                    }
                    _ => {}
                }
            }

            if let Some(due) = next_push {
                if Instant::now() >= due {
                    self.dispatch(HandlerKind::Periodic).await?;
                    next_push = Some(Instant::now() + self.inner.push_interval);
                }
            }
        }

        tracing::info!("sync loop stopped");
        Ok(())
    }

    async fn dispatch(&self, kind: HandlerKind) -> Result<HandlerOutcome, DaemonError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || match kind {
            HandlerKind::Startup => engine.handle_startup(),
            HandlerKind::Shutdown => engine.handle_shutdown(),
            HandlerKind::Periodic => engine.handle_periodic(),
        })
        .await
        .map_err(|err| DaemonError::Runtime(format!("{} handler join error: {err}", kind.label())))
    }

    async fn probe(&self) -> Result<bool, DaemonError> {
        let presence = Arc::clone(&self.inner.parts.presence);
        tokio::task::spawn_blocking(move || presence.is_running())
            .await
            .map_err(|err| DaemonError::Runtime(format!("presence check join error: {err}")))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
