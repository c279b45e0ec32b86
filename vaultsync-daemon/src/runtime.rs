use std::io::IsTerminal;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use vaultsync_backup::SnapshotManager;
use vaultsync_core::{loader, paths, Settings};
use vaultsync_git::RepositoryController;
use vaultsync_monitor::ProcessPresenceMonitor;

use crate::engine::{EngineParts, SyncEngine};
use crate::error::{io_err, DaemonError};
use crate::log_rotation::{rotate_if_needed, MAX_LOG_BYTES, MAX_ROTATED_FILES};
use crate::logging;
use crate::notify::{DesktopNotifier, Notifier};
use crate::process::PidFile;

/// Run VaultSync in the foreground and block until it exits.
///
/// Loads and validates `<base>/config.yaml`, rotates and opens the log file,
/// records the PID file, then drives the sync loop until Ctrl-C or SIGTERM.
pub fn start_blocking(base: &Path) -> Result<(), DaemonError> {
    let settings = Settings::load_at(base)?;
    let log_file = settings.log_file();
    let rotation = rotate_if_needed(&log_file, MAX_LOG_BYTES, MAX_ROTATED_FILES);
    let _log_guard = logging::init(
        &settings.config.logging.level,
        Some(&log_file),
        std::io::stderr().is_terminal(),
    )?;
    match rotation {
        Ok(true) => tracing::info!(path = %log_file.display(), "log file rotated"),
        Ok(false) => {}
        Err(err) => tracing::warn!(path = %log_file.display(), error = %err, "log rotation failed"),
    }

    let _pid_file = PidFile::acquire(paths::pid_path(base))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(settings))
}

/// Build the components from `settings` and run until a shutdown signal.
pub async fn run(settings: Settings) -> Result<(), DaemonError> {
    let config = &settings.config;
    tracing::info!(
        vault = %config.vault.path.display(),
        mode = %config.sync.mode,
        remote = %loader::mask_credentials(&settings.remote_url),
        "VaultSync starting"
    );

    let notifier: Arc<dyn Notifier> = Arc::new(DesktopNotifier::new(&config.notification));
    let repository = Arc::new(RepositoryController::new(
        &config.git,
        &config.vault.path,
        settings.remote_url.as_str(),
        config.vault.branch.as_str(),
    ));
    let snapshots = Arc::new(SnapshotManager::new(&config.backup, &config.vault.path));
    let presence = Arc::new(ProcessPresenceMonitor::new(config.sync.process_name.as_str()));

    {
        let notifier = Arc::clone(&notifier);
        blocking("startup notification", move || notifier.send_startup()).await?;
    }

    let setup_ok = {
        let repository = Arc::clone(&repository);
        blocking("repository setup", move || repository.setup()).await?
    };
    if !setup_ok {
        tracing::error!("git setup failed; exiting");
        let notifier = Arc::clone(&notifier);
        blocking("error notification", move || notifier.send_error("Git setup failed")).await?;
        return Err(DaemonError::SetupFailed);
    }

    let engine = SyncEngine::from_config(
        EngineParts {
            repository,
            snapshots,
            presence,
            notifier: Arc::clone(&notifier),
        },
        &config.sync,
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let engine_handle = {
        let shutdown = shutdown_tx.clone();
        let engine = engine.clone();
        let shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            let result = engine.run(shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = shutdown_signal() => match signal {
                    Ok(name) => {
                        tracing::info!(signal = name, "interrupted; shutting down");
                        let _ = shutdown.send(());
                        Ok(())
                    }
                    Err(err) => Err(DaemonError::Runtime(format!("signal handler failed: {err}"))),
                }
            }
        })
    };

    let (engine_result, signal_result) = tokio::join!(engine_handle, signal_handle);
    let outcome = handle_join("sync_engine", engine_result)
        .and_then(|()| handle_join("signal_handler", signal_result));

    {
        let engine = engine.clone();
        if let Some(pushed) = blocking("final push", move || engine.final_push()).await? {
            tracing::info!(pushed, "final push finished");
        }
    }

    tracing::info!("VaultSync stopped");
    blocking("shutdown notification", move || notifier.send_shutdown()).await?;
    outcome
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        _ = terminate.recv() => Ok("terminate"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

async fn blocking<T, F>(task: &'static str, f: F) -> Result<T, DaemonError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| DaemonError::Runtime(format!("{task} task join failure: {err}")))
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Runtime(format!("{task} task join failure: {err}"))),
    }
}
