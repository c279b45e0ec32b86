//! Size-based log rotation.
//!
//! Rotates a log file once it reaches 10 MiB, keeping at most 5 numbered copies:
//!   vaultsync.log → vaultsync.log.1 → vaultsync.log.2 → … → vaultsync.log.5
//!
//! Rotation runs before the file is opened for writing, so a running process
//! never writes into a renamed copy.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated copies to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size is at least `max_bytes`.
///
/// Rotation sequence (oldest first):
///   `<name>.<max_files>` deleted
///   `<name>.<n>` → `<name>.<n+1>` for n = max_files-1 … 1
///   `<name>` → `<name>.1`
///   fresh empty `<name>` created.
///
/// Returns `true` if rotation occurred, `false` if the file was under the
/// threshold or did not exist yet.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes || max_files == 0 {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }

    fs::rename(log_path, numbered_path(log_path, 1))?;

    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate each of `logs` with the default limits.
///
/// Failures are logged as warnings; one file never blocks the next.
pub fn rotate_logs<'a>(logs: impl IntoIterator<Item = &'a Path>) {
    for log_path in logs {
        match rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// Path of the `n`-th rotated copy of `base` (e.g. `vaultsync.log.2`).
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("vaultsync.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
