//! Error types for vaultsync-git.

use std::path::PathBuf;

use thiserror::Error;

use crate::classify::PushFailureKind;

/// All errors that can end a repository operation.
#[derive(Debug, Error)]
pub enum GitError {
    /// `git` is not on the execution path.
    #[error("git executable not found on PATH")]
    Unavailable,

    /// The vault has no `.git` directory.
    #[error("repository metadata not found at {path}")]
    MissingRepository { path: PathBuf },

    /// An unfinished rebase is in the way; nothing is committed until it is resolved.
    #[error("a rebase is in progress in {path}; finish or abort it with `git rebase --abort`")]
    RebaseInProgress { path: PathBuf },

    /// A git command exited non-zero.
    #[error("{description} failed (exit code {exit_code}): {stderr}")]
    Command {
        description: String,
        exit_code: i32,
        stderr: String,
    },

    /// Uncommitted changes could not be stashed; the pull was aborted before
    /// touching the working tree.
    #[error("failed to stash local changes; pull aborted to prevent data loss: {stderr}")]
    StashFailed { stderr: String },

    /// Integrating remote commits hit a conflict; the rebase was aborted.
    #[error("conflict while integrating remote changes; manual resolution required")]
    IntegrationConflict { stderr: String },

    /// Re-applying stashed changes conflicted. The stash is left intact.
    #[error("conflict while restoring stashed changes; resolve manually, then run `git stash drop`")]
    StashRestoreConflict { stderr: String },

    /// The remote moved ahead and the pre-push rebase failed; nothing was pushed.
    #[error("failed to sync with remote before push; resolve conflicts manually: {stderr}")]
    PresyncFailed { stderr: String },

    /// `git push` failed; `kind` is the classified reason.
    #[error("push failed ({kind}): {stderr}")]
    PushFailed {
        kind: PushFailureKind,
        stderr: String,
    },

    /// Rendering the ignore file failed.
    #[error("ignore file template error: {0}")]
    Template(#[from] tera::Error),

    /// I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience constructor for [`GitError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> GitError {
    GitError::Io {
        path: path.into(),
        source,
    }
}
