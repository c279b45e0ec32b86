//! vaultsync-git: drives the `git` CLI for one vault.
//!
//! [`RepositoryController`] owns setup and the pull/push/sync protocol and
//! issues every command through a serialized [`CommandRunner`].

pub mod classify;
pub mod error;
pub mod ignore;
pub mod repository;
pub mod runner;
pub mod status;

pub use classify::{classify_push_failure, PushFailureKind};
pub use error::GitError;
pub use ignore::{render_ignore, write_ignore_file, IgnoreWrite};
pub use repository::{
    PullOutcome, PushOutcome, RemoteAction, RepositoryController, SetupReport, SyncOutcome,
};
pub use runner::{CommandResult, CommandRunner, TIMEOUT_EXIT_CODE};
pub use status::{repo_identity, ChangeSummary, DivergenceReport, IntegrationStrategy};
