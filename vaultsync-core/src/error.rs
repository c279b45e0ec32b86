//! Error types for vaultsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while loading, validating or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, annotated with the offending path.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `.env` file could not be parsed.
    #[error("failed to read environment file {path}: {source}")]
    Env {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Required remote credentials were absent from `.env`.
    #[error("missing required environment variables: {}", .0.join(", "))]
    MissingEnv(Vec<String>),

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Neither `$VAULTSYNC_HOME` nor a platform config directory is available.
    #[error("cannot determine configuration directory; set $VAULTSYNC_HOME")]
    HomeNotFound,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
