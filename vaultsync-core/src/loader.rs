//! Loading, validation and persistence of `config.yaml` and `.env`.
//!
//! # API pattern
//!
//! Every function that touches the filesystem takes explicit paths (`*_at`);
//! [`Settings::load`] is the only entry point that resolves the base directory
//! from the environment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{io_err, ConfigError};
use crate::paths;

/// Environment keys used to build the authenticated GitHub remote.
pub const TOKEN_KEY: &str = "GITHUB_TOKEN";
pub const USERNAME_KEY: &str = "GITHUB_USERNAME";
pub const REPOSITORY_KEY: &str = "GITHUB_REPOSITORY";

/// A validated configuration plus the resolved remote URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_dir: PathBuf,
    pub config: Config,
    pub remote_url: String,
}

impl Settings {
    /// Load from `<base>/config.yaml` and `<base>/.env`, then validate.
    pub fn load_at(base: &Path) -> Result<Self, ConfigError> {
        let config = load_config_at(&paths::config_path(base))?;
        let env = read_env_at(&paths::env_path(base))?;
        let remote_url = build_remote_url(&config, &env)?;
        validate(&config)?;
        Ok(Self {
            base_dir: base.to_path_buf(),
            config,
            remote_url,
        })
    }

    /// `load_at` convenience wrapper resolving the base directory.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&paths::base_dir()?)
    }

    pub fn log_file(&self) -> PathBuf {
        paths::log_path(&self.base_dir, &self.config.logging.file)
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Parse `config.yaml` at `path`.
///
/// Returns `ConfigError::NotFound` if absent and `ConfigError::Parse` (with path
/// and line context) when the YAML is malformed or misses a required key.
pub fn load_config_at(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Read `KEY=value` pairs from a `.env` file without touching the process
/// environment. A missing file yields an empty map.
pub fn read_env_at(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let env_error = |source| ConfigError::Env {
        path: path.to_path_buf(),
        source,
    };
    let mut values = BTreeMap::new();
    for item in dotenvy::from_path_iter(path).map_err(env_error)? {
        let (key, value) = item.map_err(env_error)?;
        values.insert(key, value);
    }
    Ok(values)
}

/// Resolve the remote URL: explicit `git.remote_url` wins, otherwise the GitHub
/// credentials from `.env` are combined into an authenticated HTTPS URL.
pub fn build_remote_url(
    config: &Config,
    env: &BTreeMap<String, String>,
) -> Result<String, ConfigError> {
    if let Some(url) = config.git.remote_url.as_deref().filter(|u| !u.trim().is_empty()) {
        return Ok(url.trim().to_string());
    }

    let lookup = |key: &str| env.get(key).map(String::as_str).filter(|v| !v.is_empty());
    let missing: Vec<String> = [TOKEN_KEY, USERNAME_KEY, REPOSITORY_KEY]
        .into_iter()
        .filter(|key| lookup(key).is_none())
        .map(str::to_string)
        .collect();
    if !missing.is_empty() {
        return Err(ConfigError::MissingEnv(missing));
    }

    let token = lookup(TOKEN_KEY).unwrap_or_default();
    let user = lookup(USERNAME_KEY).unwrap_or_default();
    let repo = lookup(REPOSITORY_KEY).unwrap_or_default();
    Ok(format!("https://{token}@github.com/{user}/{repo}.git"))
}

// ---------------------------------------------------------------------------
// Validate
// ---------------------------------------------------------------------------

/// Check the invariants every component relies on at construction time.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::Invalid(msg));

    if config.vault.path.as_os_str().is_empty() {
        return invalid("vault path must be set".to_string());
    }
    if !config.vault.path.exists() {
        return invalid(format!(
            "vault path does not exist: {}",
            config.vault.path.display()
        ));
    }
    if config.vault.branch.trim().is_empty() {
        return invalid("vault branch must be set".to_string());
    }
    if config.sync.interval_minutes == 0 {
        return invalid("sync interval must be positive".to_string());
    }
    if config.sync.process_name.trim().is_empty() {
        return invalid("sync process name must be set".to_string());
    }
    if config.backup.enabled && config.backup.directory.as_os_str().is_empty() {
        return invalid("backup directory must be set when backups are enabled".to_string());
    }
    if config.backup.max_backups == 0 {
        return invalid("max_backups must be positive".to_string());
    }
    if config.git.user_name.trim().is_empty() {
        return invalid("git user name must be set".to_string());
    }
    if config.git.user_email.trim().is_empty() {
        return invalid("git user email must be set".to_string());
    }
    if config.git.timeout == 0 {
        return invalid("git timeout must be positive".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `path`.
///
/// Write flow: serialize → `.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_config_at(path: &Path, config: &Config) -> Result<(), ConfigError> {
    let yaml = serde_yaml::to_string(config)?;
    write_private(path, &yaml)
}

/// Atomically save `.env` pairs to `path` with a privacy header.
pub fn save_env_at(path: &Path, values: &BTreeMap<String, String>) -> Result<(), ConfigError> {
    let mut contents = String::from("# Environment Variables - KEEP THIS FILE PRIVATE!\n");
    for (key, value) in values {
        contents.push_str(&format!("{key}={value}\n"));
    }
    write_private(path, &contents)
}

fn write_private(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| io_err(parent, e))?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());
    let tmp = path.with_file_name(format!("{file_name}.tmp"));
    std::fs::write(&tmp, contents).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

/// Hide embedded credentials: `https://token@host/x` → `https://***@host/x`.
pub fn mask_credentials(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (Some(scheme), rest),
        None => (None, url),
    };
    let masked = match rest.split_once('@') {
        Some((_, host)) => format!("***@{host}"),
        None => rest.to_string(),
    };
    match scheme {
        Some(scheme) => format!("{scheme}://{masked}"),
        None => masked,
    }
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn remote_url_built_from_github_env() {
        let config = Config::template();
        let url = build_remote_url(
            &config,
            &env(&[
                (TOKEN_KEY, "ghp_abc"),
                (USERNAME_KEY, "ada"),
                (REPOSITORY_KEY, "notes"),
            ]),
        )
        .expect("url");
        assert_eq!(url, "https://ghp_abc@github.com/ada/notes.git");
    }

    #[test]
    fn explicit_remote_url_wins_over_env() {
        let mut config = Config::template();
        config.git.remote_url = Some("/srv/git/notes.git".to_string());
        let url = build_remote_url(&config, &BTreeMap::new()).expect("url");
        assert_eq!(url, "/srv/git/notes.git");
    }

    #[test]
    fn missing_env_lists_every_absent_key() {
        let config = Config::template();
        let err = build_remote_url(&config, &env(&[(USERNAME_KEY, "ada")])).unwrap_err();
        match err {
            ConfigError::MissingEnv(keys) => {
                assert_eq!(keys, vec![TOKEN_KEY.to_string(), REPOSITORY_KEY.to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn mask_hides_token() {
        assert_eq!(
            mask_credentials("https://ghp_abc@github.com/ada/notes.git"),
            "https://***@github.com/ada/notes.git"
        );
        assert_eq!(
            mask_credentials("https://github.com/ada/notes.git"),
            "https://github.com/ada/notes.git"
        );
    }

    #[test]
    fn save_then_load_config_roundtrip() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("config.yaml");
        let mut config = Config::template();
        config.vault.path = dir.path().to_path_buf();
        save_config_at(&path, &config).expect("save");
        assert!(!dir.path().join("config.yaml.tmp").exists());
        let loaded = load_config_at(&path).expect("load");
        assert_eq!(loaded, config);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
        }
    }

    #[test]
    fn env_roundtrip_keeps_values() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join(".env");
        let values = env(&[(TOKEN_KEY, "t0k3n"), (USERNAME_KEY, "ada")]);
        save_env_at(&path, &values).expect("save env");
        let read = read_env_at(&path).expect("read env");
        assert_eq!(read, values);
    }

    #[test]
    fn missing_env_file_reads_as_empty() {
        let dir = TempDir::new().expect("tempdir");
        let read = read_env_at(&dir.path().join(".env")).expect("read");
        assert!(read.is_empty());
    }
}
