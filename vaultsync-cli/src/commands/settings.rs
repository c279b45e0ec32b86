//! `vaultsync config|check|setup`: inspect and edit `config.yaml` and `.env`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use vaultsync_core::{loader, paths, Config, Settings, SyncMode};
use vaultsync_git::CommandRunner;

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

pub fn show(home: &Path) -> Result<()> {
    let config_path = paths::config_path(home);
    let env_path = paths::env_path(home);

    println!("{}", "VaultSync configuration".bold());
    heading("Files");
    entry("config", config_path.display());
    entry("env", env_path.display());
    entry("directory", home.display());

    if config_path.exists() {
        let config = loader::load_config_at(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        print_config(&config);
    } else {
        println!("  {} config.yaml not found; run `vaultsync setup`", "✗".red());
    }

    if env_path.exists() {
        let env = loader::read_env_at(&env_path)
            .with_context(|| format!("failed to read {}", env_path.display()))?;
        heading(".env");
        for (key, value) in &env {
            let shown = if value.is_empty() {
                "NOT SET".to_string()
            } else if key == loader::TOKEN_KEY {
                obfuscate_token(value)
            } else {
                value.clone()
            };
            entry(key, shown);
        }
    } else {
        println!("  {} .env not found", "✗".red());
    }
    Ok(())
}

fn print_config(config: &Config) {
    heading("Vault");
    entry("path", or_unset(&config.vault.path));
    entry("branch", &config.vault.branch);

    heading("Sync");
    entry("mode", config.sync.mode);
    entry("interval_minutes", config.sync.interval_minutes);
    entry("process_name", &config.sync.process_name);

    heading("Backup");
    entry("enabled", config.backup.enabled);
    if config.backup.enabled {
        entry("directory", or_unset(&config.backup.directory));
        entry("max_backups", config.backup.max_backups);
    }

    heading("Logging");
    entry("file", config.logging.file.display());
    entry("level", &config.logging.level);

    heading("Notification");
    entry("enabled", config.notification.enabled);
    if config.notification.enabled {
        entry("timeout", format!("{} seconds", config.notification.timeout));
        let icon = match &config.notification.icon_path {
            Some(path) => path.display().to_string(),
            None => "default".to_string(),
        };
        entry("icon_path", icon);
    }

    heading("Git");
    entry("timeout", format!("{} seconds", config.git.timeout));
    entry("user_name", unset_if_empty(&config.git.user_name));
    entry("user_email", unset_if_empty(&config.git.user_email));
    if let Some(url) = &config.git.remote_url {
        entry("remote_url", loader::mask_credentials(url));
    }
    for (group, patterns) in &config.git.gitignore {
        let count = if patterns.is_empty() {
            "no patterns".to_string()
        } else {
            format!("{} pattern(s)", patterns.len())
        };
        entry(&format!("gitignore.{group}"), count);
    }
}

fn heading(title: &str) {
    println!("{}", format!("  {title}").cyan().bold());
}

fn entry(key: &str, value: impl fmt::Display) {
    println!("    {key}: {value}");
}

fn or_unset(path: &Path) -> String {
    if path.as_os_str().is_empty() {
        "NOT SET".to_string()
    } else {
        path.display().to_string()
    }
}

fn unset_if_empty(value: &str) -> &str {
    if value.trim().is_empty() {
        "NOT SET"
    } else {
        value
    }
}

/// Keep the first and last four characters of long tokens.
fn obfuscate_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 8))
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "check")]
    name: &'static str,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "detail")]
    detail: String,
}

struct CheckItem {
    name: &'static str,
    ok: bool,
    detail: String,
}

pub fn check(home: &Path) -> Result<()> {
    let items = run_checks(home);
    let failed = items.iter().filter(|item| !item.ok).count();

    let rows: Vec<CheckRow> = items
        .into_iter()
        .map(|item| CheckRow {
            name: item.name,
            result: if item.ok {
                "OK".green().bold().to_string()
            } else {
                "FAIL".red().bold().to_string()
            },
            detail: item.detail,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if failed > 0 {
        bail!("{failed} check(s) failed; fix them with `vaultsync setup`");
    }
    println!("{} All requirements satisfied", "✓".green());
    Ok(())
}

fn run_checks(home: &Path) -> Vec<CheckItem> {
    let mut items = Vec::new();
    let config_path = paths::config_path(home);
    items.push(CheckItem {
        name: "config file",
        ok: config_path.exists(),
        detail: config_path.display().to_string(),
    });

    let settings = Settings::load_at(home);
    items.push(match &settings {
        Ok(settings) => CheckItem {
            name: "configuration",
            ok: true,
            detail: format!("remote {}", loader::mask_credentials(&settings.remote_url)),
        },
        Err(err) => CheckItem {
            name: "configuration",
            ok: false,
            detail: err.to_string(),
        },
    });

    let runner = CommandRunner::new(std::env::temp_dir(), Duration::from_secs(10));
    items.push(CheckItem {
        name: "git",
        ok: runner.is_available(),
        detail: "git executable on PATH".to_string(),
    });

    if let Ok(settings) = &settings {
        let config = &settings.config;
        items.push(CheckItem {
            name: "vault",
            ok: config.vault.path.is_dir(),
            detail: config.vault.path.display().to_string(),
        });
        if config.backup.enabled {
            let directory = &config.backup.directory;
            let detail = if directory.exists() {
                directory.display().to_string()
            } else {
                format!("{} (created on first backup)", directory.display())
            };
            items.push(CheckItem {
                name: "backup directory",
                ok: !directory.exists() || directory.is_dir(),
                detail,
            });
        }
    }
    items
}

// ---------------------------------------------------------------------------
// setup
// ---------------------------------------------------------------------------

/// `enable` / `disable` switch accepted by `setup`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggle(pub bool);

impl FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enable" | "enabled" | "true" | "1" => Ok(Self(true)),
            "disable" | "disabled" | "false" | "0" => Ok(Self(false)),
            other => Err(format!("invalid value '{other}'; expected: enable, disable")),
        }
    }
}

/// Arguments for `vaultsync setup`. Only the given fields change.
#[derive(Args, Debug, Default)]
pub struct SetupArgs {
    /// Vault directory to synchronize.
    #[arg(long, value_name = "PATH")]
    pub vault_path: Option<PathBuf>,

    /// on_close | interval.
    #[arg(long, value_name = "MODE")]
    pub sync_mode: Option<SyncMode>,

    /// Push interval in minutes for interval mode.
    #[arg(long, value_name = "MIN")]
    pub interval_time: Option<u64>,

    /// enable | disable snapshots before pulls.
    #[arg(long, value_name = "enable|disable")]
    pub backup: Option<Toggle>,

    /// Snapshot directory; created if missing.
    #[arg(long, value_name = "PATH")]
    pub backup_dir: Option<PathBuf>,

    /// Snapshots to retain.
    #[arg(long, value_name = "NUM")]
    pub max_backups: Option<usize>,

    /// enable | disable desktop notifications.
    #[arg(long, value_name = "enable|disable")]
    pub notification: Option<Toggle>,

    /// Commit author name.
    #[arg(long, value_name = "NAME")]
    pub git_username: Option<String>,

    /// Commit author email.
    #[arg(long, value_name = "EMAIL")]
    pub git_email: Option<String>,

    /// GitHub personal access token (stored in .env).
    #[arg(long, value_name = "TOKEN")]
    pub github_token: Option<String>,

    /// GitHub account owning the repository (stored in .env).
    #[arg(long, value_name = "USER")]
    pub github_username: Option<String>,

    /// GitHub repository name (stored in .env).
    #[arg(long, value_name = "REPO")]
    pub github_repository: Option<String>,
}

impl SetupArgs {
    pub fn run(self, home: &Path) -> Result<()> {
        let config_path = paths::config_path(home);
        let env_path = paths::env_path(home);

        let mut config = existing_config(&config_path);
        let mut env = loader::read_env_at(&env_path).unwrap_or_else(|err| {
            println!("{} could not read existing .env: {err}", "!".yellow());
            BTreeMap::new()
        });

        let changes = self.apply(&mut config, &mut env)?;
        if changes.config.is_empty() && changes.env.is_empty() {
            println!("No configuration changes to apply");
            return Ok(());
        }

        if !changes.config.is_empty() {
            loader::save_config_at(&config_path, &config)
                .with_context(|| format!("failed to save {}", config_path.display()))?;
        }
        if !changes.env.is_empty() {
            loader::save_env_at(&env_path, &env)
                .with_context(|| format!("failed to save {}", env_path.display()))?;
        }
        for line in changes.config.iter().chain(&changes.env) {
            println!("{} {line}", "✓".green());
        }
        Ok(())
    }

    /// Apply every given field, rejecting invalid values before anything is saved.
    fn apply(self, config: &mut Config, env: &mut BTreeMap<String, String>) -> Result<Changes> {
        let mut changes = Changes::default();

        if let Some(path) = self.vault_path {
            changes.config.push(format!("Vault path set to: {}", path.display()));
            config.vault.path = path;
        }
        if let Some(mode) = self.sync_mode {
            config.sync.mode = mode;
            changes.config.push(format!("Sync mode set to: {mode}"));
        }
        if let Some(minutes) = self.interval_time {
            if minutes == 0 {
                bail!("interval time must be greater than 0");
            }
            config.sync.interval_minutes = minutes;
            changes.config.push(format!("Interval time set to: {minutes} minutes"));
        }
        if let Some(Toggle(enabled)) = self.backup {
            config.backup.enabled = enabled;
            changes
                .config
                .push(format!("Backup {}", if enabled { "enabled" } else { "disabled" }));
        }
        if let Some(max) = self.max_backups {
            if max == 0 {
                bail!("maximum backups must be greater than 0");
            }
            config.backup.max_backups = max;
            changes.config.push(format!("Maximum backups set to: {max}"));
        }
        if let Some(dir) = self.backup_dir {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create backup directory {}", dir.display()))?;
            changes.config.push(format!("Backup directory set to: {}", dir.display()));
            config.backup.directory = dir;
        }
        if let Some(Toggle(enabled)) = self.notification {
            config.notification.enabled = enabled;
            changes.config.push(format!(
                "Notifications {}",
                if enabled { "enabled" } else { "disabled" }
            ));
        }
        if let Some(name) = self.git_username {
            changes.config.push(format!("Git username set to: {name}"));
            config.git.user_name = name;
        }
        if let Some(email) = self.git_email {
            changes.config.push(format!("Git email set to: {email}"));
            config.git.user_email = email;
        }

        if let Some(token) = self.github_token {
            env.insert(loader::TOKEN_KEY.to_string(), token);
            changes.env.push("GitHub token updated".to_string());
        }
        if let Some(user) = self.github_username {
            changes.env.push(format!("GitHub username set to: {user}"));
            env.insert(loader::USERNAME_KEY.to_string(), user);
        }
        if let Some(repo) = self.github_repository {
            changes.env.push(format!("GitHub repository set to: {repo}"));
            env.insert(loader::REPOSITORY_KEY.to_string(), repo);
        }
        Ok(changes)
    }
}

#[derive(Debug, Default)]
struct Changes {
    config: Vec<String>,
    env: Vec<String>,
}

/// The saved configuration, or the defaults template when absent or unreadable.
fn existing_config(path: &Path) -> Config {
    if !path.exists() {
        return Config::template();
    }
    match loader::load_config_at(path) {
        Ok(config) => config,
        Err(err) => {
            println!("{} could not load existing config, starting from defaults: {err}", "!".yellow());
            Config::template()
        }
    }
}
