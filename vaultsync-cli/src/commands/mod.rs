pub mod autorun;
pub mod backup;
pub mod repo;
pub mod service;
pub mod settings;

use std::path::Path;

use anyhow::{Context, Result};

use vaultsync_core::{loader, paths, Config, Settings};
use vaultsync_daemon::logging::{self, LogGuard};

/// Full settings, including the remote URL built from `.env`.
pub(crate) fn load_settings(home: &Path) -> Result<Settings> {
    Settings::load_at(home).with_context(|| {
        format!(
            "failed to load configuration from {}; run `vaultsync check`",
            home.display()
        )
    })
}

/// Validated `config.yaml` alone, for commands that never touch the remote.
pub(crate) fn load_config(home: &Path) -> Result<Config> {
    let path = paths::config_path(home);
    let config = loader::load_config_at(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    loader::validate(&config).context("configuration is invalid")?;
    Ok(config)
}

/// Console logging for one-shot commands.
pub(crate) fn console_logging(config: &Config) -> Result<LogGuard> {
    logging::init(&config.logging.level, None, true).context("failed to initialise logging")
}

/// `1536` → `1.5 KiB`.
pub(crate) fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_picks_the_largest_unit() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(10 * 1024 * 1024), "10.0 MiB");
    }
}
