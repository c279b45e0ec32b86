//! Desktop notifications for sync results.
//!
//! [`DesktopNotifier`] rate-limits what it shows: at most one notification every
//! 5 seconds, and the same title and message at most once per 30 seconds.
//! Startup, shutdown and error notifications are forced past both limits.
//! Delivery problems are logged and reported as `false`, never raised.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;
use vaultsync_core::NotificationConfig;

pub const STARTUP_MESSAGE: &str = "VaultSync started - monitoring your vault";
pub const SHUTDOWN_MESSAGE: &str = "VaultSync stopped";

const SUCCESS_TITLE: &str = "🔄 VaultSync";
const ERROR_TITLE: &str = "❌ VaultSync Error";
const DEFAULT_SUCCESS: &str = "Sync completed successfully!";
const DEFAULT_FAILURE: &str = "Sync failed - check logs";

/// Sink for user-facing sync results.
pub trait Notifier: Send + Sync {
    /// Show a notification. `message: None` uses the default text for `success`.
    /// `force` bypasses rate limiting. Returns whether it was shown.
    fn notify(&self, success: bool, message: Option<&str>, force: bool) -> bool;

    fn send(&self, success: bool, message: &str) -> bool {
        self.notify(success, Some(message), false)
    }

    fn send_startup(&self) -> bool {
        self.notify(true, Some(STARTUP_MESSAGE), true)
    }

    fn send_shutdown(&self) -> bool {
        self.notify(true, Some(SHUTDOWN_MESSAGE), true)
    }

    fn send_error(&self, error: &str) -> bool {
        self.notify(false, Some(&format!("Error: {error}")), true)
    }
}

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, success: bool, message: Option<&str>, _force: bool) -> bool {
        let message = message.unwrap_or(default_message(success));
        if success {
            tracing::info!(text = message, "notification");
        } else {
            tracing::warn!(text = message, "notification");
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Desktop
// ---------------------------------------------------------------------------

/// One rendered notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub success: bool,
    pub timeout: Duration,
    pub icon: Option<PathBuf>,
}

/// How a rendered notification reaches the screen.
pub trait Delivery: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<(), String>;
}

/// Delivery through the platform notification command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemDelivery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimits {
    pub min_interval: Duration,
    pub duplicate_window: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(5),
            duplicate_window: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NotifierStats {
    pub enabled: bool,
    pub total_sent: u64,
    pub recent_count: usize,
    pub timeout_secs: u64,
    pub min_interval_secs: u64,
}

#[derive(Debug, Default)]
struct History {
    last_sent: Option<Instant>,
    recent: HashMap<String, Instant>,
    total_sent: u64,
}

#[derive(Debug)]
pub struct DesktopNotifier<D: Delivery = SystemDelivery> {
    config: NotificationConfig,
    delivery: D,
    limits: RateLimits,
    history: Mutex<History>,
}

impl DesktopNotifier<SystemDelivery> {
    pub fn new(config: &NotificationConfig) -> Self {
        Self::with_delivery(config, SystemDelivery, RateLimits::default())
    }
}

impl<D: Delivery> DesktopNotifier<D> {
    pub fn with_delivery(config: &NotificationConfig, delivery: D, limits: RateLimits) -> Self {
        if config.enabled {
            tracing::debug!("desktop notifications enabled");
        } else {
            tracing::debug!("desktop notifications disabled in configuration");
        }
        Self {
            config: config.clone(),
            delivery,
            limits,
            history: Mutex::new(History::default()),
        }
    }

    pub fn stats(&self) -> NotifierStats {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        NotifierStats {
            enabled: self.config.enabled,
            total_sent: history.total_sent,
            recent_count: history.recent.len(),
            timeout_secs: self.config.timeout,
            min_interval_secs: self.limits.min_interval.as_secs(),
        }
    }

    fn notify_at(&self, success: bool, message: Option<&str>, force: bool, now: Instant) -> bool {
        if !self.config.enabled {
            tracing::debug!("notifications disabled; skipping");
            return false;
        }

        let title = if success { SUCCESS_TITLE } else { ERROR_TITLE };
        let message = message.unwrap_or(default_message(success));
        let key = format!("{title}:{message}");

        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if !force {
            if let Some(last) = history.last_sent {
                if now.saturating_duration_since(last) < self.limits.min_interval {
                    tracing::debug!(
                        interval_secs = self.limits.min_interval.as_secs(),
                        "notification rate limited"
                    );
                    return false;
                }
            }
            if let Some(sent) = history.recent.get(&key) {
                let age = now.saturating_duration_since(*sent);
                if age < self.limits.duplicate_window {
                    tracing::debug!(age_secs = age.as_secs_f32(), "duplicate notification suppressed");
                    return false;
                }
            }
        }

        let notification = Notification {
            title: title.to_string(),
            message: message.to_string(),
            success,
            timeout: Duration::from_secs(self.config.timeout),
            icon: self.config.icon_path.clone().filter(|p| p.exists()),
        };
        tracing::info!(text = message, "notification");
        if let Err(err) = self.delivery.deliver(&notification) {
            tracing::error!(error = %err, "notification delivery failed");
            return false;
        }

        history.last_sent = Some(now);
        history.recent.insert(key, now);
        history.total_sent += 1;
        let window = self.limits.duplicate_window;
        history
            .recent
            .retain(|_, sent| now.saturating_duration_since(*sent) < window);
        true
    }
}

impl<D: Delivery> Notifier for DesktopNotifier<D> {
    fn notify(&self, success: bool, message: Option<&str>, force: bool) -> bool {
        self.notify_at(success, message, force, Instant::now())
    }
}

fn default_message(success: bool) -> &'static str {
    if success {
        DEFAULT_SUCCESS
    } else {
        DEFAULT_FAILURE
    }
}

// ---------------------------------------------------------------------------
// Platform commands
// ---------------------------------------------------------------------------

impl Delivery for SystemDelivery {
    fn deliver(&self, notification: &Notification) -> Result<(), String> {
        let mut command = platform_command(notification)?;
        let output = command
            .output()
            .map_err(|e| format!("failed to run notification command: {e}"))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(format!(
                "notification command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ))
        }
    }
}

#[cfg(target_os = "macos")]
fn platform_command(n: &Notification) -> Result<Command, String> {
    let script = format!(
        r#"display notification "{}" with title "{}""#,
        n.message.replace('"', "\\\""),
        n.title.replace('"', "\\\"")
    );
    let mut command = Command::new("osascript");
    command.args(["-e", script.as_str()]);
    Ok(command)
}

#[cfg(all(unix, not(target_os = "macos")))]
fn platform_command(n: &Notification) -> Result<Command, String> {
    let mut command = Command::new("notify-send");
    command
        .args(["--app-name", crate::paths::APP_NAME])
        .args(["--expire-time", &n.timeout.as_millis().to_string()])
        .args(["--urgency", if n.success { "normal" } else { "critical" }]);
    if let Some(icon) = &n.icon {
        command.arg("--icon").arg(icon);
    }
    command.args([n.title.as_str(), n.message.as_str()]);
    Ok(command)
}

#[cfg(windows)]
fn platform_command(n: &Notification) -> Result<Command, String> {
    let script = format!(
        r#"
        [Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null
        $template = [Windows.UI.Notifications.ToastNotificationManager]::GetTemplateContent([Windows.UI.Notifications.ToastTemplateType]::ToastText02)
        $textNodes = $template.GetElementsByTagName("text")
        $textNodes.Item(0).AppendChild($template.CreateTextNode("{}")) | Out-Null
        $textNodes.Item(1).AppendChild($template.CreateTextNode("{}")) | Out-Null
        $toast = [Windows.UI.Notifications.ToastNotification]::new($template)
        [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier("{}").Show($toast)
        "#,
        n.title.replace('"', "`\""),
        n.message.replace('"', "`\""),
        crate::paths::APP_NAME
    );
    let mut command = Command::new("powershell");
    command.args(["-NoProfile", "-Command", script.as_str()]);
    Ok(command)
}

#[cfg(not(any(unix, windows)))]
fn platform_command(_n: &Notification) -> Result<Command, String> {
    Err("desktop notifications are not supported on this platform".to_string())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
