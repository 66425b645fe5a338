/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::notify
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Render toast notifications and deliver them either
    directly (interactive session) or through the helper
    scheduled task (SYSTEM/service session).

  Security / Safety Notes:
    Toast text is XML-escaped and the PowerShell script is
    written to a private temp file; no user text reaches the
    command line. Delivery failures are logged, never raised.

  Dependencies:
    serde_json for the queued payload, tempfile for scripts,
    tokio::time for the settle delay.

  Operational Scope:
    Used by the prober, the self-updater and the upgrade
    driver; the `notify` subcommand drains the queue.

  Revision History:
    2026-09-14 COD  Authored notifier.
    2026-09-30 COD  Added notification level filtering.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Best-effort delivery with logged failures
    - Delivery path chosen per call from session context
============================================================*/

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::config::NotificationLevel;
use crate::error::{Result, WauError};
use crate::locale::{Locale, MessageKind, TemplateArgs};
use crate::logger::Logger;
use crate::paths::AgentPaths;
use crate::process::run_capture;
use crate::scheduler::{TaskScheduler, NOTIFY_TASK_NAME};

/// Application id the toasts are raised under (registered by the installer).
pub const TOAST_APP_ID: &str = "Windows.SystemToast.Winget.Notification";
/// Toast group shared by every Syn-Wau notification.
pub const TOAST_GROUP: &str = "WAU";

/// Visual intent of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// A notification to show the logged-in user.
///
/// Toasts sharing a `tag` replace each other instead of stacking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub tag: String,
}

impl NotificationEvent {
    pub fn new(
        title: impl Into<String>,
        message: impl Into<String>,
        severity: Severity,
        tag: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            message: message.into(),
            severity,
            tag: tag.into(),
        }
    }

    /// Build an event from the locale template for `kind`.
    pub fn from_template(
        locale: &Locale,
        kind: MessageKind,
        args: &TemplateArgs,
        severity: Severity,
        tag: impl Into<String>,
    ) -> Self {
        let (title, message) = locale.render(kind, args);
        Self::new(title, message, severity, tag)
    }
}

/// Anything that can accept notifications. Delivery is best-effort.
#[allow(async_fn_in_trait)]
pub trait NotificationSink {
    async fn notify(&self, event: NotificationEvent);
}

/// How a notification reaches the desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Interactive user session: show the toast ourselves.
    Direct,
    /// SYSTEM or service session: queue it for the helper task.
    QueuedViaHelper,
}

impl Delivery {
    /// Inspect the current process identity.
    pub fn detect() -> Self {
        let user = std::env::var("USERNAME").unwrap_or_default();
        Self::for_user(&user)
    }

    fn for_user(user: &str) -> Self {
        // Machine accounts (`HOST$`) are what SYSTEM reports on domain members.
        if cfg!(windows) && (user.eq_ignore_ascii_case("SYSTEM") || user.ends_with('$')) {
            Delivery::QueuedViaHelper
        } else {
            Delivery::Direct
        }
    }
}

/// Whether `level` lets a notification of `severity` through.
pub fn permits(level: NotificationLevel, severity: Severity) -> bool {
    match level {
        NotificationLevel::Full => true,
        NotificationLevel::SuccessOnly => severity == Severity::Success,
        NotificationLevel::None => false,
    }
}

/// Toast notifier backed by PowerShell and the helper task.
pub struct Notifier<'a> {
    paths: AgentPaths,
    level: NotificationLevel,
    logger: &'a Logger,
    settle: Duration,
}

impl<'a> Notifier<'a> {
    pub fn new(paths: AgentPaths, level: NotificationLevel, logger: &'a Logger) -> Self {
        Self {
            paths,
            level,
            logger,
            settle: Duration::from_secs(3),
        }
    }

    async fn deliver(&self, event: &NotificationEvent) -> Result<()> {
        match Delivery::detect() {
            Delivery::Direct => show_toast(&self.paths, event).await,
            Delivery::QueuedViaHelper => {
                queue_payload(&self.paths.notification_payload(), event)?;
                TaskScheduler::new().run(NOTIFY_TASK_NAME).await
            }
        }
    }
}

impl NotificationSink for Notifier<'_> {
    async fn notify(&self, event: NotificationEvent) {
        if !permits(self.level, event.severity) {
            self.logger.debug(
                "NOTIFY",
                format!("Suppressed by level: {}", event.title),
            );
            return;
        }
        match self.deliver(&event).await {
            Ok(()) => {
                self.logger
                    .debug("NOTIFY", format!("[{}] {}", event.tag, event.title));
                sleep(self.settle).await;
            }
            Err(err) => self
                .logger
                .warn("NOTIFY", format!("Notification `{}` not shown: {err}", event.title)),
        }
    }
}

/// Persist a payload for the helper task.
pub fn queue_payload(path: &Path, event: &NotificationEvent) -> Result<()> {
    let json = serde_json::to_string_pretty(event)
        .map_err(|err| WauError::Serialization(format!("Failed to encode toast: {err}")))?;
    std::fs::write(path, json).map_err(|err| {
        WauError::Filesystem(format!("Failed to queue toast {}: {err}", path.display()))
    })
}

/// Read and remove the queued payload, if any.
pub fn take_payload(path: &Path) -> Result<Option<NotificationEvent>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(WauError::Filesystem(format!(
                "Failed to read queued toast {}: {err}",
                path.display()
            )))
        }
    };
    let event = serde_json::from_str(&text)
        .map_err(|err| WauError::Serialization(format!("Invalid queued toast: {err}")))?;
    // The helper runs as a standard user and may lack delete rights on the
    // SYSTEM-written file; the next queued payload overwrites it anyway.
    let _ = std::fs::remove_file(path);
    Ok(Some(event))
}

/// Helper task entry point: show whatever the SYSTEM run queued.
pub async fn display_queued(paths: &AgentPaths, logger: &Logger) -> Result<bool> {
    match take_payload(&paths.notification_payload())? {
        Some(event) => {
            show_toast(paths, &event).await?;
            logger.debug("NOTIFY", format!("Displayed queued toast `{}`", event.title));
            Ok(true)
        }
        None => Ok(false),
    }
}

async fn show_toast(paths: &AgentPaths, event: &NotificationEvent) -> Result<()> {
    let icon = icon_for(paths, event.severity);
    let script = toast_script(event, icon.as_deref());

    let mut file = tempfile::Builder::new()
        .prefix("wau-toast-")
        .suffix(".ps1")
        .tempfile()?;
    // UTF-8 BOM so Windows PowerShell 5.1 decodes accented text correctly.
    file.write_all(b"\xEF\xBB\xBF")?;
    file.write_all(script.as_bytes())?;
    file.flush()?;

    let args: [&OsStr; 6] = [
        OsStr::new("-NoProfile"),
        OsStr::new("-NonInteractive"),
        OsStr::new("-ExecutionPolicy"),
        OsStr::new("Bypass"),
        OsStr::new("-File"),
        file.path().as_os_str(),
    ];
    let outcome = run_capture("powershell.exe", args).await?;
    if outcome.success() {
        Ok(())
    } else {
        Err(WauError::CommandFailure {
            command: "powershell.exe -File <toast>".into(),
            status: outcome.status.unwrap_or(-1),
            output: outcome.output.trim().to_string(),
        })
    }
}

fn icon_for(paths: &AgentPaths, severity: Severity) -> Option<PathBuf> {
    let icon = paths
        .root()
        .join("icons")
        .join(format!("{}.png", severity.as_str()));
    icon.is_file().then_some(icon)
}

/// PowerShell script raising the toast through the WinRT notification API.
pub fn toast_script(event: &NotificationEvent, icon: Option<&Path>) -> String {
    let image = icon
        .map(|path| {
            format!(
                "<image placement=\"appLogoOverride\" src=\"{}\"/>",
                xml_escape(&path.display().to_string())
            )
        })
        .unwrap_or_default();
    let duration = if event.severity == Severity::Error {
        " duration=\"long\""
    } else {
        ""
    };
    let toast_xml = format!(
        "<toast{duration}><visual><binding template=\"ToastGeneric\">{image}<text>{}</text><text>{}</text></binding></visual></toast>",
        xml_escape(&event.title),
        xml_escape(&event.message)
    );

    format!(
        "[Windows.UI.Notifications.ToastNotificationManager, Windows.UI.Notifications, ContentType = WindowsRuntime] | Out-Null\n\
         [Windows.Data.Xml.Dom.XmlDocument, Windows.Data.Xml.Dom.XmlDocument, ContentType = WindowsRuntime] | Out-Null\n\
         $xml = New-Object Windows.Data.Xml.Dom.XmlDocument\n\
         $xml.LoadXml('{}')\n\
         $toast = [Windows.UI.Notifications.ToastNotification]::new($xml)\n\
         $toast.Tag = '{}'\n\
         $toast.Group = '{}'\n\
         [Windows.UI.Notifications.ToastNotificationManager]::CreateToastNotifier('{}').Show($toast)\n",
        ps_quote(&toast_xml),
        ps_quote(&toast_tag(&event.tag)),
        TOAST_GROUP,
        TOAST_APP_ID
    )
}

/// Windows caps toast tags at 64 characters.
fn toast_tag(tag: &str) -> String {
    tag.chars().take(64).collect()
}

fn ps_quote(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

#[cfg(test)]
pub mod testing {
    use std::sync::Mutex;

    use super::{NotificationEvent, NotificationSink};

    /// Sink that records every event it receives.
    #[derive(Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<NotificationEvent>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<NotificationEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl NotificationSink for RecordingSink {
        async fn notify(&self, event: NotificationEvent) {
            self.events.lock().unwrap().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn success_only_level_passes_success_alone() {
        assert!(permits(NotificationLevel::SuccessOnly, Severity::Success));
        assert!(!permits(NotificationLevel::SuccessOnly, Severity::Error));
        assert!(!permits(NotificationLevel::None, Severity::Success));
        assert!(permits(NotificationLevel::Full, Severity::Warning));
    }

    #[test]
    fn interactive_user_gets_direct_delivery() {
        assert_eq!(Delivery::for_user("alice"), Delivery::Direct);
    }

    #[cfg(windows)]
    #[test]
    fn system_account_is_queued() {
        assert_eq!(Delivery::for_user("SYSTEM"), Delivery::QueuedViaHelper);
        assert_eq!(Delivery::for_user("WORKSTATION$"), Delivery::QueuedViaHelper);
    }

    #[test]
    fn script_escapes_text_and_sets_tag() {
        let event = NotificationEvent::new(
            "Tom's <App>",
            "1.0 & more",
            Severity::Error,
            "Vendor.App",
        );
        let script = toast_script(&event, None);
        assert!(script.contains("Tom&apos;s &lt;App&gt;"));
        assert!(script.contains("1.0 &amp; more"));
        assert!(script.contains("$toast.Tag = 'Vendor.App'"));
        assert!(script.contains("duration=\"long\""));
        assert!(script.contains(TOAST_APP_ID));
    }

    #[test]
    fn queued_payload_is_consumed_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notif.json");
        let event = NotificationEvent::new("t", "m", Severity::Info, "tag");

        queue_payload(&path, &event).unwrap();
        assert_eq!(take_payload(&path).unwrap(), Some(event));
        assert_eq!(take_payload(&path).unwrap(), None);
    }
}
