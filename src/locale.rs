/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::locale
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Select the notification text set matching the host locale
    and render templates for each notification kind.

  Security / Safety Notes:
    Template files are read from the install root only.
    Rendered text is escaped later by the notifier.

  Dependencies:
    serde and toml for template files; tokio::process (via
    the process module) to query the Windows UI culture.

  Operational Scope:
    Loaded once at startup and shared by the prober, the
    self-updater and the upgrade driver.

  Revision History:
    2026-09-14 COD  Authored locale loader.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic fallback chain ending in embedded English
    - Positional template contract documented per kind
============================================================*/

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, WauError};
use crate::process::run_capture;

/// Locale used when nothing better is available.
pub const DEFAULT_LOCALE: &str = "en";

/// Template sets compiled into the binary.
pub const EMBEDDED_LOCALES: &[(&str, &str)] = &[
    ("en", include_str!("../locale/en.toml")),
    ("fr", include_str!("../locale/fr.toml")),
];

/// Notification kinds, in the positional order of template files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    UpdateStarting = 0,
    UpdateSucceeded = 1,
    UpdateFailed = 2,
    SelfUpdateStarting = 3,
    SelfUpdateSucceeded = 4,
    SelfUpdateFailed = 5,
    ConnectionWaiting = 6,
    ConnectionTimeout = 7,
    WingetMissing = 8,
}

impl MessageKind {
    fn index(self) -> usize {
        self as usize
    }
}

/// One `{title, message}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageTemplate {
    pub title: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
struct TemplateFile {
    #[serde(rename = "message", default)]
    messages: Vec<MessageTemplate>,
}

/// Placeholder values substituted into templates.
#[derive(Debug, Default, Clone)]
pub struct TemplateArgs {
    pairs: Vec<(&'static str, String)>,
}

impl TemplateArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.pairs.push((key, value.into()));
        self
    }

    fn apply(&self, template: &str) -> String {
        let mut rendered = template.to_string();
        for (key, value) in &self.pairs {
            rendered = rendered.replace(&format!("{{{key}}}"), value);
        }
        rendered
    }
}

/// The active template set plus the English fallback.
#[derive(Debug, Clone)]
pub struct Locale {
    tag: String,
    messages: Vec<MessageTemplate>,
    fallback: Vec<MessageTemplate>,
}

impl Locale {
    /// The embedded English set.
    pub fn english() -> Self {
        let messages = embedded(DEFAULT_LOCALE).unwrap_or_default();
        Self {
            tag: DEFAULT_LOCALE.to_string(),
            fallback: messages.clone(),
            messages,
        }
    }

    /// Load the set for `tag` from `dir`, then from the embedded sets,
    /// trying the full tag (`fr-FR`) before its language (`fr`).
    pub fn load(dir: &Path, tag: &str) -> Result<Self> {
        let fallback = embedded(DEFAULT_LOCALE).unwrap_or_default();
        for candidate in candidates(tag) {
            let path = dir.join(format!("{candidate}.toml"));
            if path.is_file() {
                let text = std::fs::read_to_string(&path).map_err(|err| {
                    WauError::Config(format!("Failed to read locale {}: {err}", path.display()))
                })?;
                return Ok(Self {
                    tag: candidate,
                    messages: parse_templates(&text)?,
                    fallback,
                });
            }
            if let Some(messages) = embedded(&candidate) {
                return Ok(Self {
                    tag: candidate,
                    messages,
                    fallback,
                });
            }
        }
        Ok(Self::english())
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Render the `(title, message)` pair for `kind`.
    pub fn render(&self, kind: MessageKind, args: &TemplateArgs) -> (String, String) {
        let template = self
            .messages
            .get(kind.index())
            .or_else(|| self.fallback.get(kind.index()));
        match template {
            Some(template) => (args.apply(&template.title), args.apply(&template.message)),
            None => ("Winget-AutoUpdate".to_string(), format!("{kind:?}")),
        }
    }
}

/// Resolve the locale tag: configured value, `WAU_LOCALE`, Windows UI culture, English.
pub async fn detect_locale_tag(configured: Option<&str>) -> String {
    if let Some(tag) = configured.map(str::trim).filter(|tag| !tag.is_empty()) {
        return tag.to_string();
    }
    if let Ok(tag) = std::env::var("WAU_LOCALE") {
        if !tag.trim().is_empty() {
            return tag.trim().to_string();
        }
    }
    if cfg!(windows) {
        if let Ok(outcome) = run_capture(
            "powershell.exe",
            ["-NoProfile", "-NonInteractive", "-Command", "(Get-UICulture).Name"],
        )
        .await
        {
            let tag = outcome.output.trim();
            if outcome.success() && !tag.is_empty() {
                return tag.to_string();
            }
        }
    }
    DEFAULT_LOCALE.to_string()
}

fn candidates(tag: &str) -> Vec<String> {
    let tag = tag.trim();
    let mut list = vec![tag.to_string()];
    if let Some((language, _)) = tag.split_once(['-', '_']) {
        list.push(language.to_string());
    }
    list.retain(|candidate| !candidate.is_empty());
    list
}

fn embedded(tag: &str) -> Option<Vec<MessageTemplate>> {
    EMBEDDED_LOCALES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(tag))
        .and_then(|(_, text)| parse_templates(text).ok())
}

fn parse_templates(text: &str) -> Result<Vec<MessageTemplate>> {
    toml::from_str::<TemplateFile>(text)
        .map(|file| file.messages)
        .map_err(|err| WauError::Config(format!("Invalid locale template: {err}")))
}
