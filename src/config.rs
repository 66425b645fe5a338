/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::config
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load and persist the agent configuration and the recorded
    agent version that drives self-update decisions.

  Security / Safety Notes:
    Configuration lives in the install root, writable by
    administrators only. Unknown keys are rejected so typos
    surface instead of silently reverting to defaults.

  Dependencies:
    serde and toml for (de)serialisation.

  Operational Scope:
    Read once at startup by every subcommand; rewritten only
    by the installer and the self-updater (about record).

  Revision History:
    2026-09-14 COD  Authored configuration layer.
    2026-09-30 COD  Added schedule and logging tables.
    2026-10-17 COD  Release source defaults to the Syn-Wau
                    repository.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Every field defaulted; an absent file is a valid config
    - Explicit error paths for unreadable or malformed files
============================================================*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WauError};
use crate::paths::AgentPaths;

/// Which list file governs package eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListMode {
    /// Only ids present in the list are upgraded.
    Allow,
    /// Every id except those in the list is upgraded.
    #[default]
    Deny,
}

impl fmt::Display for ListMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListMode::Allow => f.write_str("allow"),
            ListMode::Deny => f.write_str("deny"),
        }
    }
}

/// Which notifications reach the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationLevel {
    #[default]
    Full,
    SuccessOnly,
    None,
}

impl FromStr for NotificationLevel {
    type Err = WauError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "full" => Ok(NotificationLevel::Full),
            "success-only" | "successonly" => Ok(NotificationLevel::SuccessOnly),
            "none" => Ok(NotificationLevel::None),
            other => Err(WauError::Config(format!(
                "Unknown notification level `{other}`"
            ))),
        }
    }
}

/// Connectivity probe settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetworkConfig {
    pub url: String,
    pub interval_secs: u64,
    pub warn_after_secs: u64,
    pub timeout_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: "https://www.msftconnecttest.com/connecttest.txt".into(),
            interval_secs: 10,
            warn_after_secs: 300,
            timeout_secs: 1800,
        }
    }
}

/// Calendar cadence of the main scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleInterval {
    #[default]
    Daily,
    Weekly,
    Never,
}

/// Scheduled task triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub interval: ScheduleInterval,
    /// Local start time, `HH:MM`.
    pub time: String,
    pub on_logon: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: ScheduleInterval::Daily,
            time: "06:00".into(),
            on_logon: true,
        }
    }
}

/// Update log rotation limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    pub max_size_bytes: u64,
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: 1024 * 1024,
            max_files: 3,
        }
    }
}

/// Archive attached to every Syn-Wau release.
pub const DEFAULT_RELEASE_ASSET: &str = "Syn-Wau.zip";

/// `owner/name` of the repository this agent is published from.
fn default_release_repo() -> String {
    let url = env!("CARGO_PKG_REPOSITORY");
    url.strip_prefix("https://github.com/")
        .unwrap_or(url)
        .trim_end_matches('/')
        .to_string()
}

/// Persisted agent configuration (`config.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WauConfig {
    pub auto_update_enabled: bool,
    pub allow_prerelease: bool,
    pub list_mode: ListMode,
    pub notification_level: NotificationLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winget_path: Option<PathBuf>,
    pub winget_source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mods_path: Option<PathBuf>,
    pub release_repo: String,
    pub release_asset: String,
    pub network: NetworkConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

impl Default for WauConfig {
    fn default() -> Self {
        Self {
            auto_update_enabled: true,
            allow_prerelease: false,
            list_mode: ListMode::Deny,
            notification_level: NotificationLevel::Full,
            locale: None,
            winget_path: None,
            winget_source: "winget".into(),
            list_path: None,
            mods_path: None,
            release_repo: default_release_repo(),
            release_asset: DEFAULT_RELEASE_ASSET.into(),
            network: NetworkConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WauConfig {
    /// Load from `path` when given, falling back to defaults if it does not exist.
    pub fn load_from_optional_path(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            WauError::Config(format!("Failed to read config {}: {err}", path.display()))
        })?;
        toml::from_str(&content).map_err(|err| {
            WauError::Config(format!("Failed to parse config {}: {err}", path.display()))
        })
    }

    /// List file for the configured mode, honouring `list_path`.
    pub fn list_file(&self, paths: &AgentPaths) -> PathBuf {
        match (&self.list_path, self.list_mode) {
            (Some(path), _) => path.clone(),
            (None, ListMode::Allow) => paths.allow_list(),
            (None, ListMode::Deny) => paths.deny_list(),
        }
    }

    pub fn mods_dir(&self, paths: &AgentPaths) -> PathBuf {
        self.mods_path.clone().unwrap_or_else(|| paths.mods_dir())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|err| WauError::Serialization(format!("Failed to encode config: {err}")))?;
        write_file(path, &content)
    }
}

/// Persisted agent version (`about.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AboutRecord {
    pub version: String,
}

impl AboutRecord {
    /// Record for the version compiled into this binary.
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Load the record, falling back to the compiled version when absent.
    pub fn load_or_current(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::current());
        }
        let content = std::fs::read_to_string(path).map_err(|err| {
            WauError::Config(format!("Failed to read {}: {err}", path.display()))
        })?;
        toml::from_str(&content).map_err(|err| {
            WauError::Config(format!("Failed to parse {}: {err}", path.display()))
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string(self)
            .map_err(|err| WauError::Serialization(format!("Failed to encode about: {err}")))?;
        write_file(path, &content)
    }
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| {
            WauError::Filesystem(format!(
                "Failed to create directory {}: {err}",
                parent.display()
            ))
        })?;
    }
    std::fs::write(path, content).map_err(|err| {
        WauError::Filesystem(format!("Failed to write {}: {err}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let config =
            WauConfig::load_from_optional_path(Some(&dir.path().join("config.toml"))).unwrap();
        assert_eq!(config, WauConfig::default());
        assert!(config.auto_update_enabled);
        assert_eq!(config.list_mode, ListMode::Deny);
        assert_eq!(config.network.timeout_secs, 1800);
    }

    #[test]
    fn default_release_source_is_this_agent() {
        let config = WauConfig::default();
        assert_eq!(config.release_repo, "Synavera-Discorporated/Syn-Wau");
        assert_eq!(config.release_asset, "Syn-Wau.zip");
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "allow_prerelease = true\nlist_mode = \"allow\"\nnotification_level = \"success-only\"\n\n[network]\ntimeout_secs = 60\n",
        )
        .unwrap();

        let config = WauConfig::load(&path).unwrap();
        assert!(config.allow_prerelease);
        assert!(config.auto_update_enabled);
        assert_eq!(config.list_mode, ListMode::Allow);
        assert_eq!(config.notification_level, NotificationLevel::SuccessOnly);
        assert_eq!(config.network.timeout_secs, 60);
        assert_eq!(config.network.interval_secs, 10);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "auto_updat_enabled = false\n").unwrap();

        let err = WauConfig::load(&path).unwrap_err();
        assert!(matches!(err, WauError::Config(_)));
    }

    #[test]
    fn saved_config_loads_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = WauConfig {
            list_mode: ListMode::Allow,
            locale: Some("fr".into()),
            ..WauConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(WauConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn about_record_falls_back_to_compiled_version() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("about.toml");
        assert_eq!(
            AboutRecord::load_or_current(&path).unwrap().version,
            env!("CARGO_PKG_VERSION")
        );

        AboutRecord {
            version: "3.2.1".into(),
        }
        .save(&path)
        .unwrap();
        assert_eq!(AboutRecord::load_or_current(&path).unwrap().version, "3.2.1");
    }

    #[test]
    fn list_file_follows_mode_unless_overridden() {
        let paths = AgentPaths::new("/opt/wau");
        let mut config = WauConfig::default();
        assert_eq!(config.list_file(&paths), paths.deny_list());

        config.list_mode = ListMode::Allow;
        assert_eq!(config.list_file(&paths), paths.allow_list());

        config.list_path = Some(PathBuf::from("/srv/share/apps.txt"));
        assert_eq!(config.list_file(&paths), PathBuf::from("/srv/share/apps.txt"));
    }

    #[test]
    fn notification_level_parses_cli_spellings() {
        assert_eq!(
            "SuccessOnly".parse::<NotificationLevel>().unwrap(),
            NotificationLevel::SuccessOnly
        );
        assert!("loud".parse::<NotificationLevel>().is_err());
    }
}
