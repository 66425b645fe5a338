/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::paths
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Describe the on-disk layout of a Syn-Wau installation so
    every component resolves files from one root.

  Security / Safety Notes:
    The default root lives under %ProgramData%, which only
    administrators may write to.

  Dependencies:
    dirs for the per-user fallback location.

  Operational Scope:
    Constructed once per invocation and carried inside the
    runner context, installer and helper.

  Revision History:
    2026-09-14 COD  Introduced installation layout.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Single source of truth for file locations
    - No process-wide mutable state
============================================================*/

use std::path::{Path, PathBuf};

use crate::error::{Result, WauError};

/// Directory name used under %ProgramData%.
pub const INSTALL_DIR_NAME: &str = "Winget-AutoUpdate";
/// File name of the agent binary inside the install root.
pub const EXECUTABLE_NAME: &str = "wau.exe";

/// Resolved locations of every file the agent reads or writes.
#[derive(Debug, Clone)]
pub struct AgentPaths {
    root: PathBuf,
}

impl AgentPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Pick the install root: explicit override, then the directory of the
    /// running binary when it holds a config file, then %ProgramData%.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(root) = explicit {
            return Ok(Self::new(root));
        }

        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            if exe_dir.join("config.toml").is_file() {
                return Ok(Self::new(exe_dir));
            }
        }

        Self::default_root().map(Self::new)
    }

    fn default_root() -> Result<PathBuf> {
        if let Some(program_data) = std::env::var_os("ProgramData") {
            return Ok(PathBuf::from(program_data).join(INSTALL_DIR_NAME));
        }
        dirs::data_local_dir()
            .map(|dir| dir.join(INSTALL_DIR_NAME))
            .ok_or_else(|| WauError::Config("Unable to determine an install root".into()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    pub fn about_file(&self) -> PathBuf {
        self.root.join("about.toml")
    }

    pub fn allow_list(&self) -> PathBuf {
        self.root.join("included_apps.txt")
    }

    pub fn deny_list(&self) -> PathBuf {
        self.root.join("excluded_apps.txt")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir().join("updates.log")
    }

    pub fn install_log_file(&self) -> PathBuf {
        self.log_dir().join("install.log")
    }

    pub fn locale_dir(&self) -> PathBuf {
        self.root.join("locale")
    }

    pub fn mods_dir(&self) -> PathBuf {
        self.root.join("mods")
    }

    pub fn icon_file(&self) -> PathBuf {
        self.root.join("icons").join("wau.png")
    }

    /// Queued toast payload consumed by the notification helper task.
    pub fn notification_payload(&self) -> PathBuf {
        self.root.join("notif.json")
    }

    pub fn executable(&self) -> PathBuf {
        self.root.join(EXECUTABLE_NAME)
    }

    /// Files owned by the operator that an overlay must never replace.
    pub fn user_data_files(&self) -> [PathBuf; 4] {
        [
            self.config_file(),
            self.about_file(),
            self.allow_list(),
            self.deny_list(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_root_wins() {
        let paths = AgentPaths::resolve(Some(Path::new("/opt/wau"))).unwrap();
        assert_eq!(paths.root(), Path::new("/opt/wau"));
        assert_eq!(paths.log_file(), Path::new("/opt/wau/logs/updates.log"));
        assert_eq!(paths.deny_list(), Path::new("/opt/wau/excluded_apps.txt"));
    }
}
