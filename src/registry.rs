/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::registry
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Maintain the registry entries Syn-Wau depends on: the toast
    source, its per-user ranking and the Programs & Features
    uninstall entry.

  Security / Safety Notes:
    HKLM writes require an elevated installer; failures are
    reported, never retried.

  Dependencies:
    winreg (Windows targets only).

  Operational Scope:
    Used by the installer and uninstaller. Other platforms get
    `Unsupported`.

  Revision History:
    2026-09-25 COD  Authored registry housekeeping.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Platform specifics behind one module boundary
    - Removal tolerant of entries already gone
============================================================*/

use crate::error::Result;
use crate::notify::TOAST_APP_ID;
use crate::paths::AgentPaths;

const TOAST_SOURCE_KEY: &str = r"SOFTWARE\Classes\AppUserModelId";
const TOAST_SETTINGS_KEY: &str =
    r"Software\Microsoft\Windows\CurrentVersion\Notifications\Settings";
const UNINSTALL_KEY: &str =
    r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\Winget-AutoUpdate";

/// Display name of the toast source and the uninstall entry.
pub const DISPLAY_NAME: &str = "Winget-AutoUpdate";

/// Values written below the uninstall key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UninstallEntry {
    pub display_name: String,
    pub display_version: String,
    pub publisher: String,
    pub install_location: String,
    pub uninstall_string: String,
    pub display_icon: String,
}

impl UninstallEntry {
    pub fn new(paths: &AgentPaths, version: &str) -> Self {
        let executable = paths.executable().display().to_string();
        Self {
            display_name: DISPLAY_NAME.to_string(),
            display_version: version.to_string(),
            publisher: "Synavera".to_string(),
            install_location: paths.root().display().to_string(),
            uninstall_string: format!("\"{executable}\" uninstall"),
            display_icon: executable,
        }
    }
}

/// Register the toast source shown as the notification sender.
pub fn register_toast_source(paths: &AgentPaths) -> Result<()> {
    imp::register_toast_source(&format!(r"{TOAST_SOURCE_KEY}\{TOAST_APP_ID}"), paths)
}

/// Rank the toast source first and keep its toasts in the action center
/// for the installing user.
pub fn register_toast_settings() -> Result<()> {
    imp::register_toast_settings(&format!(r"{TOAST_SETTINGS_KEY}\{TOAST_APP_ID}"))
}

pub fn register_uninstall_entry(entry: &UninstallEntry) -> Result<()> {
    imp::register_uninstall_entry(UNINSTALL_KEY, entry)
}

/// Remove every key written by the installer. Missing keys are not errors.
pub fn remove_all() -> Result<()> {
    imp::remove_all(&[
        (true, format!(r"{TOAST_SOURCE_KEY}\{TOAST_APP_ID}")),
        (false, format!(r"{TOAST_SETTINGS_KEY}\{TOAST_APP_ID}")),
        (true, UNINSTALL_KEY.to_string()),
    ])
}

#[cfg(windows)]
mod imp {
    use std::io;

    use winreg::enums::{HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE};
    use winreg::RegKey;

    use super::{UninstallEntry, DISPLAY_NAME};
    use crate::error::{Result, WauError};
    use crate::paths::AgentPaths;

    fn create(root: &RegKey, path: &str) -> Result<RegKey> {
        root.create_subkey(path)
            .map(|(key, _)| key)
            .map_err(|err| WauError::Runtime(format!("Failed to create registry key {path}: {err}")))
    }

    fn write_err(path: &str, err: io::Error) -> WauError {
        WauError::Runtime(format!("Failed to write registry key {path}: {err}"))
    }

    pub fn register_toast_source(path: &str, paths: &AgentPaths) -> Result<()> {
        let key = create(&RegKey::predef(HKEY_LOCAL_MACHINE), path)?;
        key.set_value("DisplayName", &DISPLAY_NAME)
            .map_err(|err| write_err(path, err))?;
        let icon = paths.icon_file();
        if icon.is_file() {
            key.set_value("IconUri", &icon.display().to_string())
                .map_err(|err| write_err(path, err))?;
        }
        Ok(())
    }

    pub fn register_toast_settings(path: &str) -> Result<()> {
        let key = create(&RegKey::predef(HKEY_CURRENT_USER), path)?;
        key.set_value("Rank", &99u32)
            .map_err(|err| write_err(path, err))?;
        key.set_value("ShowInActionCenter", &1u32)
            .map_err(|err| write_err(path, err))
    }

    pub fn register_uninstall_entry(path: &str, entry: &UninstallEntry) -> Result<()> {
        let key = create(&RegKey::predef(HKEY_LOCAL_MACHINE), path)?;
        let strings = [
            ("DisplayName", &entry.display_name),
            ("DisplayVersion", &entry.display_version),
            ("Publisher", &entry.publisher),
            ("InstallLocation", &entry.install_location),
            ("UninstallString", &entry.uninstall_string),
            ("DisplayIcon", &entry.display_icon),
        ];
        for (name, value) in strings {
            key.set_value(name, value)
                .map_err(|err| write_err(path, err))?;
        }
        key.set_value("NoModify", &1u32)
            .map_err(|err| write_err(path, err))?;
        key.set_value("NoRepair", &1u32)
            .map_err(|err| write_err(path, err))
    }

    pub fn remove_all(keys: &[(bool, String)]) -> Result<()> {
        for (machine, path) in keys {
            let root = if *machine {
                RegKey::predef(HKEY_LOCAL_MACHINE)
            } else {
                RegKey::predef(HKEY_CURRENT_USER)
            };
            match root.delete_subkey_all(path) {
                Ok(()) => {}
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(WauError::Runtime(format!(
                        "Failed to delete registry key {path}: {err}"
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(not(windows))]
mod imp {
    use super::UninstallEntry;
    use crate::error::{Result, WauError};
    use crate::paths::AgentPaths;

    fn unsupported() -> WauError {
        WauError::Unsupported("the Windows registry".into())
    }

    pub fn register_toast_source(_path: &str, _paths: &AgentPaths) -> Result<()> {
        Err(unsupported())
    }

    pub fn register_toast_settings(_path: &str) -> Result<()> {
        Err(unsupported())
    }

    pub fn register_uninstall_entry(_path: &str, _entry: &UninstallEntry) -> Result<()> {
        Err(unsupported())
    }

    pub fn remove_all(_keys: &[(bool, String)]) -> Result<()> {
        Err(unsupported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninstall_entry_points_back_at_the_agent() {
        let paths = AgentPaths::new("C:/ProgramData/Winget-AutoUpdate");
        let entry = UninstallEntry::new(&paths, "2.1.0");

        assert_eq!(entry.display_name, DISPLAY_NAME);
        assert_eq!(entry.display_version, "2.1.0");
        assert!(entry.uninstall_string.starts_with('"'));
        assert!(entry.uninstall_string.ends_with("\" uninstall"));
        assert!(entry.uninstall_string.contains("wau.exe"));
    }

    #[cfg(not(windows))]
    #[test]
    fn registry_is_unsupported_off_windows() {
        assert!(matches!(
            register_toast_settings(),
            Err(crate::error::WauError::Unsupported(_))
        ));
        assert!(remove_all().is_err());
    }
}
