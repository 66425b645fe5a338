/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::installer
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Lay down an install root (binary, locales, config, version
    record, list file), register the toast source and scheduled
    tasks, and undo all of it on uninstall.

  Security / Safety Notes:
    Must run elevated: writes below %ProgramData%, HKLM and the
    task scheduler. Existing operator lists are never replaced.

  Dependencies:
    crate modules only (scheduler, registry, winget, config).

  Operational Scope:
    `wau install` and `wau uninstall`.

  Revision History:
    2026-09-26 COD  Authored installer and uninstaller.
    2026-10-17 COD  Install log opened after the prerequisite
                    check; reinstalls keep the existing config.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Prerequisites verified before anything is written
    - Deterministic exit code for missing prerequisites
============================================================*/

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{AboutRecord, ListMode, WauConfig};
use crate::error::{Result, WauError};
use crate::locale::EMBEDDED_LOCALES;
use crate::logger::Logger;
use crate::paths::AgentPaths;
use crate::registry::{self, UninstallEntry};
use crate::scheduler::{
    main_task_xml, notify_task_xml, TaskScheduler, MAIN_TASK_NAME, NOTIFY_TASK_NAME,
};
use crate::winget::Winget;

/// What `wau install` should lay down.
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    pub config: WauConfig,
    /// List file to copy into the install root instead of seeding one.
    pub list_file: Option<PathBuf>,
    /// Start the update task right after registration.
    pub run_now: bool,
}

/// Configuration a (re)install starts from: `explicit` when given, otherwise
/// the `config.toml` already in the install root, otherwise defaults.
pub fn install_config(paths: &AgentPaths, explicit: Option<&Path>) -> Result<WauConfig> {
    match explicit {
        Some(path) => WauConfig::load_from_optional_path(Some(path)),
        None => WauConfig::load_from_optional_path(Some(&paths.config_file())),
    }
}

/// Locate winget for `config`. A miss is a retryable prerequisite failure.
pub fn check_prerequisites(config: &WauConfig) -> Result<Winget> {
    Winget::locate(config.winget_path.as_deref(), &config.winget_source)
        .map_err(|err| WauError::PrerequisiteMissing(format!("winget: {err}")))
}

/// Check prerequisites, then open the install log (`log_path` or the default
/// under the install root) and lay the agent down. Nothing is created on disk
/// when a prerequisite is missing. Returns the install log path.
pub async fn install(
    paths: &AgentPaths,
    options: &InstallOptions,
    log_path: Option<PathBuf>,
    verbose: bool,
) -> Result<PathBuf> {
    let winget = check_prerequisites(&options.config)?;
    let log_path = log_path.unwrap_or_else(|| paths.install_log_file());
    let logger = Logger::new(Some(log_path.clone()), verbose)?;
    logger.info(
        "INSTALL",
        format!("winget found at {}", winget.executable().display()),
    );
    match lay_down(paths, options, &logger).await {
        Ok(()) => Ok(log_path),
        Err(err) => {
            logger.error("INSTALL", err.to_string());
            Err(err)
        }
    }
}

async fn lay_down(paths: &AgentPaths, options: &InstallOptions, logger: &Logger) -> Result<()> {
    let config = &options.config;
    create_dir(paths.root())?;
    create_dir(&paths.log_dir())?;
    create_dir(&paths.mods_dir())?;

    copy_executable(paths, logger)?;
    let locales = write_locales(paths)?;
    logger.info("INSTALL", format!("Wrote {locales} locale files"));

    config.save(&paths.config_file())?;
    let about = AboutRecord::current();
    about.save(&paths.about_file())?;
    place_list(paths, config, options.list_file.as_deref(), logger)?;

    registry::register_toast_source(paths)?;
    registry::register_toast_settings()?;
    registry::register_uninstall_entry(&UninstallEntry::new(paths, &about.version))?;
    logger.info("INSTALL", "Registry entries written");

    let scheduler = TaskScheduler::new();
    let executable = paths.executable();
    scheduler
        .register(MAIN_TASK_NAME, &main_task_xml(&executable, &config.schedule)?)
        .await?;
    scheduler
        .register(NOTIFY_TASK_NAME, &notify_task_xml(&executable))
        .await?;
    logger.info(
        "INSTALL",
        format!("Registered tasks {MAIN_TASK_NAME} and {NOTIFY_TASK_NAME}"),
    );

    if options.run_now {
        scheduler.run(MAIN_TASK_NAME).await?;
        logger.info("INSTALL", "Update run started");
    }

    logger.info(
        "INSTALL",
        format!("Installed {} into {}", about.version, paths.root().display()),
    );
    Ok(())
}

/// Remove tasks, registry entries and the install root. With `keep_logs`
/// the `logs` directory survives.
pub async fn uninstall(paths: &AgentPaths, keep_logs: bool, logger: &Logger) -> Result<()> {
    let scheduler = TaskScheduler::new();
    for name in [MAIN_TASK_NAME, NOTIFY_TASK_NAME] {
        if scheduler.delete(name).await? {
            logger.info("UNINSTALL", format!("Deleted task {name}"));
        }
    }

    registry::remove_all()?;
    logger.info("UNINSTALL", "Registry entries removed");

    let removed = remove_install_root(paths, keep_logs)?;
    logger.info(
        "UNINSTALL",
        format!("Removed {removed} entries from {}", paths.root().display()),
    );
    Ok(())
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|err| {
        WauError::Filesystem(format!("Failed to create {}: {err}", path.display()))
    })
}

fn copy_executable(paths: &AgentPaths, logger: &Logger) -> Result<()> {
    let current = std::env::current_exe()?;
    let target = paths.executable();
    if current == target {
        logger.debug("INSTALL", "Running from the install root; binary not copied");
        return Ok(());
    }
    fs::copy(&current, &target).map_err(|err| {
        WauError::Filesystem(format!("Failed to copy binary to {}: {err}", target.display()))
    })?;
    Ok(())
}

/// Write the compiled-in template sets unless the operator already
/// customised them.
pub fn write_locales(paths: &AgentPaths) -> Result<usize> {
    let dir = paths.locale_dir();
    create_dir(&dir)?;
    let mut written = 0;
    for (tag, text) in EMBEDDED_LOCALES {
        let path = dir.join(format!("{tag}.toml"));
        if path.exists() {
            continue;
        }
        fs::write(&path, text).map_err(|err| {
            WauError::Filesystem(format!("Failed to write {}: {err}", path.display()))
        })?;
        written += 1;
    }
    Ok(written)
}

/// Copy `source` into place, or seed an empty list when none exists yet.
pub fn place_list(
    paths: &AgentPaths,
    config: &WauConfig,
    source: Option<&Path>,
    logger: &Logger,
) -> Result<()> {
    let target = config.list_file(paths);
    if let Some(source) = source {
        fs::copy(source, &target).map_err(|err| {
            WauError::Filesystem(format!(
                "Failed to copy {} to {}: {err}",
                source.display(),
                target.display()
            ))
        })?;
        logger.info("INSTALL", format!("List copied to {}", target.display()));
        return Ok(());
    }
    if target.exists() {
        return Ok(());
    }

    let seed = match config.list_mode {
        ListMode::Allow => {
            "# Package ids to update, one per line. Everything else is skipped.\n"
        }
        ListMode::Deny => {
            "# Package ids never to update, one per line. A trailing * matches a prefix.\n"
        }
    };
    fs::write(&target, seed).map_err(|err| {
        WauError::Filesystem(format!("Failed to write {}: {err}", target.display()))
    })?;
    logger.info("INSTALL", format!("Seeded {}", target.display()));
    Ok(())
}

/// Delete the install root contents. Returns the number of entries removed.
/// The running binary cannot be deleted on Windows and is left in place along
/// with the root that holds it.
pub fn remove_install_root(paths: &AgentPaths, keep_logs: bool) -> Result<usize> {
    let root = paths.root();
    if !root.exists() {
        return Ok(0);
    }
    let log_dir = paths.log_dir();
    let running = std::env::current_exe().ok();
    let mut removed = 0;
    for entry in fs::read_dir(root)? {
        let path = entry?.path();
        if (keep_logs && path == log_dir) || running.as_ref() == Some(&path) {
            continue;
        }
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        result.map_err(|err| {
            WauError::Filesystem(format!("Failed to remove {}: {err}", path.display()))
        })?;
        removed += 1;
    }
    if fs::read_dir(root)?.next().is_none() {
        fs::remove_dir(root).map_err(|err| {
            WauError::Filesystem(format!("Failed to remove {}: {err}", root.display()))
        })?;
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::Policy;
    use tempfile::TempDir;

    #[tokio::test]
    async fn missing_winget_is_a_retryable_prerequisite_failure() {
        let dir = TempDir::new().unwrap();
        let options = InstallOptions {
            config: WauConfig {
                winget_path: Some(dir.path().join("missing").join("winget.exe")),
                ..WauConfig::default()
            },
            ..InstallOptions::default()
        };
        let paths = AgentPaths::new(dir.path().join("wau"));

        let err = install(&paths, &options, None, false).await.unwrap_err();

        assert!(matches!(err, WauError::PrerequisiteMissing(_)));
        assert_eq!(err.exit_code(), crate::error::EXIT_RETRY);
        assert!(!paths.install_log_file().exists());
        assert!(!paths.root().exists());
    }

    #[test]
    fn reinstall_starts_from_the_installed_config() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path());
        fs::write(
            paths.config_file(),
            "list_mode = \"allow\"\nwinget_source = \"msstore\"\n",
        )
        .unwrap();

        let config = install_config(&paths, None).unwrap();
        assert_eq!(config.list_mode, ListMode::Allow);
        assert_eq!(config.winget_source, "msstore");

        let explicit = dir.path().join("other.toml");
        fs::write(&explicit, "auto_update_enabled = false\n").unwrap();
        let config = install_config(&paths, Some(&explicit)).unwrap();
        assert_eq!(config.list_mode, ListMode::Deny);
        assert!(!config.auto_update_enabled);
    }

    #[test]
    fn first_install_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path().join("wau"));
        assert_eq!(install_config(&paths, None).unwrap(), WauConfig::default());
    }

    #[test]
    fn embedded_locales_do_not_clobber_custom_ones() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path());
        fs::create_dir_all(paths.locale_dir()).unwrap();
        fs::write(paths.locale_dir().join("fr.toml"), "custom").unwrap();

        assert_eq!(write_locales(&paths).unwrap(), EMBEDDED_LOCALES.len() - 1);
        assert_eq!(
            fs::read_to_string(paths.locale_dir().join("fr.toml")).unwrap(),
            "custom"
        );
    }

    #[test]
    fn seeded_list_is_empty_policy_and_existing_list_is_kept() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path());
        let config = WauConfig::default();
        let logger = Logger::console(false);

        place_list(&paths, &config, None, &logger).unwrap();
        let policy = Policy::load(ListMode::Deny, &paths.deny_list()).unwrap();
        assert!(policy.is_empty());

        fs::write(paths.deny_list(), "Vendor.Tool\n").unwrap();
        place_list(&paths, &config, None, &logger).unwrap();
        assert_eq!(fs::read_to_string(paths.deny_list()).unwrap(), "Vendor.Tool\n");
    }

    #[test]
    fn provided_list_replaces_seed() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("apps.txt");
        fs::write(&source, "Vendor.Only\n").unwrap();
        let paths = AgentPaths::new(dir.path().join("wau"));
        fs::create_dir_all(paths.root()).unwrap();
        let config = WauConfig {
            list_mode: ListMode::Allow,
            ..WauConfig::default()
        };

        place_list(&paths, &config, Some(&source), &Logger::console(false)).unwrap();
        assert_eq!(fs::read_to_string(paths.allow_list()).unwrap(), "Vendor.Only\n");
    }

    #[test]
    fn uninstall_can_keep_logs() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path().join("wau"));
        fs::create_dir_all(paths.log_dir()).unwrap();
        fs::write(paths.log_file(), "entry").unwrap();
        fs::write(paths.config_file(), "").unwrap();

        assert_eq!(remove_install_root(&paths, true).unwrap(), 1);
        assert!(paths.log_file().exists());
        assert!(!paths.config_file().exists());

        remove_install_root(&paths, false).unwrap();
        assert!(!paths.root().exists());
    }
}
