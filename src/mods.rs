/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::mods
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Run operator-supplied per-package PowerShell hooks around
    an upgrade (`<id>-preinstall.ps1`, `<id>-upgrade.ps1`,
    `<id>-installed.ps1`).

  Security / Safety Notes:
    Hooks execute with the agent's (SYSTEM) privileges; the
    mods directory must stay administrator-writable only.

  Dependencies:
    tokio::process (via process) for powershell.exe.

  Operational Scope:
    Invoked by the upgrade driver. Hook failures are logged and
    never change an upgrade's classification.

  Revision History:
    2026-09-28 COD  Added package hook support.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Absent hooks cost nothing
    - Failures contained at the hook boundary
============================================================*/

use std::ffi::OsStr;
use std::path::PathBuf;

use crate::logger::Logger;
use crate::package_info::CommandOutcome;
use crate::process::run_streaming;

/// Point in an upgrade at which a hook runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    /// Before the upgrade command.
    PreInstall,
    /// After the upgrade command, whatever its result.
    Upgrade,
    /// After the package was classified as updated.
    Installed,
}

impl HookStage {
    fn suffix(self) -> &'static str {
        match self {
            HookStage::PreInstall => "preinstall",
            HookStage::Upgrade => "upgrade",
            HookStage::Installed => "installed",
        }
    }
}

/// Hook scripts below one directory.
#[derive(Debug, Clone)]
pub struct Mods {
    dir: Option<PathBuf>,
}

impl Mods {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// No hooks at all.
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Script for `id` at `stage`, if the operator provided one.
    pub fn script(&self, id: &str, stage: HookStage) -> Option<PathBuf> {
        let path = self
            .dir
            .as_ref()?
            .join(format!("{id}-{}.ps1", stage.suffix()));
        path.is_file().then_some(path)
    }

    /// Run the hook for `id` at `stage` when present.
    pub async fn run(&self, id: &str, stage: HookStage, logger: &Logger) -> Option<CommandOutcome> {
        let script = self.script(id, stage)?;
        logger.info("MODS", format!("Running {}", script.display()));

        let args: [&OsStr; 6] = [
            OsStr::new("-NoProfile"),
            OsStr::new("-NonInteractive"),
            OsStr::new("-ExecutionPolicy"),
            OsStr::new("Bypass"),
            OsStr::new("-File"),
            script.as_os_str(),
        ];
        match run_streaming("powershell.exe", args, |line| logger.debug("MODS", line)).await {
            Ok(outcome) => {
                if !outcome.success() {
                    logger.warn(
                        "MODS",
                        format!(
                            "{} exited with status {}",
                            script.display(),
                            outcome.status_label()
                        ),
                    );
                }
                Some(outcome)
            }
            Err(err) => {
                logger.warn("MODS", format!("{} could not run: {err}", script.display()));
                None
            }
        }
    }
}
