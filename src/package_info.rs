/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::package_info
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Shared structures describing outdated packages reported
    by winget and the outcome of external commands.

  Security / Safety Notes:
    Pure data containers; no I/O performed in this module.

  Dependencies:
    serde for the `list` command's JSON output.

  Operational Scope:
    Used by the lister, the upgrade driver and the runner to
    pass package identity and command results between stages.

  Revision History:
    2026-09-14 COD  Introduced UpdateRecord and CommandOutcome.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Clear data contracts between modules
    - Explicit success classification for subprocesses
============================================================*/

use serde::Serialize;

/// Version string winget reports when it cannot determine the installed version.
pub const UNKNOWN_VERSION: &str = "unknown";

/// One row of `winget upgrade` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateRecord {
    pub name: String,
    pub id: String,
    pub current_version: String,
    pub available_version: String,
}

impl UpdateRecord {
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        current_version: impl Into<String>,
        available_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            current_version: current_version.into(),
            available_version: available_version.into(),
        }
    }

    /// True when the installed version could not be determined.
    pub fn has_unknown_version(&self) -> bool {
        self.current_version.eq_ignore_ascii_case(UNKNOWN_VERSION)
    }
}

/// Exit status and captured text of an external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    /// `None` when the process was terminated without an exit code.
    pub status: Option<i32>,
    pub output: String,
}

impl CommandOutcome {
    pub fn new(status: Option<i32>, output: impl Into<String>) -> Self {
        Self {
            status,
            output: output.into(),
        }
    }

    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Exit status rendered for log lines.
    pub fn status_label(&self) -> String {
        match self.status {
            Some(code) => code.to_string(),
            None => "terminated".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_version_is_case_insensitive() {
        assert!(UpdateRecord::new("App", "Vendor.App", "Unknown", "2.0").has_unknown_version());
        assert!(UpdateRecord::new("App", "Vendor.App", "unknown", "2.0").has_unknown_version());
        assert!(!UpdateRecord::new("App", "Vendor.App", "1.0", "2.0").has_unknown_version());
    }

    #[test]
    fn outcome_success_requires_zero_status() {
        assert!(CommandOutcome::new(Some(0), "").success());
        assert!(!CommandOutcome::new(Some(-1978335189), "").success());
        assert!(!CommandOutcome::new(None, "").success());
        assert_eq!(CommandOutcome::new(None, "").status_label(), "terminated");
    }
}
