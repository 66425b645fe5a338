/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::error
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Centralise Syn-Wau error types to provide consistent
    diagnostics and exit semantics.

  Security / Safety Notes:
    Error contexts expose command names and high-level paths
    only; release URLs carry no credentials.

  Dependencies:
    thiserror for ergonomic error definitions.

  Operational Scope:
    Used across modules to propagate recoverable failures and
    consolidate exit codes for the binary entry point.

  Revision History:
    2026-09-14 COD  Established shared error definitions.
    2026-10-02 COD  Added installer retry exit code.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit error taxonomy with actionable context
    - No silent failure paths
    - Stable exit codes for operational tooling
============================================================*/

use std::io;

use thiserror::Error;

/// Result alias for Syn-Wau operations.
pub type Result<T> = std::result::Result<T, WauError>;

/// Exit code understood by deployment tooling as "retry later".
pub const EXIT_RETRY: i32 = 1618;

/// Enumerates high-level error domains surfaced by Syn-Wau.
#[derive(Debug, Error)]
pub enum WauError {
    #[error("Required tool `{tool}` could not be located")]
    ToolNotFound { tool: String },
    #[error("Command `{command}` failed with status {status}: {output}")]
    CommandFailure {
        command: String,
        status: i32,
        output: String,
    },
    #[error("No network connectivity after {seconds}s")]
    NetworkTimeout { seconds: u64 },
    #[error("Self-update: {0}")]
    SelfUpdate(String),
    #[error("Prerequisite missing: {0}")]
    PrerequisiteMissing(String),
    #[error("Configuration: {0}")]
    Config(String),
    #[error("Network: {0}")]
    Network(String),
    #[error("Serialization: {0}")]
    Serialization(String),
    #[error("Filesystem: {0}")]
    Filesystem(String),
    #[error("Runtime: {0}")]
    Runtime(String),
    #[error("Unsupported on this platform: {0}")]
    Unsupported(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl WauError {
    /// Map error category to a deterministic process exit code.
    pub fn exit_code(&self) -> i32 {
        match self {
            WauError::ToolNotFound { .. } => 10,
            WauError::CommandFailure { .. } => 11,
            WauError::Config(_) => 20,
            WauError::Network(_) => 30,
            WauError::NetworkTimeout { .. } => 32,
            WauError::Serialization(_) => 31,
            WauError::Filesystem(_) => 40,
            WauError::Io(_) => 41,
            WauError::Runtime(_) => 50,
            WauError::SelfUpdate(_) => 51,
            WauError::Unsupported(_) => 60,
            WauError::PrerequisiteMissing(_) => EXIT_RETRY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prerequisite_missing_maps_to_retry_code() {
        let err = WauError::PrerequisiteMissing("winget".into());
        assert_eq!(err.exit_code(), 1618);
    }

    #[test]
    fn tool_not_found_message_names_the_tool() {
        let err = WauError::ToolNotFound {
            tool: "winget".into(),
        };
        assert_eq!(
            err.to_string(),
            "Required tool `winget` could not be located"
        );
        assert_eq!(err.exit_code(), 10);
    }
}
