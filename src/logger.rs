/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::logger
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Provide structured, append-only logging utilities for
    Syn-Wau runs, installs and helper invocations.

  Security / Safety Notes:
    Log lines carry package ids, versions and winget output
    only; no credentials pass through this module.

  Dependencies:
    std::fs::File, std::sync::Mutex, chrono for timestamps.

  Operational Scope:
    Used by runtime components to emit RFC-3339 UTC stamped
    log entries and to rotate the update log between runs.

  Revision History:
    2026-09-14 COD  Established logging module for Syn-Wau.
    2026-09-30 COD  Added size-based rotation.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Append-only logging with UTC timestamps
    - Deterministic formatting for auditability
    - Graceful error propagation on I/O failures
============================================================*/

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{SecondsFormat, Utc};

use crate::error::{Result, WauError};

/// Structured log level for Syn-Wau events.
#[derive(Copy, Clone, Eq, PartialEq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Shared logger that appends entries to the update log and echoes them.
pub struct Logger {
    file: Option<Mutex<BufWriter<File>>>,
    path: Option<PathBuf>,
    verbose: bool,
}

impl Logger {
    /// Build a logger that echoes to the console and optionally appends to a file.
    pub fn new(path: Option<PathBuf>, verbose: bool) -> Result<Self> {
        let file = if let Some(ref file_path) = path {
            if let Some(parent) = file_path.parent() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    WauError::Filesystem(format!(
                        "Failed to create log directory {}: {err}",
                        parent.display()
                    ))
                })?;
            }

            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)
                .map_err(|err| {
                    WauError::Filesystem(format!(
                        "Failed to open log file {}: {err}",
                        file_path.display()
                    ))
                })?;
            Some(Mutex::new(BufWriter::new(file)))
        } else {
            None
        };

        Ok(Self {
            file,
            path,
            verbose,
        })
    }

    /// Logger that only echoes to the console.
    pub fn console(verbose: bool) -> Self {
        Self {
            file: None,
            path: None,
            verbose,
        }
    }

    /// Emit a log entry with the given level, code, and message.
    pub fn log<S: AsRef<str>>(&self, level: LogLevel, code: &str, message: S) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let payload = format!(
            "{timestamp} [{}] [{}] {}",
            level.as_str(),
            code,
            message.as_ref()
        );

        match level {
            LogLevel::Error | LogLevel::Warn => eprintln!("{payload}"),
            LogLevel::Info => println!("{payload}"),
            LogLevel::Debug if self.verbose => println!("{payload}"),
            LogLevel::Debug => {}
        }

        if let Some(file) = &self.file {
            if let Ok(mut guard) = file.lock() {
                if writeln!(guard, "{payload}").is_err() {
                    eprintln!(
                        "{} [{}] [{}] {}",
                        timestamp,
                        LogLevel::Error.as_str(),
                        "LOGGER",
                        "Failed to write to log file"
                    );
                }
                if guard.flush().is_err() {
                    eprintln!(
                        "{} [{}] [{}] {}",
                        timestamp,
                        LogLevel::Warn.as_str(),
                        "LOGGER",
                        "Failed to flush log writer"
                    );
                }
            }
        }
    }

    /// Convenience wrapper for `INFO` level events.
    pub fn info<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Info, code, message);
    }

    /// Convenience wrapper for `WARN` level events.
    pub fn warn<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Warn, code, message);
    }

    /// Convenience wrapper for `ERROR` level events.
    pub fn error<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Error, code, message);
    }

    /// Convenience wrapper for `DEBUG` level events.
    pub fn debug<S: AsRef<str>>(&self, code: &str, message: S) {
        self.log(LogLevel::Debug, code, message);
    }

    /// Return the path backing this logger, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

/// Rotate `path` when it has grown past `max_size` bytes.
///
/// Backups are numbered `updates.log.1` (newest) through
/// `updates.log.<max_files>`; the oldest is discarded. With `max_files == 0`
/// the oversized log is simply removed. Returns whether a rotation happened.
pub fn rotate_if_needed(path: &Path, max_size: u64, max_files: usize) -> Result<bool> {
    let size = match std::fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(WauError::Filesystem(format!(
                "Failed to inspect log {}: {err}",
                path.display()
            )))
        }
    };
    if max_size == 0 || size <= max_size {
        return Ok(false);
    }

    if max_files == 0 {
        remove_if_present(path)?;
        return Ok(true);
    }

    remove_if_present(&numbered(path, max_files))?;
    for index in (1..max_files).rev() {
        let from = numbered(path, index);
        if from.exists() {
            rename(&from, &numbered(path, index + 1))?;
        }
    }
    rename(path, &numbered(path, 1))?;
    Ok(true)
}

fn numbered(path: &Path, index: usize) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(format!(".{index}"));
    PathBuf::from(os)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    std::fs::rename(from, to).map_err(|err| {
        WauError::Filesystem(format!(
            "Failed to rotate {} to {}: {err}",
            from.display(),
            to.display()
        ))
    })
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(WauError::Filesystem(format!(
            "Failed to remove {}: {err}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn entries_are_appended_with_level_and_code() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("updates.log");
        {
            let logger = Logger::new(Some(path.clone()), false).unwrap();
            logger.info("INIT", "first");
            logger.debug("WINGET", "second");
        }
        {
            let logger = Logger::new(Some(path.clone()), false).unwrap();
            logger.warn("NET", "third");
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("[INFO] [INIT] first"));
        assert!(lines[1].ends_with("[DEBUG] [WINGET] second"));
        assert!(lines[2].ends_with("[WARN] [NET] third"));
    }

    #[test]
    fn small_log_is_not_rotated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("updates.log");
        std::fs::write(&path, "tiny").unwrap();

        assert!(!rotate_if_needed(&path, 1024, 3).unwrap());
        assert!(path.exists());
    }

    #[test]
    fn oversized_log_shifts_backups_and_drops_oldest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("updates.log");
        std::fs::write(&path, "current-current").unwrap();
        std::fs::write(numbered(&path, 1), "one").unwrap();
        std::fs::write(numbered(&path, 2), "two").unwrap();

        assert!(rotate_if_needed(&path, 4, 2).unwrap());

        assert!(!path.exists());
        assert_eq!(
            std::fs::read_to_string(numbered(&path, 1)).unwrap(),
            "current-current"
        );
        assert_eq!(std::fs::read_to_string(numbered(&path, 2)).unwrap(), "one");
        assert!(!numbered(&path, 3).exists());
    }

    #[test]
    fn missing_log_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        assert!(!rotate_if_needed(&dir.path().join("absent.log"), 1, 1).unwrap());
    }
}
