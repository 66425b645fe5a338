/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::winget
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Interface with the winget CLI: locate the executable,
    list outdated packages, and run per-package upgrade and
    install commands.

  Security / Safety Notes:
    Executes winget with the privileges of the calling task.
    Package ids are passed as discrete arguments.

  Dependencies:
    which for PATH lookup, tokio::process (via process).

  Operational Scope:
    Supplies the upgrade driver with outdated records and the
    commands it needs to apply them.

  Revision History:
    2026-09-14 COD  Crafted winget integration layer.
    2026-09-28 COD  Table ends at the first blank line so the
                    pinned-package section is never parsed.
    2026-10-17 COD  Source agreements moved onto PackageManager.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic command invocation with explicit checks
    - Structured parsing with clear failure modes
    - Pure parser isolated from process execution
============================================================*/

use std::path::{Path, PathBuf};

use crate::error::{Result, WauError};
use crate::logger::Logger;
use crate::package_info::{CommandOutcome, UpdateRecord};
use crate::process::{run_capture, run_streaming, strip_redraw};

/// Prefix of the dashed line separating the table header from its rows.
const SEPARATOR: &str = "---";
const APP_INSTALLER_PREFIX: &str = "Microsoft.DesktopAppInstaller_";
const APP_INSTALLER_PUBLISHER: &str = "__8wekyb3d8bbwe";

/// Operations the upgrade driver needs from a package manager.
#[allow(async_fn_in_trait)]
pub trait PackageManager {
    /// Accept source agreements up front so later listings are not blocked
    /// on an interactive prompt.
    async fn accept_source_agreements(&self) -> Result<CommandOutcome>;
    /// Packages with a newer version available, in listing order.
    async fn list_outdated(&self) -> Result<Vec<UpdateRecord>>;
    /// Upgrade `id`, streaming output into `logger`.
    async fn upgrade(&self, id: &str, logger: &Logger) -> Result<CommandOutcome>;
    /// Install `id` over the existing copy, streaming output into `logger`.
    async fn install(&self, id: &str, logger: &Logger) -> Result<CommandOutcome>;
}

/// A located winget executable bound to one package source.
#[derive(Debug, Clone)]
pub struct Winget {
    executable: PathBuf,
    source: String,
}

impl Winget {
    pub fn new(executable: impl Into<PathBuf>, source: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            source: source.into(),
        }
    }

    /// Find winget: configured path, then `PATH`, then the newest App
    /// Installer package under `%ProgramFiles%\WindowsApps` (the only place
    /// a SYSTEM session can reach it).
    pub fn locate(configured: Option<&Path>, source: &str) -> Result<Self> {
        if let Some(path) = configured {
            if path.is_file() {
                return Ok(Self::new(path, source));
            }
            return Err(WauError::ToolNotFound {
                tool: path.display().to_string(),
            });
        }

        if let Ok(path) = which::which("winget") {
            return Ok(Self::new(path, source));
        }

        let program_files = std::env::var_os("ProgramFiles")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\Program Files"));
        find_app_installer(&program_files.join("WindowsApps"))
            .map(|path| Self::new(path, source))
            .ok_or_else(|| WauError::ToolNotFound {
                tool: "winget".into(),
            })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

impl PackageManager for Winget {
    async fn accept_source_agreements(&self) -> Result<CommandOutcome> {
        run_capture(
            &self.executable,
            [
                "list",
                "--accept-source-agreements",
                "--source",
                self.source.as_str(),
            ],
        )
        .await
    }

    async fn list_outdated(&self) -> Result<Vec<UpdateRecord>> {
        let outcome = run_capture(
            &self.executable,
            ["upgrade", "--source", self.source.as_str()],
        )
        .await?;
        parse_upgrade_table(&outcome.output)
    }

    async fn upgrade(&self, id: &str, logger: &Logger) -> Result<CommandOutcome> {
        run_streaming(
            &self.executable,
            [
                "upgrade",
                "--id",
                id,
                "--exact",
                "--all",
                "--silent",
                "--accept-package-agreements",
                "--accept-source-agreements",
                "--source",
                self.source.as_str(),
            ],
            |line| logger.debug("WINGET", line),
        )
        .await
    }

    async fn install(&self, id: &str, logger: &Logger) -> Result<CommandOutcome> {
        run_streaming(
            &self.executable,
            [
                "install",
                "--id",
                id,
                "--exact",
                "--silent",
                "--accept-package-agreements",
                "--accept-source-agreements",
                "--source",
                self.source.as_str(),
            ],
            |line| logger.debug("WINGET", line),
        )
        .await
    }
}

/// Newest `winget.exe` below a `WindowsApps` directory.
fn find_app_installer(windows_apps: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(windows_apps).ok()?;
    let mut candidates: Vec<(Vec<u64>, PathBuf)> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let rest = name.strip_prefix(APP_INSTALLER_PREFIX)?;
            if !name.ends_with(APP_INSTALLER_PUBLISHER) {
                return None;
            }
            let exe = entry.path().join("winget.exe");
            if !exe.is_file() {
                return None;
            }
            let version = rest
                .split('_')
                .next()
                .unwrap_or_default()
                .split('.')
                .map(|part| part.parse::<u64>().unwrap_or(0))
                .collect();
            Some((version, exe))
        })
        .collect();
    candidates.sort_by(|a, b| a.0.cmp(&b.0));
    candidates.pop().map(|(_, path)| path)
}

/// Column start offsets (in characters) derived from the header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TableLayout {
    id: usize,
    version: usize,
    available: usize,
    source: usize,
}

impl TableLayout {
    /// Header tokens are taken by position (name, id, version, available,
    /// source) so single-word localized headers work; each column starts at
    /// its token's first occurrence after the previous column.
    fn from_header(header: &str) -> Option<Self> {
        let chars: Vec<char> = header.chars().collect();
        let tokens: Vec<Vec<char>> = header
            .split_whitespace()
            .map(|token| token.chars().collect())
            .collect();
        if tokens.len() < 5 {
            return None;
        }

        let mut offsets = [0usize; 5];
        let mut cursor = 0usize;
        for (slot, token) in offsets.iter_mut().zip(tokens.iter()) {
            let found = find_chars(&chars, token, cursor)?;
            *slot = found;
            cursor = found + token.len();
        }

        Some(Self {
            id: offsets[1],
            version: offsets[2],
            available: offsets[3],
            source: offsets[4],
        })
    }

    fn slice(&self, row: &[char]) -> UpdateRecord {
        let field = |start: usize, end: usize| -> String {
            row[start.min(row.len())..end.min(row.len())]
                .iter()
                .collect::<String>()
                .trim_end()
                .to_string()
        };
        UpdateRecord {
            name: field(0, self.id),
            id: field(self.id, self.version),
            current_version: field(self.version, self.available),
            available_version: field(self.available, self.source),
        }
    }
}

fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&start| haystack[start..start + needle.len()] == *needle)
}

/// Parse `winget upgrade` output into records.
///
/// Output without a separator line means nothing is outdated and yields an
/// empty list. Rows no longer than the source column offset, and rows
/// starting with `-`, are skipped. The table ends at the first blank line.
pub fn parse_upgrade_table(output: &str) -> Result<Vec<UpdateRecord>> {
    let lines: Vec<&str> = output.lines().map(strip_redraw).collect();
    let Some(separator) = lines
        .iter()
        .position(|line| line.trim_start().starts_with(SEPARATOR))
    else {
        return Ok(Vec::new());
    };

    let header = lines[..separator]
        .iter()
        .rev()
        .find(|line| !line.trim().is_empty())
        .ok_or_else(|| WauError::Serialization("winget table has no header row".into()))?;
    let layout = TableLayout::from_header(header).ok_or_else(|| {
        WauError::Serialization(format!("Unrecognised winget table header `{}`", header.trim()))
    })?;

    let mut records = Vec::new();
    for line in &lines[separator + 1..] {
        if line.trim().is_empty() {
            break;
        }
        let row: Vec<char> = line.chars().collect();
        if row.len() <= layout.source || line.starts_with('-') {
            continue;
        }
        records.push(layout.slice(&row));
    }
    Ok(records)
}

/// True when `id` is among `records`.
pub fn is_listed(records: &[UpdateRecord], id: &str) -> bool {
    records
        .iter()
        .any(|record| record.id.eq_ignore_ascii_case(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const SAMPLE: &str = "\r   - \r   \\ \r\
Name                           Id                       Version      Available    Source\r\n\
--------------------------------------------------------------------------------------------\r\n\
Mozilla Firefox (x64 en-US)    Mozilla.Firefox          118.0.1      119.0        winget\r\n\
7-Zip 22.01 (x64)              7zip.7zip                22.01        23.01        winget\r\n\
Some Legacy Tool               Vendor.Legacy            Unknown      4.2.0        winget\r\n\
3 upgrades available.\r\n\
\r\n\
The following packages have an upgrade available, but require explicit targeting for upgrade:\r\n\
Name                           Id                       Version      Available    Source\r\n\
--------------------------------------------------------------------------------------------\r\n\
Pinned App                     Vendor.Pinned            1.0          2.0          winget\r\n";

    #[test]
    fn parses_rows_by_header_offsets() {
        let records = parse_upgrade_table(SAMPLE).unwrap();
        assert_eq!(
            records,
            vec![
                UpdateRecord::new("Mozilla Firefox (x64 en-US)", "Mozilla.Firefox", "118.0.1", "119.0"),
                UpdateRecord::new("7-Zip 22.01 (x64)", "7zip.7zip", "22.01", "23.01"),
                UpdateRecord::new("Some Legacy Tool", "Vendor.Legacy", "Unknown", "4.2.0"),
            ]
        );
    }

    #[test]
    fn output_without_separator_is_empty() {
        let records = parse_upgrade_table("No installed package found matching input criteria.\n").unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn short_rows_are_skipped() {
        let output = "Name   Id     Version Available Source\n\
                      --------------------------------------\n\
                      App    V.App  1.0     1.1       winget\n\
                      short\n\
                      Tool   V.Tool 2.0     2.5       winget\n";
        let records = parse_upgrade_table(output).unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["V.App", "V.Tool"]);
    }

    #[test]
    fn fields_equal_trimmed_substrings_of_the_row() {
        let output = "Name       Id            Version   Available Source\n\
                      ---------------------------------------------------\n\
                      Café Ünï   Vendor.Cafe   1.0.0     1.2.0     winget\n";
        let records = parse_upgrade_table(output).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "Café Ünï");
        assert_eq!(records[0].id, "Vendor.Cafe");
        assert_eq!(records[0].current_version, "1.0.0");
        assert_eq!(records[0].available_version, "1.2.0");
    }

    #[test]
    fn localized_single_word_headers_are_positional() {
        let output = "Nom        ID            Version   Disponible Source\n\
                      ----------------------------------------------------\n\
                      Outil      Vendor.Outil  1.0       1.1        winget\n";
        let records = parse_upgrade_table(output).unwrap();
        assert_eq!(records[0].id, "Vendor.Outil");
        assert_eq!(records[0].available_version, "1.1");
    }

    #[test]
    fn header_with_too_few_columns_is_an_error() {
        let output = "Name Id\n--------\nA    B\n";
        assert!(matches!(
            parse_upgrade_table(output),
            Err(WauError::Serialization(_))
        ));
    }

    #[test]
    fn listing_lookup_ignores_case() {
        let records = vec![UpdateRecord::new("A", "Vendor.App", "1", "2")];
        assert!(is_listed(&records, "vendor.app"));
        assert!(!is_listed(&records, "Vendor.Other"));
    }

    #[test]
    fn newest_app_installer_wins() {
        let dir = TempDir::new().unwrap();
        for version in ["1.9.2411.0", "1.21.3482.0", "1.21.2771.0"] {
            let pkg = dir.path().join(format!(
                "{APP_INSTALLER_PREFIX}{version}_x64{APP_INSTALLER_PUBLISHER}"
            ));
            std::fs::create_dir_all(&pkg).unwrap();
            std::fs::write(pkg.join("winget.exe"), b"").unwrap();
        }
        std::fs::create_dir_all(dir.path().join("Microsoft.Other_1.0_x64__abc")).unwrap();

        let found = find_app_installer(dir.path()).unwrap();
        assert!(found
            .to_string_lossy()
            .contains("Microsoft.DesktopAppInstaller_1.21.3482.0_x64"));
    }

    #[test]
    fn configured_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("winget.exe");
        assert!(matches!(
            Winget::locate(Some(&missing), "winget"),
            Err(WauError::ToolNotFound { .. })
        ));
    }
}
