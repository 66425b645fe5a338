/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::policy
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Load the allow-list or deny-list of winget package ids and
    decide whether a package is eligible for upgrade.

  Security / Safety Notes:
    Read-only access to operator-maintained list files.

  Dependencies:
    None beyond std.

  Operational Scope:
    Loaded once per run by the runner; consulted by the
    upgrade driver for every outdated record.

  Revision History:
    2026-09-14 COD  Authored list policy.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Exactly one list mode per run
    - Immutable after load
============================================================*/

use std::collections::BTreeSet;
use std::path::Path;

use crate::config::ListMode;
use crate::error::{Result, WauError};

/// Eligibility policy: one mode plus its list of package ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    mode: ListMode,
    entries: BTreeSet<String>,
}

impl Policy {
    pub fn new<I, S>(mode: ListMode, entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode,
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse list text: one id per line, surrounding whitespace trimmed,
    /// blank lines and `#` comments ignored.
    pub fn parse(mode: ListMode, text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();
        Self { mode, entries }
    }

    /// Load the list file. A missing file yields an empty list.
    pub fn load(mode: ListMode, path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(mode, &text)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::new(
                mode,
                std::iter::empty::<String>(),
            )),
            Err(err) => Err(WauError::Config(format!(
                "Failed to read list {}: {err}",
                path.display()
            ))),
        }
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the policy forbids upgrading `id`.
    pub fn excludes(&self, id: &str) -> bool {
        let listed = self.entries.iter().any(|entry| entry_matches(entry, id));
        match self.mode {
            ListMode::Allow => !listed,
            ListMode::Deny => listed,
        }
    }
}

/// Ids compare case-insensitively, as winget does. A trailing `*` matches by prefix.
fn entry_matches(entry: &str, id: &str) -> bool {
    match entry.strip_suffix('*') {
        Some(prefix) => id
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix)),
        None => entry.eq_ignore_ascii_case(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn deny_list_excludes_listed_ids_only() {
        let policy = Policy::new(ListMode::Deny, ["Vendor.Tool"]);
        assert!(policy.excludes("Vendor.Tool"));
        assert!(policy.excludes("vendor.tool"));
        assert!(!policy.excludes("Other.App"));
    }

    #[test]
    fn allow_list_excludes_unlisted_ids() {
        let policy = Policy::new(ListMode::Allow, ["Vendor.Tool"]);
        assert!(!policy.excludes("Vendor.Tool"));
        assert!(policy.excludes("Other.App"));
    }

    #[test]
    fn empty_allow_list_excludes_everything() {
        let policy = Policy::new(ListMode::Allow, Vec::<String>::new());
        assert!(policy.excludes("Any.App"));
    }

    #[test]
    fn parse_trims_and_skips_blank_and_comment_lines() {
        let policy = Policy::parse(
            ListMode::Deny,
            "  Mozilla.Firefox  \r\n\r\n# managed by IT\nGoogle.Chrome\n",
        );
        assert_eq!(policy.len(), 2);
        assert!(policy.excludes("Mozilla.Firefox"));
        assert!(policy.excludes("Google.Chrome"));
    }

    #[test]
    fn trailing_wildcard_matches_prefix() {
        let policy = Policy::parse(ListMode::Deny, "Microsoft.VCRedist*\n");
        assert!(policy.excludes("Microsoft.VCRedist.2015+.x64"));
        assert!(!policy.excludes("Microsoft.PowerToys"));
    }

    #[test]
    fn missing_file_loads_empty_list() {
        let dir = TempDir::new().unwrap();
        let policy = Policy::load(ListMode::Deny, &dir.path().join("absent.txt")).unwrap();
        assert!(policy.is_empty());
        assert_eq!(policy.mode(), ListMode::Deny);
    }
}
