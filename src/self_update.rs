/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::self_update
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Compare the installed agent version with the latest
    published release and, when newer, overlay the release
    archive onto the install directory.

  Security / Safety Notes:
    Archive entries are confined to the staging directory via
    `enclosed_name`. A published `.sha256` must match the
    downloaded archive. Operator files are never overwritten.

  Dependencies:
    reqwest for the GitHub release index and assets, semver for
    ordering, zip for extraction, sha2/hex for verification,
    tempfile for staging, urlencoding for asset URLs.

  Operational Scope:
    Runs once per scheduled run after connectivity is confirmed
    and only when `auto_update_enabled` is set.

  Revision History:
    2026-09-23 COD  Authored release check and overlay.
    2026-10-02 COD  Added checksum verification and `.old`
                    handling for the running executable.
    2026-10-17 COD  New executable staged as `.new` before the
                    live one is moved aside; rolled back on failure.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Strictly-greater version comparison
    - Failures contained; the run continues on the old version
============================================================*/

use std::fs;
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::StatusCode;
use semver::Version;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::config::{AboutRecord, WauConfig};
use crate::error::{Result, WauError};
use crate::locale::{Locale, MessageKind, TemplateArgs};
use crate::logger::Logger;
use crate::notify::{NotificationEvent, NotificationSink, Severity};
use crate::paths::AgentPaths;
use crate::scheduler::{TaskScheduler, MAIN_TASK_NAME};

const GITHUB_API: &str = "https://api.github.com/repos";
const GITHUB_DOWNLOAD: &str = "https://github.com";
const NOTIFICATION_TAG: &str = "self-update";
const OLD_SUFFIX: &str = ".old";
const STAGED_SUFFIX: &str = ".new";

/// Latest release as seen in the release index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    pub tag_name: String,
    pub version: Version,
}

#[derive(Debug, Deserialize)]
struct ReleaseEntry {
    tag_name: String,
    #[serde(default)]
    draft: bool,
}

/// Parse a `vMAJOR.MINOR.PATCH` release tag.
pub fn parse_tag(tag: &str) -> Result<Version> {
    let trimmed = tag.trim();
    let bare = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    Version::parse(bare)
        .map_err(|err| WauError::SelfUpdate(format!("Invalid release tag `{tag}`: {err}")))
}

/// True when release `tag` is strictly newer than `current`.
pub fn is_newer(current: &str, tag: &str) -> Result<bool> {
    Ok(parse_tag(tag)? > parse_tag(current)?)
}

/// Release checker and installer for the agent itself.
pub struct SelfUpdater<'a, N> {
    client: reqwest::Client,
    repo: String,
    asset: String,
    allow_prerelease: bool,
    paths: &'a AgentPaths,
    notifier: &'a N,
    locale: &'a Locale,
    logger: &'a Logger,
}

impl<'a, N: NotificationSink> SelfUpdater<'a, N> {
    pub fn new(
        config: &WauConfig,
        paths: &'a AgentPaths,
        notifier: &'a N,
        locale: &'a Locale,
        logger: &'a Logger,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .user_agent(concat!("Syn-Wau/", env!("CARGO_PKG_VERSION"), " (windows)"))
            .build()
            .map_err(|err| WauError::Network(format!("Failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            repo: config.release_repo.clone(),
            asset: config.release_asset.clone(),
            allow_prerelease: config.allow_prerelease,
            paths,
            notifier,
            locale,
            logger,
        })
    }

    /// Install the latest release when it is newer than `current_version`.
    /// Returns true once the new files are in place and the next run has been
    /// triggered; the caller should then end the current run.
    pub async fn check_and_apply_self_update(&self, current_version: &str) -> bool {
        let release = match self.latest_release().await {
            Ok(release) => release,
            Err(err) => {
                self.logger
                    .warn("SELFUPDATE", format!("Release check failed: {err}"));
                return false;
            }
        };

        match is_newer(current_version, &release.tag_name) {
            Ok(true) => {}
            Ok(false) => {
                self.logger.info(
                    "SELFUPDATE",
                    format!(
                        "Agent {current_version} is up to date (latest {})",
                        release.tag_name
                    ),
                );
                return false;
            }
            Err(err) => {
                self.logger.warn("SELFUPDATE", err.to_string());
                return false;
            }
        }

        let version = release.version.to_string();
        let args = TemplateArgs::new().with("version", version.as_str());
        self.logger.info(
            "SELFUPDATE",
            format!("Updating agent {current_version} -> {version}"),
        );
        self.notify(MessageKind::SelfUpdateStarting, &args, Severity::Info)
            .await;

        if let Err(err) = self.apply(&release).await {
            self.logger.error("SELFUPDATE", err.to_string());
            self.notify(MessageKind::SelfUpdateFailed, &args, Severity::Error)
                .await;
            return false;
        }

        self.logger
            .info("SELFUPDATE", format!("Agent updated to {version}"));
        self.notify(MessageKind::SelfUpdateSucceeded, &args, Severity::Success)
            .await;
        if let Err(err) = TaskScheduler::new().run(MAIN_TASK_NAME).await {
            self.logger.warn(
                "SELFUPDATE",
                format!("Could not restart {MAIN_TASK_NAME}: {err}"),
            );
        }
        true
    }

    /// Fetch the newest release (including pre-releases when allowed).
    pub async fn latest_release(&self) -> Result<ReleaseInfo> {
        let entry = if self.allow_prerelease {
            let url = format!("{GITHUB_API}/{}/releases?per_page=10", self.repo);
            let entries: Vec<ReleaseEntry> = self.get_json(&url).await?;
            entries
                .into_iter()
                .find(|entry| !entry.draft)
                .ok_or_else(|| WauError::SelfUpdate(format!("No releases published for {}", self.repo)))?
        } else {
            let url = format!("{GITHUB_API}/{}/releases/latest", self.repo);
            self.get_json::<ReleaseEntry>(&url).await?
        };
        let version = parse_tag(&entry.tag_name)?;
        Ok(ReleaseInfo {
            tag_name: entry.tag_name,
            version,
        })
    }

    async fn apply(&self, release: &ReleaseInfo) -> Result<()> {
        let url = asset_url(&self.repo, &release.tag_name, &self.asset);
        let archive = self
            .download(&url)
            .await?
            .ok_or_else(|| WauError::SelfUpdate(format!("Release asset missing: {url}")))?;
        self.logger.debug(
            "SELFUPDATE",
            format!("Downloaded {} bytes from {url}", archive.len()),
        );

        match self.download(&format!("{url}.sha256")).await? {
            Some(published) => {
                let text = String::from_utf8_lossy(&published);
                verify_checksum(&archive, &parse_checksum(&text)?)?;
                self.logger.debug("SELFUPDATE", "Archive checksum verified");
            }
            None => self
                .logger
                .debug("SELFUPDATE", "No published checksum for release asset"),
        }

        let staging = tempfile::Builder::new().prefix("wau-release-").tempdir()?;
        let extracted = extract_archive(&archive, staging.path())?;
        self.logger.debug(
            "SELFUPDATE",
            format!("Extracted {extracted} files into {}", staging.path().display()),
        );
        let source = release_root(staging.path())?;
        let copied = overlay(&source, self.paths)?;
        self.logger.debug(
            "SELFUPDATE",
            format!("Copied {copied} files into {}", self.paths.root().display()),
        );

        AboutRecord {
            version: release.version.to_string(),
        }
        .save(&self.paths.about_file())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|err| WauError::Network(format!("Request to {url} failed: {err}")))?;
        if !response.status().is_success() {
            return Err(WauError::Network(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| WauError::Serialization(format!("Invalid release index: {err}")))
    }

    /// GET `url`; `None` when the server answers 404.
    async fn download(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| WauError::Network(format!("Download of {url} failed: {err}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(WauError::Network(format!(
                "{url} returned HTTP {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|err| WauError::Network(format!("Download of {url} failed: {err}")))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn notify(&self, kind: MessageKind, args: &TemplateArgs, severity: Severity) {
        self.notifier
            .notify(NotificationEvent::from_template(
                self.locale,
                kind,
                args,
                severity,
                NOTIFICATION_TAG,
            ))
            .await;
    }
}

fn asset_url(repo: &str, tag: &str, asset: &str) -> String {
    format!(
        "{GITHUB_DOWNLOAD}/{repo}/releases/download/{}/{}",
        urlencoding::encode(tag),
        urlencoding::encode(asset)
    )
}

/// First token of a `sha256sum`-style file, validated as a hex digest.
pub fn parse_checksum(text: &str) -> Result<String> {
    let digest = text.split_whitespace().next().unwrap_or_default();
    if digest.len() == 64 && digest.chars().all(|ch| ch.is_ascii_hexdigit()) {
        Ok(digest.to_ascii_lowercase())
    } else {
        Err(WauError::SelfUpdate(format!(
            "Malformed published checksum `{}`",
            text.trim()
        )))
    }
}

pub fn verify_checksum(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = hex::encode(Sha256::digest(bytes));
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(WauError::SelfUpdate(format!(
            "Checksum mismatch: expected {expected}, got {actual}"
        )))
    }
}

/// Unpack a zip archive below `dest`. Returns the number of files written.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<usize> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| WauError::SelfUpdate(format!("Invalid release archive: {err}")))?;
    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| WauError::SelfUpdate(format!("Corrupt archive entry {index}: {err}")))?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            WauError::SelfUpdate(format!("Archive entry escapes target: {}", entry.name()))
        })?;
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }
    Ok(written)
}

/// Directory holding the release files: the single top-level directory of the
/// archive when there is one, the staging directory otherwise.
pub fn release_root(staging: &Path) -> Result<PathBuf> {
    let entries = fs::read_dir(staging)?.collect::<io::Result<Vec<_>>>()?;
    if let [only] = entries.as_slice() {
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(staging.to_path_buf())
}

/// Copy the release tree over the install root, leaving operator files alone
/// and moving the running executable aside. Returns the number of files copied.
pub fn overlay(source: &Path, paths: &AgentPaths) -> Result<usize> {
    let protected = paths.user_data_files();
    let executable = paths.executable();
    let mut copied = 0;
    let mut pending = vec![source.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let from = entry.path();
            let relative = from.strip_prefix(source).map_err(|err| {
                WauError::Filesystem(format!("Unexpected path {}: {err}", from.display()))
            })?;
            let target = paths.root().join(relative);

            if entry.file_type()?.is_dir() {
                fs::create_dir_all(&target)?;
                pending.push(from);
                continue;
            }
            if protected.contains(&target) && target.exists() {
                continue;
            }
            if target == executable && target.exists() {
                replace_running(&from, &target)?;
            } else {
                copy_file(&from, &target)?;
            }
            copied += 1;
        }
    }
    Ok(copied)
}

fn copy_file(from: &Path, target: &Path) -> Result<()> {
    fs::copy(from, target).map(|_| ()).map_err(|err| {
        WauError::Filesystem(format!("Failed to copy {}: {err}", target.display()))
    })
}

/// Stage the new executable next to `target`, move the live one to `.old`,
/// then rename the staged copy into place. The live file is restored if the
/// last rename fails.
fn replace_running(from: &Path, target: &Path) -> Result<()> {
    let staged = suffixed(target, STAGED_SUFFIX);
    if let Err(err) = copy_file(from, &staged) {
        let _ = fs::remove_file(&staged);
        return Err(err);
    }

    let old = old_path(target);
    if old.exists() {
        fs::remove_file(&old)?;
    }
    if let Err(err) = fs::rename(target, &old) {
        let _ = fs::remove_file(&staged);
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&staged, target) {
        let _ = fs::rename(&old, target);
        let _ = fs::remove_file(&staged);
        return Err(WauError::Filesystem(format!(
            "Failed to replace {}: {err}",
            target.display()
        )));
    }
    Ok(())
}

fn old_path(path: &Path) -> PathBuf {
    suffixed(path, OLD_SUFFIX)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Remove `*.old` leftovers of a previous self-update. Files still locked are
/// kept for the next run.
pub fn cleanup_stale_old(root: &Path, logger: &Logger) -> usize {
    let Ok(entries) = fs::read_dir(root) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let is_old = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(OLD_SUFFIX));
        if !is_old || !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(err) => logger.debug(
                "SELFUPDATE",
                format!("Keeping {}: {err}", path.display()),
            ),
        }
    }
    removed
}
