/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::driver
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Apply upgrades to outdated packages one by one: filter by
    policy, upgrade, fall back to install, re-check, classify,
    and notify.

  Security / Safety Notes:
    Package ids originate from winget output and are passed to
    winget as discrete arguments only.

  Dependencies:
    None beyond crate modules; generic over the package
    manager and notification sink for testing.

  Operational Scope:
    Called once per scheduled run by the runner after the
    lister has produced the candidate set.

  Revision History:
    2026-09-21 COD  Authored upgrade driver.
    2026-09-28 COD  Wired package hooks around each attempt.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Exactly one terminal classification per attempt
    - Failures contained to the package being processed
    - Strictly sequential, listing order preserved
============================================================*/

use crate::locale::{Locale, MessageKind, TemplateArgs};
use crate::logger::Logger;
use crate::mods::{HookStage, Mods};
use crate::notify::{NotificationEvent, NotificationSink, Severity};
use crate::package_info::{CommandOutcome, UpdateRecord};
use crate::policy::Policy;
use crate::winget::{is_listed, PackageManager};

/// Terminal result of one upgrade attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpgradeClassification {
    Succeeded,
    Failed,
}

/// Why a record was not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ExcludedByPolicy,
    UnknownVersion,
}

/// Everything that happened to one attempted package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeAttempt {
    pub id: String,
    pub classification: UpgradeClassification,
    pub upgrade: Option<CommandOutcome>,
    pub fallback_install: Option<CommandOutcome>,
}

/// Totals for one driver pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeSummary {
    pub attempts: Vec<UpgradeAttempt>,
    pub skipped: Vec<(String, SkipReason)>,
    pub succeeded: usize,
}

impl UpgradeSummary {
    pub fn failed_ids(&self) -> Vec<&str> {
        self.attempts
            .iter()
            .filter(|attempt| attempt.classification == UpgradeClassification::Failed)
            .map(|attempt| attempt.id.as_str())
            .collect()
    }
}

/// Decide whether `record` may be submitted to the upgrade step.
pub fn skip_reason(record: &UpdateRecord, policy: &Policy) -> Option<SkipReason> {
    if record.has_unknown_version() {
        Some(SkipReason::UnknownVersion)
    } else if policy.excludes(&record.id) {
        Some(SkipReason::ExcludedByPolicy)
    } else {
        None
    }
}

/// Sequential upgrade loop over a package manager.
pub struct UpgradeDriver<'a, P, N> {
    manager: &'a P,
    notifier: &'a N,
    locale: &'a Locale,
    logger: &'a Logger,
    mods: &'a Mods,
}

impl<'a, P, N> UpgradeDriver<'a, P, N>
where
    P: PackageManager,
    N: NotificationSink,
{
    pub fn new(
        manager: &'a P,
        notifier: &'a N,
        locale: &'a Locale,
        logger: &'a Logger,
        mods: &'a Mods,
    ) -> Self {
        Self {
            manager,
            notifier,
            locale,
            logger,
            mods,
        }
    }

    /// Process `records` in order; `summary.succeeded` counts successful upgrades.
    pub async fn apply_updates(&self, records: &[UpdateRecord], policy: &Policy) -> UpgradeSummary {
        let mut summary = UpgradeSummary::default();

        for record in records {
            if let Some(reason) = skip_reason(record, policy) {
                let why = match reason {
                    SkipReason::ExcludedByPolicy => format!("excluded by {} list", policy.mode()),
                    SkipReason::UnknownVersion => "installed version unknown".to_string(),
                };
                self.logger.info(
                    "SKIP",
                    format!("{} ({}) {} -> {}: {why}", record.name, record.id, record.current_version, record.available_version),
                );
                summary.skipped.push((record.id.clone(), reason));
                continue;
            }

            let attempt = self.upgrade_one(record).await;
            if attempt.classification == UpgradeClassification::Succeeded {
                summary.succeeded += 1;
            }
            summary.attempts.push(attempt);
        }

        self.logger.info(
            "SUMMARY",
            format!(
                "attempted={} succeeded={} failed={} skipped={}",
                summary.attempts.len(),
                summary.succeeded,
                summary.attempts.len() - summary.succeeded,
                summary.skipped.len()
            ),
        );
        summary
    }

    async fn upgrade_one(&self, record: &UpdateRecord) -> UpgradeAttempt {
        let args = TemplateArgs::new()
            .with("app", record.name.as_str())
            .with("id", record.id.as_str())
            .with("current", record.current_version.as_str())
            .with("available", record.available_version.as_str());

        self.logger.info(
            "UPGRADE",
            format!(
                "{} ({}) {} -> {}",
                record.name, record.id, record.current_version, record.available_version
            ),
        );
        self.notify(MessageKind::UpdateStarting, &args, Severity::Info, &record.id)
            .await;

        self.mods.run(&record.id, HookStage::PreInstall, self.logger).await;
        let upgrade = self.run_step("upgrade", &record.id, self.manager.upgrade(&record.id, self.logger).await);
        self.mods.run(&record.id, HookStage::Upgrade, self.logger).await;

        let mut fallback_install = None;
        let mut outdated = self.still_outdated(&record.id).await;
        if outdated {
            self.logger.warn(
                "UPGRADE",
                format!("{} still outdated after upgrade; trying install", record.id),
            );
            fallback_install = self.run_step(
                "install",
                &record.id,
                self.manager.install(&record.id, self.logger).await,
            );
            outdated = self.still_outdated(&record.id).await;
        }

        let classification = if outdated {
            UpgradeClassification::Failed
        } else {
            UpgradeClassification::Succeeded
        };

        match classification {
            UpgradeClassification::Succeeded => {
                self.mods.run(&record.id, HookStage::Installed, self.logger).await;
                self.logger.info(
                    "UPGRADE",
                    format!("{} updated to {}", record.id, record.available_version),
                );
                self.notify(MessageKind::UpdateSucceeded, &args, Severity::Success, &record.id)
                    .await;
            }
            UpgradeClassification::Failed => {
                self.logger.error(
                    "UPGRADE",
                    format!("{} could not be updated to {}", record.id, record.available_version),
                );
                self.notify(MessageKind::UpdateFailed, &args, Severity::Error, &record.id)
                    .await;
            }
        }

        UpgradeAttempt {
            id: record.id.clone(),
            classification,
            upgrade,
            fallback_install,
        }
    }

    fn run_step(
        &self,
        step: &str,
        id: &str,
        result: crate::error::Result<CommandOutcome>,
    ) -> Option<CommandOutcome> {
        match result {
            Ok(outcome) => {
                self.logger.info(
                    "WINGET",
                    format!("{step} {id} exited with status {}", outcome.status_label()),
                );
                Some(outcome)
            }
            Err(err) => {
                self.logger.error("WINGET", format!("{step} {id} failed to run: {err}"));
                None
            }
        }
    }

    /// Re-list and look for `id`. A listing failure counts as still outdated,
    /// so an unverifiable upgrade is never reported as a success.
    async fn still_outdated(&self, id: &str) -> bool {
        match self.manager.list_outdated().await {
            Ok(records) => is_listed(&records, id),
            Err(err) => {
                self.logger
                    .warn("UPGRADE", format!("Could not re-list after {id}: {err}"));
                true
            }
        }
    }

    async fn notify(&self, kind: MessageKind, args: &TemplateArgs, severity: Severity, tag: &str) {
        self.notifier
            .notify(NotificationEvent::from_template(
                self.locale,
                kind,
                args,
                severity,
                tag,
            ))
            .await;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;

    use super::*;
    use crate::config::ListMode;
    use crate::error::{Result, WauError};
    use crate::notify::testing::RecordingSink;

    /// Package manager whose listings are scripted per call.
    struct ScriptedManager {
        listings: RefCell<VecDeque<Result<Vec<UpdateRecord>>>>,
        upgrades: RefCell<Vec<String>>,
        installs: RefCell<Vec<String>>,
    }

    impl ScriptedManager {
        fn new(listings: Vec<Result<Vec<UpdateRecord>>>) -> Self {
            Self {
                listings: RefCell::new(listings.into()),
                upgrades: RefCell::new(Vec::new()),
                installs: RefCell::new(Vec::new()),
            }
        }
    }

    impl PackageManager for ScriptedManager {
        async fn accept_source_agreements(&self) -> Result<CommandOutcome> {
            Ok(CommandOutcome::new(Some(0), ""))
        }

        async fn list_outdated(&self) -> Result<Vec<UpdateRecord>> {
            self.listings
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn upgrade(&self, id: &str, _logger: &Logger) -> Result<CommandOutcome> {
            self.upgrades.borrow_mut().push(id.to_string());
            Ok(CommandOutcome::new(Some(0), ""))
        }

        async fn install(&self, id: &str, _logger: &Logger) -> Result<CommandOutcome> {
            self.installs.borrow_mut().push(id.to_string());
            Ok(CommandOutcome::new(Some(0), ""))
        }
    }

    fn other_app() -> UpdateRecord {
        UpdateRecord::new("Other App", "Other.App", "2.0", "2.1")
    }

    async fn drive(
        manager: &ScriptedManager,
        sink: &RecordingSink,
        records: &[UpdateRecord],
        policy: &Policy,
    ) -> UpgradeSummary {
        let locale = Locale::english();
        let logger = Logger::console(false);
        let mods = Mods::disabled();
        UpgradeDriver::new(manager, sink, &locale, &logger, &mods)
            .apply_updates(records, policy)
            .await
    }

    #[tokio::test]
    async fn deny_listed_package_is_skipped_and_other_is_upgraded() {
        let records = vec![
            UpdateRecord::new("Vendor Tool", "Vendor.Tool", "1.0", "1.1"),
            other_app(),
        ];
        let policy = Policy::new(ListMode::Deny, ["Vendor.Tool"]);
        let manager = ScriptedManager::new(vec![Ok(Vec::new())]);
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert_eq!(summary.succeeded, 1);
        assert_eq!(
            summary.skipped,
            vec![("Vendor.Tool".to_string(), SkipReason::ExcludedByPolicy)]
        );
        assert_eq!(*manager.upgrades.borrow(), vec!["Other.App".to_string()]);
        assert!(manager.installs.borrow().is_empty());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.tag == "Other.App"));
        assert_eq!(events[0].severity, Severity::Info);
        assert_eq!(events[1].severity, Severity::Success);
    }

    #[tokio::test]
    async fn unknown_version_is_never_upgraded_even_when_allowed() {
        let records = vec![UpdateRecord::new("Legacy", "Vendor.Legacy", "Unknown", "4.2")];
        let policy = Policy::new(ListMode::Allow, ["Vendor.Legacy"]);
        let manager = ScriptedManager::new(Vec::new());
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert!(manager.upgrades.borrow().is_empty());
        assert_eq!(summary.skipped[0].1, SkipReason::UnknownVersion);
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn allow_list_skips_unlisted_ids() {
        let records = vec![other_app()];
        let policy = Policy::new(ListMode::Allow, ["Vendor.Tool"]);
        let manager = ScriptedManager::new(Vec::new());
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert_eq!(summary.succeeded, 0);
        assert!(summary.attempts.is_empty());
        assert!(manager.upgrades.borrow().is_empty());
    }

    #[tokio::test]
    async fn fallback_install_runs_once_and_can_rescue_the_attempt() {
        let records = vec![other_app()];
        let policy = Policy::new(ListMode::Deny, Vec::<String>::new());
        let manager = ScriptedManager::new(vec![Ok(vec![other_app()]), Ok(Vec::new())]);
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert_eq!(*manager.installs.borrow(), vec!["Other.App".to_string()]);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(
            summary.attempts[0].classification,
            UpgradeClassification::Succeeded
        );
        assert!(summary.attempts[0].fallback_install.is_some());
    }

    #[tokio::test]
    async fn still_outdated_after_fallback_is_a_failure() {
        let records = vec![other_app()];
        let policy = Policy::new(ListMode::Deny, Vec::<String>::new());
        let manager = ScriptedManager::new(vec![Ok(vec![other_app()]), Ok(vec![other_app()])]);
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert_eq!(manager.installs.borrow().len(), 1);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failed_ids(), vec!["Other.App"]);
        let events = sink.events();
        assert_eq!(events.last().unwrap().severity, Severity::Error);
        assert_eq!(events.last().unwrap().tag, "Other.App");
    }

    #[tokio::test]
    async fn unverifiable_upgrade_is_not_counted() {
        let records = vec![other_app()];
        let policy = Policy::new(ListMode::Deny, Vec::<String>::new());
        let manager = ScriptedManager::new(vec![
            Err(WauError::ToolNotFound {
                tool: "winget".into(),
            }),
            Err(WauError::ToolNotFound {
                tool: "winget".into(),
            }),
        ]);
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert_eq!(summary.succeeded, 0);
        assert_eq!(manager.installs.borrow().len(), 1);
    }

    #[tokio::test]
    async fn each_record_gets_exactly_one_terminal_notification() {
        let records = vec![
            UpdateRecord::new("A", "Vendor.A", "1", "2"),
            UpdateRecord::new("B", "Vendor.B", "1", "2"),
        ];
        let policy = Policy::new(ListMode::Deny, Vec::<String>::new());
        // A: upgrade fails, install fails. B: upgrade succeeds.
        let manager = ScriptedManager::new(vec![
            Ok(vec![records[0].clone(), records[1].clone()]),
            Ok(vec![records[0].clone(), records[1].clone()]),
            Ok(vec![records[0].clone()]),
        ]);
        let sink = RecordingSink::default();

        let summary = drive(&manager, &sink, &records, &policy).await;

        assert_eq!(summary.succeeded, 1);
        let terminal: Vec<(String, Severity)> = sink
            .events()
            .into_iter()
            .filter(|event| event.severity != Severity::Info)
            .map(|event| (event.tag, event.severity))
            .collect();
        assert_eq!(
            terminal,
            vec![
                ("Vendor.A".to_string(), Severity::Error),
                ("Vendor.B".to_string(), Severity::Success),
            ]
        );
    }
}
