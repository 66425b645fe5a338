/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::runner
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Orchestrate one scheduled run: connectivity gate, agent
    self-update, package listing and the upgrade loop.

  Security / Safety Notes:
    Runs as SYSTEM from the scheduled task. Every step below the
    configuration load handles its own failures so a run always
    reaches its closing log line.

  Dependencies:
    crate modules only.

  Operational Scope:
    `wau run` and `wau list`.

  Revision History:
    2026-09-27 COD  Authored run orchestration.
    2026-10-03 COD  Log rotation and `.old` cleanup at start-up.
    2026-10-17 COD  Run sequence generic over probe, package
                    manager and notification sink.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Explicit context instead of process-wide state
    - Successful self-update as the only early exit
============================================================*/

use std::path::{Path, PathBuf};

use crate::config::{AboutRecord, ListMode, WauConfig};
use crate::driver::{UpgradeDriver, UpgradeSummary};
use crate::error::Result;
use crate::locale::{detect_locale_tag, Locale, MessageKind, TemplateArgs};
use crate::logger::{rotate_if_needed, Logger};
use crate::mods::Mods;
use crate::network::{wait_for_connectivity, ConnectivityProbe, HttpProbe};
use crate::notify::{NotificationEvent, NotificationSink, Notifier, Severity};
use crate::package_info::UpdateRecord;
use crate::paths::AgentPaths;
use crate::policy::Policy;
use crate::self_update::{cleanup_stale_old, SelfUpdater};
use crate::winget::{PackageManager, Winget};

/// Everything a command needs, resolved once at start-up.
pub struct AgentContext {
    pub paths: AgentPaths,
    pub config: WauConfig,
    pub logger: Logger,
}

impl AgentContext {
    /// Resolve the install root, load configuration, rotate the log and open it.
    pub fn load(
        root: Option<&Path>,
        config_path: Option<&Path>,
        log_path: Option<PathBuf>,
        verbose: bool,
    ) -> Result<Self> {
        let paths = AgentPaths::resolve(root)?;
        let config = match config_path {
            Some(path) => WauConfig::load(path)?,
            None => WauConfig::load_from_optional_path(Some(&paths.config_file()))?,
        };

        let log_path = log_path.unwrap_or_else(|| paths.log_file());
        let rotation = rotate_if_needed(
            &log_path,
            config.logging.max_size_bytes,
            config.logging.max_files,
        );
        let logger = Logger::new(Some(log_path), verbose)?;
        match rotation {
            Ok(true) => logger.debug("LOG", "Rotated oversized log"),
            Ok(false) => {}
            Err(err) => logger.warn("LOG", format!("Log rotation failed: {err}")),
        }

        Ok(Self {
            paths,
            config,
            logger,
        })
    }

    pub fn policy(&self) -> Result<Policy> {
        Policy::load(self.config.list_mode, &self.config.list_file(&self.paths))
    }

    fn winget(&self) -> Result<Winget> {
        Winget::locate(
            self.config.winget_path.as_deref(),
            &self.config.winget_source,
        )
    }

    async fn locale(&self) -> Locale {
        let tag = detect_locale_tag(self.config.locale.as_deref()).await;
        match Locale::load(&self.paths.locale_dir(), &tag) {
            Ok(locale) => {
                self.logger
                    .debug("LOCALE", format!("Using templates for `{}`", locale.tag()));
                locale
            }
            Err(err) => {
                self.logger.warn(
                    "LOCALE",
                    format!("Templates for `{tag}` unusable ({err}); using English"),
                );
                Locale::english()
            }
        }
    }
}

/// How a scheduled run ended.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(UpgradeSummary),
    /// New agent files are in place and the task has been re-triggered.
    SelfUpdated,
    Offline,
    WingetUnavailable,
    ListingFailed,
}

/// The scheduled update routine.
pub async fn run(ctx: &AgentContext) -> Result<RunOutcome> {
    let logger = &ctx.logger;
    logger.info(
        "INIT",
        format!(
            "Winget-AutoUpdate {} starting in {}",
            env!("CARGO_PKG_VERSION"),
            ctx.paths.root().display()
        ),
    );

    let stale = cleanup_stale_old(ctx.paths.root(), logger);
    if stale > 0 {
        logger.debug("INIT", format!("Removed {stale} leftover files"));
    }

    let locale = ctx.locale().await;
    let notifier = Notifier::new(ctx.paths.clone(), ctx.config.notification_level, logger);
    let probe = HttpProbe::new(&ctx.config.network)?;

    run_with(ctx, &probe, &notifier, &locale, || {
        let winget = ctx.winget()?;
        logger.debug(
            "WINGET",
            format!("Using {}", winget.executable().display()),
        );
        Ok(winget)
    })
    .await
}

/// Run sequence behind [`run`]. `locate` is called only once the agent is
/// online and has not replaced itself.
pub async fn run_with<C, P, N, L>(
    ctx: &AgentContext,
    probe: &C,
    notifier: &N,
    locale: &Locale,
    locate: L,
) -> Result<RunOutcome>
where
    C: ConnectivityProbe,
    P: PackageManager,
    N: NotificationSink,
    L: FnOnce() -> Result<P>,
{
    let logger = &ctx.logger;
    if !wait_for_connectivity(probe, notifier, locale, logger, &ctx.config.network).await {
        logger.info("COMPLETE", "Run ended without connectivity");
        return Ok(RunOutcome::Offline);
    }

    if ctx.config.auto_update_enabled {
        let about = AboutRecord::load_or_current(&ctx.paths.about_file()).unwrap_or_else(|err| {
            logger.warn("SELFUPDATE", format!("{err}; assuming compiled version"));
            AboutRecord::current()
        });
        let updater = SelfUpdater::new(&ctx.config, &ctx.paths, notifier, locale, logger)?;
        if updater.check_and_apply_self_update(&about.version).await {
            logger.info("COMPLETE", "Agent updated; the next run uses the new version");
            return Ok(RunOutcome::SelfUpdated);
        }
    } else {
        logger.debug("SELFUPDATE", "Agent self-update disabled");
    }

    let policy = ctx.policy()?;
    logger.info(
        "POLICY",
        format!("{} list with {} entries", policy.mode(), policy.len()),
    );
    if policy.mode() == ListMode::Allow && policy.is_empty() {
        logger.warn("POLICY", "Allow list is empty; every package will be skipped");
    }

    let manager = match locate() {
        Ok(manager) => manager,
        Err(err) => {
            logger.error("WINGET", err.to_string());
            notifier
                .notify(NotificationEvent::from_template(
                    locale,
                    MessageKind::WingetMissing,
                    &TemplateArgs::new(),
                    Severity::Error,
                    "winget",
                ))
                .await;
            return Ok(RunOutcome::WingetUnavailable);
        }
    };
    match manager.accept_source_agreements().await {
        Ok(outcome) if !outcome.success() => logger.warn(
            "WINGET",
            format!(
                "Source agreement step exited with status {}",
                outcome.status_label()
            ),
        ),
        Ok(_) => {}
        Err(err) => logger.warn("WINGET", format!("Source agreement step failed: {err}")),
    }

    let records = match manager.list_outdated().await {
        Ok(records) => records,
        Err(err) => {
            logger.error("WINGET", format!("Listing outdated packages failed: {err}"));
            return Ok(RunOutcome::ListingFailed);
        }
    };
    logger.info(
        "LIST",
        format!("{} packages have updates available", records.len()),
    );

    let mods = Mods::new(ctx.config.mods_dir(&ctx.paths));
    let summary = UpgradeDriver::new(&manager, notifier, locale, logger, &mods)
        .apply_updates(&records, &policy)
        .await;

    logger.info(
        "COMPLETE",
        format!("Run finished; {} packages updated", summary.succeeded),
    );
    Ok(RunOutcome::Completed(summary))
}

/// Outdated packages as winget reports them, without changing anything.
pub async fn list(ctx: &AgentContext) -> Result<Vec<UpdateRecord>> {
    let winget = ctx.winget()?;
    winget.accept_source_agreements().await?;
    winget.list_outdated().await
}

#[cfg(test)]
mod tests {
    use std::fs;

    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::error::WauError;
    use crate::notify::testing::RecordingSink;
    use crate::package_info::CommandOutcome;
    use tempfile::TempDir;

    struct FixedProbe(bool);

    impl ConnectivityProbe for FixedProbe {
        async fn probe(&self) -> bool {
            self.0
        }
    }

    struct QueuedManager {
        listings: RefCell<VecDeque<Result<Vec<UpdateRecord>>>>,
        upgrades: Rc<RefCell<Vec<String>>>,
    }

    impl QueuedManager {
        fn new(listings: Vec<Result<Vec<UpdateRecord>>>) -> Self {
            Self {
                listings: RefCell::new(listings.into()),
                upgrades: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl PackageManager for QueuedManager {
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

        async fn install(&self, _id: &str, _logger: &Logger) -> Result<CommandOutcome> {
            Ok(CommandOutcome::new(Some(0), ""))
        }
    }

    fn offline_context(dir: &TempDir) -> AgentContext {
        let mut config = WauConfig::default();
        config.auto_update_enabled = false;
        config.network.timeout_secs = 0;
        AgentContext {
            paths: AgentPaths::new(dir.path()),
            config,
            logger: Logger::console(false),
        }
    }

    fn tool() -> UpdateRecord {
        UpdateRecord::new("Vendor Tool", "Vendor.Tool", "1.0", "1.1")
    }

    #[tokio::test]
    async fn offline_run_never_reaches_winget() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir);
        let sink = RecordingSink::default();
        let located = Cell::new(false);

        let outcome = run_with(&ctx, &FixedProbe(false), &sink, &Locale::english(), || {
            located.set(true);
            Ok(QueuedManager::new(vec![Ok(vec![tool()])]))
        })
        .await
        .unwrap();

        assert!(matches!(outcome, RunOutcome::Offline));
        assert!(!located.get());
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Error);
        assert_eq!(events[0].tag, "network");
    }

    #[tokio::test]
    async fn missing_winget_notifies_and_stops() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir);
        let sink = RecordingSink::default();

        let outcome = run_with(&ctx, &FixedProbe(true), &sink, &Locale::english(), || {
            Err::<QueuedManager, _>(WauError::ToolNotFound {
                tool: "winget".into(),
            })
        })
        .await
        .unwrap();

        assert!(matches!(outcome, RunOutcome::WingetUnavailable));
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].severity, Severity::Error);
        assert_eq!(events[0].tag, "winget");
    }

    #[tokio::test]
    async fn failed_listing_upgrades_nothing() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir);
        let sink = RecordingSink::default();
        let manager = QueuedManager::new(vec![Err(WauError::Serialization(
            "no table".into(),
        ))]);
        let upgrades = Rc::clone(&manager.upgrades);

        let outcome = run_with(&ctx, &FixedProbe(true), &sink, &Locale::english(), || {
            Ok(manager)
        })
        .await
        .unwrap();

        assert!(matches!(outcome, RunOutcome::ListingFailed));
        assert!(upgrades.borrow().is_empty());
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn online_run_upgrades_listed_packages() {
        let dir = TempDir::new().unwrap();
        let ctx = offline_context(&dir);
        let sink = RecordingSink::default();

        let outcome = run_with(&ctx, &FixedProbe(true), &sink, &Locale::english(), || {
            Ok(QueuedManager::new(vec![Ok(vec![tool()]), Ok(Vec::new())]))
        })
        .await
        .unwrap();

        match outcome {
            RunOutcome::Completed(summary) => {
                assert_eq!(summary.succeeded, 1);
                assert!(summary.failed_ids().is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        let events = sink.events();
        assert_eq!(events.last().unwrap().severity, Severity::Success);
        assert_eq!(events.last().unwrap().tag, "Vendor.Tool");
    }

    #[test]
    fn context_reads_config_from_root_and_rotates_log() {
        let dir = TempDir::new().unwrap();
        let paths = AgentPaths::new(dir.path());
        fs::write(
            paths.config_file(),
            "list_mode = \"allow\"\n[logging]\nmax_size_bytes = 4\nmax_files = 2\n",
        )
        .unwrap();
        fs::create_dir_all(paths.log_dir()).unwrap();
        fs::write(paths.log_file(), "previous run\n").unwrap();
        fs::write(paths.allow_list(), "Vendor.Tool\n").unwrap();

        let ctx = AgentContext::load(Some(dir.path()), None, None, false).unwrap();

        assert_eq!(ctx.config.list_mode, ListMode::Allow);
        assert_eq!(ctx.logger.path(), Some(paths.log_file().as_path()));
        assert_eq!(
            fs::read_to_string(paths.log_dir().join("updates.log.1")).unwrap(),
            "previous run\n"
        );
        let policy = ctx.policy().unwrap();
        assert_eq!(policy.mode(), ListMode::Allow);
        assert!(!policy.excludes("Vendor.Tool"));
        assert!(policy.excludes("Other.App"));
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nowhere.toml");
        let result = AgentContext::load(Some(dir.path()), Some(&missing), None, false);
        assert!(matches!(result, Err(crate::error::WauError::Config(_))));
    }
}
