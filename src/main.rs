/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::main
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Entry point for Syn-Wau, the winget auto-update agent.
    Dispatches the scheduled run, the notification helper and
    install/uninstall housekeeping.

  Security / Safety Notes:
    `run` is expected under SYSTEM via the scheduled task;
    `install`/`uninstall` require elevation; `notify` runs as
    the interactive user.

  Dependencies:
    clap for CLI parsing, serde_json for `list --json`.

  Operational Scope:
    Invoked by the task scheduler or by an administrator.

  Revision History:
    2026-09-20 COD  Authored Syn-Wau runtime.
    2026-09-26 COD  Added install/uninstall commands.
    2026-10-17 COD  Install reuses the installed config.toml.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Result-first error handling with deterministic exits
    - Structured logging following Synavera cadence
    - Configurable execution via CLI and config file
============================================================*/

mod config;
mod driver;
mod error;
mod installer;
mod locale;
mod logger;
mod mods;
mod network;
mod notify;
mod package_info;
mod paths;
mod policy;
mod process;
mod registry;
mod runner;
mod scheduler;
mod self_update;
mod winget;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

use config::{ListMode, NotificationLevel};
use driver::skip_reason;
use error::{Result, WauError};
use installer::InstallOptions;
use logger::Logger;
use package_info::UpdateRecord;
use paths::AgentPaths;
use policy::Policy;
use runner::{AgentContext, RunOutcome};

/// Command-line arguments for Syn-Wau.
#[derive(Debug, Parser)]
#[command(
    name = "wau",
    version,
    author = "Synavera Systems",
    about = "Unattended winget package updates"
)]
struct Cli {
    /// Override the install root.
    #[arg(long, value_name = "PATH", global = true)]
    root: Option<PathBuf>,
    /// Override configuration file path.
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Explicit log file path.
    #[arg(long, value_name = "PATH", global = true)]
    log: Option<PathBuf>,
    /// Echo debug entries to the console.
    #[arg(long, action = ArgAction::SetTrue, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Check connectivity, update the agent, then upgrade outdated packages.
    Run,
    /// Show outdated packages and whether the list policy would skip them.
    List {
        /// Emit JSON instead of a table.
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// Display the notification queued by a background run.
    Notify,
    /// Install the agent and register its scheduled tasks.
    Install(InstallArgs),
    /// Remove scheduled tasks, registry entries and the install root.
    Uninstall {
        /// Keep the logs directory.
        #[arg(long, action = ArgAction::SetTrue)]
        keep_logs: bool,
    },
}

#[derive(Debug, clap::Args)]
struct InstallArgs {
    /// Treat the list file as an allow list instead of a deny list.
    #[arg(long, action = ArgAction::SetTrue)]
    use_allow_list: bool,
    /// List file to copy into the install root.
    #[arg(long, value_name = "PATH")]
    list: Option<PathBuf>,
    /// Notification level: full, success-only or none.
    #[arg(long, value_name = "LEVEL")]
    notification_level: Option<NotificationLevel>,
    /// Disable agent self-update.
    #[arg(long, action = ArgAction::SetTrue)]
    disable_auto_update: bool,
    /// Accept pre-release agent versions.
    #[arg(long, action = ArgAction::SetTrue)]
    allow_prerelease: bool,
    /// Start an update run right after installing.
    #[arg(long, action = ArgAction::SetTrue)]
    run_now: bool,
}

#[tokio::main]
async fn main() {
    let code = match dispatch().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("[Syn-Wau] {err}");
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn dispatch() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run => {
            let ctx = AgentContext::load(
                cli.root.as_deref(),
                cli.config.as_deref(),
                cli.log,
                cli.verbose,
            )?;
            if let RunOutcome::Completed(summary) = runner::run(&ctx).await? {
                let failed = summary.failed_ids();
                if !failed.is_empty() {
                    ctx.logger
                        .warn("SUMMARY", format!("Not updated: {}", failed.join(", ")));
                }
            }
            Ok(0)
        }
        Command::List { json } => {
            let ctx = AgentContext::load(
                cli.root.as_deref(),
                cli.config.as_deref(),
                cli.log,
                cli.verbose,
            )?;
            let policy = ctx.policy()?;
            let records = runner::list(&ctx).await?;
            if json {
                let text = serde_json::to_string_pretty(&records).map_err(|err| {
                    WauError::Serialization(format!("Failed to encode listing: {err}"))
                })?;
                println!("{text}");
            } else {
                print_listing(&records, &policy);
            }
            Ok(0)
        }
        Command::Notify => {
            let paths = AgentPaths::resolve(cli.root.as_deref())?;
            let logger = Logger::new(cli.log, cli.verbose)?;
            notify::display_queued(&paths, &logger).await?;
            Ok(0)
        }
        Command::Install(args) => {
            let paths = AgentPaths::resolve(cli.root.as_deref())?;
            let mut config = installer::install_config(&paths, cli.config.as_deref())?;
            if args.use_allow_list {
                config.list_mode = ListMode::Allow;
            }
            if args.disable_auto_update {
                config.auto_update_enabled = false;
            }
            config.allow_prerelease |= args.allow_prerelease;
            if let Some(level) = args.notification_level {
                config.notification_level = level;
            }

            let options = InstallOptions {
                config,
                list_file: args.list,
                run_now: args.run_now,
            };
            let log_path = installer::install(&paths, &options, cli.log, cli.verbose).await?;
            println!("→ Install log: {}", log_path.display());
            Ok(0)
        }
        Command::Uninstall { keep_logs } => {
            let paths = AgentPaths::resolve(cli.root.as_deref())?;
            let logger = Logger::console(cli.verbose);
            installer::uninstall(&paths, keep_logs, &logger).await?;
            Ok(0)
        }
    }
}

fn print_listing(records: &[UpdateRecord], policy: &Policy) {
    if records.is_empty() {
        println!("→ No outdated packages.");
        return;
    }
    for record in records {
        let action = match skip_reason(record, policy) {
            None => "update",
            Some(driver::SkipReason::ExcludedByPolicy) => "skip (list)",
            Some(driver::SkipReason::UnknownVersion) => "skip (unknown version)",
        };
        println!(
            "{:<40} {:<40} {:>14} → {:<14} {action}",
            record.name, record.id, record.current_version, record.available_version
        );
    }
    println!(
        "→ {} outdated, {} list with {} entries",
        records.len(),
        policy.mode(),
        policy.len()
    );
}
