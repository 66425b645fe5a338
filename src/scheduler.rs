/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::scheduler
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Describe and register the two scheduled tasks Syn-Wau
    relies on: the SYSTEM update run and the per-user toast
    helper.

  Security / Safety Notes:
    The update task runs as LocalSystem (S-1-5-18); the helper
    runs as the interactive Users group (S-1-5-32-545) with
    least privilege. Task definitions are written to a
    private temp file before registration.

  Dependencies:
    chrono for the trigger start boundary, tempfile for the
    task XML, tokio::process (via process) for schtasks.exe.

  Operational Scope:
    Used by the installer, the uninstaller, the notifier
    (helper trigger) and the self-updater (re-run).

  Revision History:
    2026-09-21 COD  Authored task definitions.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Overlapping runs refused by the scheduler itself
    - Deterministic task XML for review and testing
============================================================*/

use std::io::Write;
use std::path::Path;

use chrono::{Local, NaiveTime};

use crate::config::{ScheduleConfig, ScheduleInterval};
use crate::error::{Result, WauError};
use crate::notify::xml_escape;
use crate::package_info::CommandOutcome;
use crate::process::run_capture;

/// Recurring SYSTEM task running `wau run`.
pub const MAIN_TASK_NAME: &str = "Winget-AutoUpdate";
/// On-demand user task running `wau notify`.
pub const NOTIFY_TASK_NAME: &str = "Winget-AutoUpdate-Notify";

const LOCAL_SYSTEM_SID: &str = "S-1-5-18";
const USERS_GROUP_SID: &str = "S-1-5-32-545";

/// Thin wrapper over `schtasks.exe`.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    program: String,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self {
            program: "schtasks.exe".into(),
        }
    }
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace task `name` from its XML definition.
    pub async fn register(&self, name: &str, xml: &str) -> Result<()> {
        let mut file = tempfile::Builder::new()
            .prefix("wau-task-")
            .suffix(".xml")
            .tempfile()?;
        // schtasks expects UTF-16LE with a byte order mark.
        let mut encoded = vec![0xFF, 0xFE];
        for unit in xml.encode_utf16() {
            encoded.extend_from_slice(&unit.to_le_bytes());
        }
        file.write_all(&encoded)?;
        file.flush()?;

        let path = file.path().to_string_lossy().into_owned();
        let outcome = run_capture(
            &self.program,
            ["/Create", "/TN", name, "/XML", path.as_str(), "/F"],
        )
        .await?;
        expect_success(outcome, format!("schtasks /Create /TN {name}"))
    }

    /// Start task `name` now.
    pub async fn run(&self, name: &str) -> Result<()> {
        let outcome = run_capture(&self.program, ["/Run", "/TN", name]).await?;
        expect_success(outcome, format!("schtasks /Run /TN {name}"))
    }

    /// Remove task `name`. Returns false when it did not exist.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        if !self.exists(name).await? {
            return Ok(false);
        }
        let outcome = run_capture(&self.program, ["/Delete", "/TN", name, "/F"]).await?;
        expect_success(outcome, format!("schtasks /Delete /TN {name}"))?;
        Ok(true)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        let outcome = run_capture(&self.program, ["/Query", "/TN", name]).await?;
        Ok(outcome.success())
    }
}

fn expect_success(outcome: CommandOutcome, command: String) -> Result<()> {
    if outcome.success() {
        Ok(())
    } else {
        Err(WauError::CommandFailure {
            command,
            status: outcome.status.unwrap_or(-1),
            output: outcome.output.trim().to_string(),
        })
    }
}

/// Definition of the recurring update task.
pub fn main_task_xml(executable: &Path, schedule: &ScheduleConfig) -> Result<String> {
    let start = NaiveTime::parse_from_str(schedule.time.trim(), "%H:%M").map_err(|err| {
        WauError::Config(format!("Invalid schedule time `{}`: {err}", schedule.time))
    })?;
    let boundary = Local::now()
        .date_naive()
        .and_time(start)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    let mut triggers = String::new();
    match schedule.interval {
        ScheduleInterval::Daily => triggers.push_str(&format!(
            "    <CalendarTrigger>\n      <StartBoundary>{boundary}</StartBoundary>\n      <Enabled>true</Enabled>\n      <ScheduleByDay>\n        <DaysInterval>1</DaysInterval>\n      </ScheduleByDay>\n    </CalendarTrigger>\n"
        )),
        ScheduleInterval::Weekly => triggers.push_str(&format!(
            "    <CalendarTrigger>\n      <StartBoundary>{boundary}</StartBoundary>\n      <Enabled>true</Enabled>\n      <ScheduleByWeek>\n        <WeeksInterval>1</WeeksInterval>\n        <DaysOfWeek>\n          <Sunday />\n        </DaysOfWeek>\n      </ScheduleByWeek>\n    </CalendarTrigger>\n"
        )),
        ScheduleInterval::Never => {}
    }
    if schedule.on_logon {
        triggers.push_str("    <LogonTrigger>\n      <Enabled>true</Enabled>\n    </LogonTrigger>\n");
    }

    Ok(task_xml(TaskDefinition {
        name: MAIN_TASK_NAME,
        description: "Upgrades outdated winget packages.",
        triggers: &triggers,
        principal: &format!(
            "      <UserId>{LOCAL_SYSTEM_SID}</UserId>\n      <RunLevel>HighestAvailable</RunLevel>\n"
        ),
        instances: "IgnoreNew",
        executable,
        arguments: "run",
    }))
}

/// Definition of the on-demand toast helper task.
pub fn notify_task_xml(executable: &Path) -> String {
    task_xml(TaskDefinition {
        name: NOTIFY_TASK_NAME,
        description: "Shows Winget-AutoUpdate notifications to the logged-on user.",
        triggers: "",
        principal: &format!(
            "      <GroupId>{USERS_GROUP_SID}</GroupId>\n      <RunLevel>LeastPrivilege</RunLevel>\n"
        ),
        instances: "Queue",
        executable,
        arguments: "notify",
    })
}

struct TaskDefinition<'a> {
    name: &'a str,
    description: &'a str,
    triggers: &'a str,
    principal: &'a str,
    instances: &'a str,
    executable: &'a Path,
    arguments: &'a str,
}

fn task_xml(task: TaskDefinition<'_>) -> String {
    let command = xml_escape(&task.executable.display().to_string());
    let working_dir = task
        .executable
        .parent()
        .map(|dir| xml_escape(&dir.display().to_string()))
        .unwrap_or_default();
    let triggers = if task.triggers.is_empty() {
        "  <Triggers />\n".to_string()
    } else {
        format!("  <Triggers>\n{}  </Triggers>\n", task.triggers)
    };

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-16\"?>\n\
         <Task version=\"1.2\" xmlns=\"http://schemas.microsoft.com/windows/2004/02/mit/task\">\n\
         \x20 <RegistrationInfo>\n\
         \x20   <Description>{description}</Description>\n\
         \x20   <URI>\\{name}</URI>\n\
         \x20 </RegistrationInfo>\n\
         {triggers}\
         \x20 <Principals>\n\
         \x20   <Principal id=\"Author\">\n\
         {principal}\
         \x20   </Principal>\n\
         \x20 </Principals>\n\
         \x20 <Settings>\n\
         \x20   <MultipleInstancesPolicy>{instances}</MultipleInstancesPolicy>\n\
         \x20   <DisallowStartIfOnBatteries>false</DisallowStartIfOnBatteries>\n\
         \x20   <StopIfGoingOnBatteries>false</StopIfGoingOnBatteries>\n\
         \x20   <StartWhenAvailable>true</StartWhenAvailable>\n\
         \x20   <ExecutionTimeLimit>PT0S</ExecutionTimeLimit>\n\
         \x20   <Enabled>true</Enabled>\n\
         \x20 </Settings>\n\
         \x20 <Actions Context=\"Author\">\n\
         \x20   <Exec>\n\
         \x20     <Command>{command}</Command>\n\
         \x20     <Arguments>{arguments}</Arguments>\n\
         \x20     <WorkingDirectory>{working_dir}</WorkingDirectory>\n\
         \x20   </Exec>\n\
         \x20 </Actions>\n\
         </Task>\n",
        description = xml_escape(task.description),
        name = xml_escape(task.name),
        principal = task.principal,
        instances = task.instances,
        arguments = task.arguments,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_task_runs_as_system_with_daily_and_logon_triggers() {
        let xml = main_task_xml(
            Path::new("C:/ProgramData/Winget-AutoUpdate/wau.exe"),
            &ScheduleConfig::default(),
        )
        .unwrap();

        assert!(xml.contains(&format!("<UserId>{LOCAL_SYSTEM_SID}</UserId>")));
        assert!(xml.contains("<DaysInterval>1</DaysInterval>"));
        assert!(xml.contains("T06:00:00</StartBoundary>"));
        assert!(xml.contains("<LogonTrigger>"));
        assert!(xml.contains("<MultipleInstancesPolicy>IgnoreNew</MultipleInstancesPolicy>"));
        assert!(xml.contains("<Arguments>run</Arguments>"));
        assert!(xml.contains("<URI>\\Winget-AutoUpdate</URI>"));
    }

    #[test]
    fn never_without_logon_has_no_triggers() {
        let schedule = ScheduleConfig {
            interval: ScheduleInterval::Never,
            on_logon: false,
            ..ScheduleConfig::default()
        };
        let xml = main_task_xml(Path::new("wau.exe"), &schedule).unwrap();
        assert!(xml.contains("<Triggers />"));
        assert!(!xml.contains("CalendarTrigger"));
    }

    #[test]
    fn weekly_schedule_uses_week_trigger() {
        let schedule = ScheduleConfig {
            interval: ScheduleInterval::Weekly,
            time: "22:30".into(),
            on_logon: false,
        };
        let xml = main_task_xml(Path::new("wau.exe"), &schedule).unwrap();
        assert!(xml.contains("<WeeksInterval>1</WeeksInterval>"));
        assert!(xml.contains("T22:30:00</StartBoundary>"));
    }

    #[test]
    fn malformed_time_is_a_config_error() {
        let schedule = ScheduleConfig {
            time: "6am".into(),
            ..ScheduleConfig::default()
        };
        assert!(matches!(
            main_task_xml(Path::new("wau.exe"), &schedule),
            Err(WauError::Config(_))
        ));
    }

    #[test]
    fn notify_task_targets_users_group_on_demand() {
        let xml = notify_task_xml(Path::new("C:/Program Files/WAU & Co/wau.exe"));
        assert!(xml.contains(&format!("<GroupId>{USERS_GROUP_SID}</GroupId>")));
        assert!(xml.contains("<Triggers />"));
        assert!(xml.contains("<Arguments>notify</Arguments>"));
        assert!(xml.contains("WAU &amp; Co"));
    }
}
