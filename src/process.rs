/*============================================================
  Synavera Project: Syn-Wau
  Module: wau_core::process
  Etiquette: Synavera Script Etiquette — Rust Profile v1.1.1
  ------------------------------------------------------------
  Purpose:
    Run external commands (winget, schtasks, powershell) and
    hand back their exit status and text output.

  Security / Safety Notes:
    Arguments are passed as a vector, never through a shell
    string, so package ids cannot inject commands.

  Dependencies:
    tokio::process for async command execution.

  Operational Scope:
    Every subprocess launched by Syn-Wau goes through here.
    No timeout is applied: callers wait for the child to exit.

  Revision History:
    2026-09-14 COD  Extracted command helpers from the lister.
    2026-09-21 COD  Added line streaming for upgrade output.
  ------------------------------------------------------------
  SSE Principles Observed:
    - Deterministic command invocation with explicit checks
    - Structured results instead of inferred success
    - Reusable helpers for external command diagnostics
============================================================*/

use std::ffi::OsStr;
use std::io;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::error::{Result, WauError};
use crate::package_info::CommandOutcome;

/// Run `program` to completion and capture stdout followed by stderr.
pub async fn run_capture<P, I, S>(program: P, args: I) -> Result<CommandOutcome>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let program = program.as_ref();
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|err| map_spawn_error(err, program))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    Ok(CommandOutcome::new(output.status.code(), text))
}

/// Run `program`, handing each cleaned stdout line to `on_line` as it arrives.
///
/// Console redraw residue (text before a carriage return, spinner frames and
/// progress bars) is dropped from both the callback and the captured output.
pub async fn run_streaming<P, I, S, F>(program: P, args: I, mut on_line: F) -> Result<CommandOutcome>
where
    P: AsRef<OsStr>,
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
    F: FnMut(&str),
{
    let program = program.as_ref();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| map_spawn_error(err, program))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| WauError::Runtime("Child stdout was not captured".into()))?;
    let mut stderr = child
        .stderr
        .take()
        .ok_or_else(|| WauError::Runtime("Child stderr was not captured".into()))?;

    let stderr_task = tokio::spawn(async move {
        let mut buffer = Vec::new();
        stderr.read_to_end(&mut buffer).await.map(|_| buffer)
    });

    let mut reader = BufReader::new(stdout);
    let mut captured = String::new();
    let mut raw = Vec::new();
    loop {
        raw.clear();
        if reader.read_until(b'\n', &mut raw).await? == 0 {
            break;
        }
        let decoded = String::from_utf8_lossy(&raw);
        let line = strip_redraw(&decoded).trim_end();
        if line.trim().is_empty() || is_progress_noise(line) {
            continue;
        }
        on_line(line);
        captured.push_str(line);
        captured.push('\n');
    }

    let status = child.wait().await?;
    let stderr_bytes = stderr_task
        .await
        .map_err(|err| WauError::Runtime(format!("stderr reader failed: {err}")))??;
    let stderr_text = String::from_utf8_lossy(&stderr_bytes);
    for line in stderr_text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            continue;
        }
        on_line(line);
        captured.push_str(line);
        captured.push('\n');
    }

    Ok(CommandOutcome::new(status.code(), captured))
}

/// Keep only the text after the last carriage return: consoles redraw
/// spinners and progress bars in place.
pub fn strip_redraw(line: &str) -> &str {
    let line = line.trim_end_matches(['\r', '\n']);
    line.rsplit('\r').next().unwrap_or(line)
}

/// Spinner frames and block-character progress bars.
pub fn is_progress_noise(line: &str) -> bool {
    let trimmed = line.trim();
    matches!(trimmed, "-" | "\\" | "|" | "/")
        || trimmed.contains('█')
        || trimmed.contains('▒')
}

/// Translate spawn failures into the crate taxonomy.
pub fn map_spawn_error(err: io::Error, program: &OsStr) -> WauError {
    let command = program.to_string_lossy().into_owned();
    if err.kind() == io::ErrorKind::NotFound {
        WauError::ToolNotFound { tool: command }
    } else {
        WauError::Runtime(format!("Failed to spawn {command}: {err}"))
    }
}
