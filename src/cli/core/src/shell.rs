/* src/cli/core/src/shell.rs */

// Shell command helpers shared by the bundler and the page hooks.

use std::path::Path;
use std::process::{Output, Stdio};

use anyhow::{Context, Result, bail};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::ui;

fn sh(base_dir: &Path, command: &str, envs: &[(&str, &str)]) -> Command {
  let mut cmd = Command::new("sh");
  cmd.args(["-c", command]).current_dir(base_dir).kill_on_drop(true);
  for (key, value) in envs {
    cmd.env(key, value);
  }
  cmd
}

/// Bail with both output streams when the command did not succeed.
fn check_status(output: &Output, label: &str) -> Result<()> {
  if output.status.success() {
    return Ok(());
  }
  let stdout = String::from_utf8_lossy(&output.stdout);
  let stderr = String::from_utf8_lossy(&output.stderr);
  let mut msg = format!("{label} exited with status {}", output.status);
  if !stderr.is_empty() {
    msg.push('\n');
    msg.push_str(&stderr);
  }
  if !stdout.is_empty() {
    msg.push('\n');
    msg.push_str(&stdout);
  }
  bail!("{msg}");
}

/// Run a shell command, bail on failure (shows both stdout and stderr on error).
pub(crate) async fn run_command(
  base_dir: &Path,
  command: &str,
  label: &str,
  envs: &[(&str, &str)],
) -> Result<()> {
  ui::command(command);
  let output = sh(base_dir, command, envs)
    .stdin(Stdio::null())
    .output()
    .await
    .with_context(|| format!("failed to run {label}"))?;
  check_status(&output, label)
}

/// Run a shell command with `input` on stdin and return its stdout.
pub(crate) async fn pipe_command(
  base_dir: &Path,
  command: &str,
  label: &str,
  envs: &[(&str, &str)],
  input: &str,
) -> Result<String> {
  tracing::debug!(%command, label, "piping through shell command");
  let mut child = sh(base_dir, command, envs)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .with_context(|| format!("failed to run {label}"))?;

  // Feed stdin from its own task so a command filling its stdout pipe cannot
  // stall the write.
  let stdin = child.stdin.take();
  let input = input.to_owned();
  let writer = tokio::spawn(async move {
    match stdin {
      Some(mut stdin) => stdin.write_all(input.as_bytes()).await,
      None => Ok(()),
    }
  });

  let output = child.wait_with_output().await.with_context(|| format!("failed to wait for {label}"))?;
  // A command that ignores stdin may close it early; its exit status decides.
  if let Ok(Err(e)) = writer.await {
    tracing::debug!(label, error = %e, "stdin closed early");
  }
  check_status(&output, label)?;
  String::from_utf8(output.stdout).with_context(|| format!("{label} wrote non-UTF-8 output"))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn failing_command_reports_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_command(dir.path(), "echo boom >&2; exit 3", "hook", &[]).await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("hook exited with status"));
    assert!(msg.contains("boom"));
  }

  #[tokio::test]
  async fn envs_are_visible() {
    let dir = tempfile::tempdir().unwrap();
    let out = pipe_command(dir.path(), "printf %s \"$SSG_ROUTE\"", "hook", &[("SSG_ROUTE", "/about")], "")
      .await
      .unwrap();
    assert_eq!(out, "/about");
  }

  #[tokio::test]
  async fn stdin_is_piped() {
    let dir = tempfile::tempdir().unwrap();
    let out = pipe_command(dir.path(), "tr a-z A-Z", "hook", &[], "<p>hi</p>").await.unwrap();
    assert_eq!(out, "<P>HI</P>");
  }
}
