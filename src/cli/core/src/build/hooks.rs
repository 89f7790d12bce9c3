/* src/cli/core/src/build/hooks.rs */

use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::HooksSection;
use crate::shell::{pipe_command, run_command};

/// Lifecycle hooks around each page. A `None` (or empty) result keeps the HTML as is.
#[async_trait]
pub trait RenderHooks: Send + Sync {
  /// May replace the shell template used for `path`.
  async fn before_page_render(&self, _path: &str, _index_html: &str) -> Result<Option<String>> {
    Ok(None)
  }

  /// May replace the serialized page before critical CSS and formatting.
  async fn page_rendered(&self, _path: &str, _html: &str) -> Result<Option<String>> {
    Ok(None)
  }

  /// Runs once after every page was written.
  async fn finished(&self) -> Result<()> {
    Ok(())
  }
}

pub struct NoopHooks;

impl RenderHooks for NoopHooks {}

/// Hooks backed by the shell commands of the `[hooks]` section.
pub struct CommandHooks {
  base_dir: PathBuf,
  section: HooksSection,
}

impl CommandHooks {
  pub fn new(base_dir: PathBuf, section: HooksSection) -> Self {
    Self { base_dir, section }
  }

  async fn pipe(&self, command: Option<&str>, label: &str, path: &str, html: &str) -> Result<Option<String>> {
    let Some(command) = command else {
      return Ok(None);
    };
    let out = pipe_command(&self.base_dir, command, label, &[("SSG_ROUTE", path)], html).await?;
    Ok(if out.trim().is_empty() { None } else { Some(out) })
  }
}

#[async_trait]
impl RenderHooks for CommandHooks {
  async fn before_page_render(&self, path: &str, index_html: &str) -> Result<Option<String>> {
    self.pipe(self.section.on_before_page_render.as_deref(), "on_before_page_render", path, index_html).await
  }

  async fn page_rendered(&self, path: &str, html: &str) -> Result<Option<String>> {
    self.pipe(self.section.on_page_rendered.as_deref(), "on_page_rendered", path, html).await
  }

  async fn finished(&self) -> Result<()> {
    match self.section.on_finished.as_deref() {
      Some(command) => run_command(&self.base_dir, command, "on_finished", &[]).await,
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn hooks(dir: &std::path::Path, section: HooksSection) -> CommandHooks {
    CommandHooks::new(dir.to_path_buf(), section)
  }

  #[tokio::test]
  async fn noop_hooks_change_nothing() {
    assert!(NoopHooks.before_page_render("/", "<html>").await.unwrap().is_none());
    assert!(NoopHooks.page_rendered("/", "<html>").await.unwrap().is_none());
    assert!(NoopHooks.finished().await.is_ok());
  }

  #[tokio::test]
  async fn page_hook_replaces_html() {
    let dir = tempfile::tempdir().unwrap();
    let section = HooksSection {
      on_page_rendered: Some("sed \"s|</body>|<!-- $SSG_ROUTE --></body>|\"".into()),
      ..Default::default()
    };
    let out = hooks(dir.path(), section).page_rendered("/about", "<body></body>").await.unwrap();
    assert_eq!(out.as_deref().map(str::trim), Some("<body><!-- /about --></body>"));
  }

  #[tokio::test]
  async fn empty_output_keeps_html() {
    let dir = tempfile::tempdir().unwrap();
    let section = HooksSection { on_before_page_render: Some("cat > /dev/null".into()), ..Default::default() };
    assert!(hooks(dir.path(), section).before_page_render("/", "<html>").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn finished_hook_runs_in_base_dir() {
    let dir = tempfile::tempdir().unwrap();
    let section = HooksSection { on_finished: Some("touch finished.txt".into()), ..Default::default() };
    hooks(dir.path(), section).finished().await.unwrap();
    assert!(dir.path().join("finished.txt").is_file());
  }

  #[tokio::test]
  async fn failing_hook_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let section = HooksSection { on_page_rendered: Some("exit 2".into()), ..Default::default() };
    let err = hooks(dir.path(), section).page_rendered("/", "<html>").await.unwrap_err();
    assert!(err.to_string().contains("on_page_rendered"));
  }
}
