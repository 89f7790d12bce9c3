/* src/cli/core/src/bundler.rs */

// Client and server bundling, delegated to the project's own build commands.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{BundlerSection, ModuleFormat};
use crate::shell::run_command;

/// Client build: assets plus `manifest.json`, `ssr-manifest.json` and the
/// rendered `index.html` shell in `out_dir`.
#[derive(Debug, Clone, Copy)]
pub struct ClientJob<'a> {
  pub root: &'a Path,
  pub out_dir: &'a Path,
  pub mode: &'a str,
}

/// Server build: `entry` bundled for Node into `out_dir`, named
/// `<entry stem>.<format extension>`.
#[derive(Debug, Clone, Copy)]
pub struct ServerJob<'a> {
  pub root: &'a Path,
  pub entry: &'a str,
  pub out_dir: &'a Path,
  pub format: ModuleFormat,
  pub mode: &'a str,
}

impl ServerJob<'_> {
  /// Where the server bundle is expected once the build succeeded.
  pub fn bundle_path(&self) -> PathBuf {
    let stem = Path::new(self.entry).file_stem().and_then(|s| s.to_str()).unwrap_or("main");
    self.out_dir.join(format!("{stem}.{}", self.format.extension()))
  }
}

#[async_trait]
pub trait Bundler: Send + Sync {
  async fn build_client(&self, job: ClientJob<'_>) -> Result<()>;

  async fn build_server(&self, job: ServerJob<'_>) -> Result<()>;

  /// Rebuild the service worker against the written pages. Returns whether
  /// anything ran.
  async fn regenerate_service_worker(&self, _root: &Path, _out_dir: &Path) -> Result<bool> {
    Ok(false)
  }
}

/// Runs the shell commands from `[bundler]` with the job in the environment.
pub struct CommandBundler {
  section: BundlerSection,
}

impl CommandBundler {
  pub fn new(section: BundlerSection) -> Self {
    Self { section }
  }
}

fn lossy(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[async_trait]
impl Bundler for CommandBundler {
  async fn build_client(&self, job: ClientJob<'_>) -> Result<()> {
    let out_dir = lossy(job.out_dir);
    let envs = [
      ("SSG_PHASE", "client"),
      ("SSG_OUT_DIR", out_dir.as_str()),
      ("SSG_MODE", job.mode),
      ("VITE_SSG", "true"),
    ];
    run_command(job.root, &self.section.client_command, "client bundler", &envs).await
  }

  async fn build_server(&self, job: ServerJob<'_>) -> Result<()> {
    let out_dir = lossy(job.out_dir);
    let envs = [
      ("SSG_PHASE", "server"),
      ("SSG_OUT_DIR", out_dir.as_str()),
      ("SSG_ENTRY", job.entry),
      ("SSG_FORMAT", job.format.as_str()),
      ("SSG_MODE", job.mode),
      ("VITE_SSG", "true"),
    ];
    run_command(job.root, &self.section.server_command, "server bundler", &envs).await
  }

  async fn regenerate_service_worker(&self, root: &Path, out_dir: &Path) -> Result<bool> {
    let Some(command) = self.section.sw_command.as_deref() else {
      return Ok(false);
    };
    let out_dir = lossy(out_dir);
    let envs = [("SSG_PHASE", "sw"), ("SSG_OUT_DIR", out_dir.as_str()), ("VITE_SSG", "true")];
    run_command(root, command, "service worker", &envs).await?;
    Ok(true)
  }
}
