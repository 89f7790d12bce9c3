/* src/cli/core/src/build/error.rs */

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
  Client,
  Server,
  ServiceWorker,
}

impl fmt::Display for BuildPhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::Client => "client",
      Self::Server => "server",
      Self::ServiceWorker => "service worker",
    })
  }
}

/// One route that could not be rendered. The message always names the route.
#[derive(Debug, Error)]
#[error("Error on page: {path}\n{cause:#}")]
pub struct RenderError {
  pub path: String,
  pub cause: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("{phase} build failed: {cause:#}")]
  Bundler { phase: BuildPhase, cause: anyhow::Error },

  #[error("failed to load server entry {}: {cause:#}", .path.display())]
  ServerEntry { path: PathBuf, cause: anyhow::Error },

  #[error("route discovery failed at {route}: {cause:#}")]
  Discovery { route: String, cause: anyhow::Error },

  #[error("failed to read {}: {cause:#}", .path.display())]
  Manifest { path: PathBuf, cause: anyhow::Error },

  #[error("{} of {total} pages failed to render\n{}", .failures.len(), join_failures(.failures))]
  Render { failures: Vec<RenderError>, total: usize },

  #[error("onFinished hook failed: {cause:#}")]
  Finished { cause: anyhow::Error },
}

fn join_failures(failures: &[RenderError]) -> String {
  failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("\n\n")
}
