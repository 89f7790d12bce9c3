/* src/cli/core/src/app/mod.rs */

// The application's server entry as seen from the build: its route table,
// lazy route loaders, and the page renderer.

mod bridge;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

pub use bridge::NodeLoader;

use crate::config::ModuleFormat;

/// One route as declared by the application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
  #[serde(default)]
  pub path: Option<String>,
  #[serde(default)]
  pub index: bool,
  /// Module-manifest id of the code-split chunk serving this route.
  #[serde(default)]
  pub entry: Option<String>,
  /// Key for [`ServerApp::load`] when the route has a lazy module or a
  /// static-path loader that must run before its paths are known.
  #[serde(default)]
  pub loader: Option<String>,
  /// Concrete paths the application enumerates for a dynamic route.
  #[serde(default)]
  pub static_paths: Vec<String>,
  #[serde(default)]
  pub children: Vec<RouteSpec>,
}

/// What running a route's loader revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoaderOutput {
  #[serde(default)]
  pub children: Vec<RouteSpec>,
  #[serde(default)]
  pub static_paths: Vec<String>,
  /// Chunk id of the lazily loaded module, when it differs from the route's.
  #[serde(default)]
  pub entry: Option<String>,
}

/// Per-page application instance created for one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppContext {
  pub handle: u64,
  /// The application supplied a style collector for this page.
  #[serde(default)]
  pub collects_styles: bool,
}

/// Synthetic request for one static path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
  pub path: String,
  pub url: Url,
}

impl PageRequest {
  /// `path` is resolved against the site root, so `about` and `/about` name
  /// the same page.
  pub fn new(path: &str) -> Result<Self> {
    let path = format!("/{}", path.trim_start_matches('/'));
    let url = Url::parse("http://localhost/")
      .and_then(|base| base.join(&path))
      .with_context(|| format!("invalid route path {path:?}"))?;
    Ok(Self { path, url })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResult {
  pub app_html: String,
  #[serde(default)]
  pub html_attrs: String,
  #[serde(default)]
  pub body_attrs: String,
  /// Head fragments in document order (title, meta, link, script).
  #[serde(default)]
  pub head_tags: Vec<String>,
  /// Collected styles, spliced right after `<head>`.
  #[serde(default)]
  pub style_tag: Option<String>,
  /// Serialized application state, embedded as `window.__INITIAL_STATE__`.
  #[serde(default)]
  pub initial_state: Option<String>,
}

#[async_trait]
pub trait ServerApp: Send + Sync {
  /// Route table of a fresh application instance.
  async fn routes(&self) -> Result<Vec<RouteSpec>>;

  /// Run the loader registered under `key`.
  async fn load(&self, key: &str) -> Result<LoaderOutput>;

  /// The entry's own route filter, `None` when it exports none.
  async fn included_routes(&self, paths: &[String]) -> Result<Option<Vec<String>>>;

  async fn create_root(&self, path: &str) -> Result<AppContext>;

  async fn render(&self, ctx: &AppContext, request: &PageRequest) -> Result<RenderResult>;

  /// Called with the raw fragment once a page rendered; side effects only.
  async fn app_rendered(&self, _ctx: &AppContext, _path: &str, _app_html: &str) -> Result<()> {
    Ok(())
  }

  /// Drop a context that will never reach [`ServerApp::app_rendered`].
  async fn release(&self, _ctx: &AppContext) -> Result<()> {
    Ok(())
  }
}

/// Loads a built server bundle and exposes it as a [`ServerApp`].
#[async_trait]
pub trait EntryLoader: Send + Sync {
  async fn load(&self, bundle: &Path, format: ModuleFormat) -> Result<Arc<dyn ServerApp>>;
}
