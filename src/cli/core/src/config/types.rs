/* src/cli/core/src/config/types.rs */

use anyhow::{Result, bail};
use serde::Deserialize;
use ssg_document::{Formatting, ScriptMode};

#[derive(Debug, Clone, Deserialize)]
pub struct SsgConfig {
  #[serde(default)]
  pub build: BuildSection,
  pub bundler: BundlerSection,
  #[serde(default)]
  pub hooks: HooksSection,
}

impl SsgConfig {
  pub fn validate(&self) -> Result<()> {
    self.build.validate()
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirStyle {
  #[default]
  Flat,
  Nested,
}

/// Module format of the server bundle; decides its extension and how Node loads it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleFormat {
  #[default]
  Esm,
  Cjs,
}

impl ModuleFormat {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Esm => "esm",
      Self::Cjs => "cjs",
    }
  }

  pub fn extension(self) -> &'static str {
    match self {
      Self::Esm => "mjs",
      Self::Cjs => "cjs",
    }
  }
}

/// How a stylesheet link is kept around once its critical rules are inlined.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreloadStrategy {
  /// `media="print"` swapped to `all` on load, plus a `<noscript>` fallback.
  #[default]
  Media,
  /// `rel="preload" as="style"` swapped to `stylesheet` on load.
  Swap,
  /// The link moves to the end of `<body>`.
  Body,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CrittersOptions {
  #[serde(default)]
  pub preload: PreloadStrategy,
  /// Sheets at or below this size are inlined whole and their link dropped.
  #[serde(default)]
  pub inline_threshold: u64,
  /// Process stylesheets linked from the head. `false` leaves them alone.
  #[serde(default = "default_true")]
  pub external: bool,
  #[serde(default = "default_true")]
  pub compress: bool,
}

impl Default for CrittersOptions {
  fn default() -> Self {
    Self { preload: PreloadStrategy::default(), inline_threshold: 0, external: true, compress: true }
  }
}

/// `critters = false` disables critical CSS; `true` or a table enables it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CrittersSetting {
  Toggle(bool),
  Options(CrittersOptions),
}

impl Default for CrittersSetting {
  fn default() -> Self {
    Self::Options(CrittersOptions::default())
  }
}

impl CrittersSetting {
  pub fn options(&self) -> Option<CrittersOptions> {
    match self {
      Self::Toggle(false) => None,
      Self::Toggle(true) => Some(CrittersOptions::default()),
      Self::Options(opts) => Some(opts.clone()),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuildSection {
  /// Project root, relative to the directory holding `ssg.toml`.
  #[serde(default = "default_root")]
  pub root: String,
  #[serde(default = "default_out_dir")]
  pub out_dir: String,
  #[serde(default = "default_mode")]
  pub mode: String,
  /// Public base path prepended to manifest files when linking them.
  #[serde(default = "default_base")]
  pub base: String,
  #[serde(default)]
  pub script: ScriptMode,
  /// Install a DOM shim in the server runtime before loading the entry.
  #[serde(default)]
  pub mock: bool,
  /// Server entry; detected from `index.html` when omitted.
  pub entry: Option<String>,
  #[serde(default)]
  pub formatting: Formatting,
  #[serde(default)]
  pub critters: CrittersSetting,
  #[serde(default)]
  pub dir_style: DirStyle,
  #[serde(default)]
  pub include_all_routes: bool,
  #[serde(default)]
  pub format: ModuleFormat,
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
  #[serde(default = "default_root_container_id")]
  pub root_container_id: String,
  /// Paths never rendered. A trailing `*` matches every path with that prefix.
  #[serde(default)]
  pub exclude_routes: Vec<String>,
}

impl Default for BuildSection {
  fn default() -> Self {
    Self {
      root: default_root(),
      out_dir: default_out_dir(),
      mode: default_mode(),
      base: default_base(),
      script: ScriptMode::default(),
      mock: false,
      entry: None,
      formatting: Formatting::default(),
      critters: CrittersSetting::default(),
      dir_style: DirStyle::default(),
      include_all_routes: false,
      format: ModuleFormat::default(),
      concurrency: default_concurrency(),
      root_container_id: default_root_container_id(),
      exclude_routes: Vec::new(),
    }
  }
}

impl BuildSection {
  pub fn validate(&self) -> Result<()> {
    if self.concurrency == 0 {
      bail!("build.concurrency must be at least 1");
    }
    if self.root_container_id.trim().is_empty() {
      bail!("build.root_container_id must not be empty");
    }
    if self.out_dir.trim().is_empty() {
      bail!("build.out_dir must not be empty");
    }
    Ok(())
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BundlerSection {
  pub client_command: String,
  pub server_command: String,
  /// Regenerates the service worker after all pages are written.
  pub sw_command: Option<String>,
  #[serde(default = "default_node")]
  pub node: String,
}

/// Shell commands run around each page. Page hooks get the HTML on stdin and
/// the route in `SSG_ROUTE`; non-empty stdout replaces the HTML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HooksSection {
  pub on_before_page_render: Option<String>,
  pub on_page_rendered: Option<String>,
  pub on_finished: Option<String>,
}

impl HooksSection {
  pub fn is_empty(&self) -> bool {
    self.on_before_page_render.is_none() && self.on_page_rendered.is_none() && self.on_finished.is_none()
  }
}

fn default_true() -> bool {
  true
}

fn default_root() -> String {
  ".".to_string()
}

fn default_out_dir() -> String {
  "dist".to_string()
}

fn default_mode() -> String {
  "production".to_string()
}

fn default_base() -> String {
  "/".to_string()
}

fn default_concurrency() -> usize {
  20
}

fn default_root_container_id() -> String {
  "root".to_string()
}

fn default_node() -> String {
  "node".to_string()
}
