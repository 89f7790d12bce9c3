/* src/cli/core/src/build/run.rs */

// `ssg build`: client bundle, server bundle, route discovery, then every
// selected path through the render queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow};
use ssg_document::{DEFAULT_ENTRY, detect_entry, rewrite_scripts};

use super::critical::Critters;
use super::error::{BuildError, BuildPhase, RenderError};
use super::hooks::RenderHooks;
use super::manifest::load_manifests;
use super::queue::{WorkQueue, panic_message};
use super::render::{CriticalCss, PageReport, RenderContext, render_page};
use super::route::{PathFilter, RoutePaths, discover_routes, select_paths};
use crate::app::EntryLoader;
use crate::bundler::{Bundler, ClientJob, ServerJob};
use crate::config::BuildSection;
use crate::ui::{self, Stage};

/// Parent of the per-build server bundle directories, under the project root.
pub const TEMP_DIR: &str = ".ssg-temp";

/// Grace period after the build before a lingering process is force-exited.
pub const WATCHDOG_AFTER: Duration = Duration::from_secs(15);

/// Resolved locations and settings of one build.
#[derive(Debug, Clone)]
pub struct BuildPlan {
  pub root: PathBuf,
  pub out_dir: PathBuf,
  pub mode: String,
  pub build: BuildSection,
}

impl BuildPlan {
  pub fn new(base_dir: &Path, build: BuildSection) -> Self {
    let root = base_dir.join(&build.root);
    let out_dir = root.join(&build.out_dir);
    let mode = resolve_mode(&build.mode, |key| std::env::var(key).ok());
    Self { root, out_dir, mode, build }
  }
}

/// `MODE`, then `NODE_ENV`, then the configured mode.
fn resolve_mode(configured: &str, env: impl Fn(&str) -> Option<String>) -> String {
  ["MODE", "NODE_ENV"]
    .into_iter()
    .find_map(|key| env(key).filter(|value| !value.is_empty()))
    .unwrap_or_else(|| configured.to_string())
}

/// The collaborators a build runs against.
pub struct Pipeline {
  pub bundler: Arc<dyn Bundler>,
  pub loader: Arc<dyn EntryLoader>,
  pub hooks: Arc<dyn RenderHooks>,
  /// Force-exit the process this long after the build; `None` disables it.
  pub watchdog: Option<Duration>,
}

#[derive(Debug)]
pub struct BuildReport {
  /// Written pages in route order.
  pub pages: Vec<PageReport>,
  /// Most pages that were rendering at once.
  pub render_peak: usize,
  /// Most pages inside critical CSS processing at once, when it ran.
  pub critical_peak: Option<usize>,
  pub elapsed: Duration,
}

/// What the render stage produced.
struct Rendered {
  pages: Vec<PageReport>,
  render_peak: usize,
  critical_peak: Option<usize>,
}

/// Per-build directory for the server bundle. The whole temp root goes away
/// on drop, whatever way the build ends.
struct ServerOutDir {
  root: PathBuf,
  path: PathBuf,
}

impl ServerOutDir {
  fn create(project_root: &Path) -> Result<Self, BuildError> {
    let root = project_root.join(TEMP_DIR);
    let path = root.join(hex::encode(rand::random::<[u8; 5]>()));
    std::fs::create_dir_all(&path)
      .with_context(|| format!("failed to create {}", path.display()))
      .map_err(|cause| BuildError::Bundler { phase: BuildPhase::Server, cause })?;
    Ok(Self { root, path })
  }
}

impl Drop for ServerOutDir {
  fn drop(&mut self) {
    match std::fs::remove_dir_all(&self.root) {
      Ok(()) => tracing::debug!(dir = %self.root.display(), "temporary server build removed"),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => tracing::warn!(dir = %self.root.display(), error = %e, "failed to remove temporary server build"),
    }
  }
}

pub async fn run_build(plan: &BuildPlan, pipeline: &Pipeline) -> Result<BuildReport, BuildError> {
  let started = Instant::now();
  let result = execute(plan, pipeline).await;
  if let Some(after) = pipeline.watchdog {
    arm_watchdog(after, if result.is_ok() { 0 } else { 1 });
  }
  let Rendered { pages, render_peak, critical_peak } = result?;
  Ok(BuildReport { pages, render_peak, critical_peak, elapsed: started.elapsed() })
}

/// Exit the process if it is still alive `after` from now, e.g. because an
/// application handle keeps the runtime busy.
fn arm_watchdog(after: Duration, code: i32) {
  std::thread::spawn(move || {
    std::thread::sleep(after);
    ui::warn(&format!(
      "build process still running after {}s, there might be something misconfigured in your setup; forcing exit",
      after.as_secs()
    ));
    std::process::exit(code);
  });
}

async fn execute(plan: &BuildPlan, pipeline: &Pipeline) -> Result<Rendered, BuildError> {
  ui::stage(Stage::Client, "Building for client");
  let client = ClientJob { root: &plan.root, out_dir: &plan.out_dir, mode: &plan.mode };
  pipeline
    .bundler
    .build_client(client)
    .await
    .map_err(|cause| BuildError::Bundler { phase: BuildPhase::Client, cause })?;

  let rendered = {
    let server_out = ServerOutDir::create(&plan.root)?;
    render_all(plan, pipeline, &server_out.path).await?
  };

  let regenerated = pipeline
    .bundler
    .regenerate_service_worker(&plan.root, &plan.out_dir)
    .await
    .map_err(|cause| BuildError::Bundler { phase: BuildPhase::ServiceWorker, cause })?;
  if regenerated {
    ui::detail_ok("service worker regenerated");
  }

  ui::blank();
  ui::ok("Build finished");
  pipeline.hooks.finished().await.map_err(|cause| BuildError::Finished { cause })?;
  Ok(rendered)
}

fn resolve_entry(plan: &BuildPlan) -> String {
  if let Some(entry) = &plan.build.entry {
    return entry.clone();
  }
  let index = plan.root.join("index.html");
  match std::fs::read_to_string(&index) {
    Ok(html) => detect_entry(&html),
    Err(e) => {
      tracing::debug!(path = %index.display(), error = %e, "no project index.html, using default entry");
      DEFAULT_ENTRY.to_string()
    }
  }
}

async fn render_all(
  plan: &BuildPlan,
  pipeline: &Pipeline,
  server_out: &Path,
) -> Result<Rendered, BuildError> {
  let build = &plan.build;

  ui::stage(Stage::Server, "Building for server");
  let entry = resolve_entry(plan);
  let job = ServerJob { root: &plan.root, entry: &entry, out_dir: server_out, format: build.format, mode: &plan.mode };
  pipeline
    .bundler
    .build_server(job)
    .await
    .map_err(|cause| BuildError::Bundler { phase: BuildPhase::Server, cause })?;

  let bundle = job.bundle_path();
  if !bundle.is_file() {
    return Err(BuildError::ServerEntry {
      path: bundle,
      cause: anyhow!("the server bundler did not produce it from {entry}"),
    });
  }
  let app = pipeline
    .loader
    .load(&bundle, build.format)
    .await
    .map_err(|cause| BuildError::ServerEntry { path: bundle.clone(), cause })?;
  ui::detail_ok(&format!("server entry {entry} ({})", build.format.as_str()));

  ui::stage(Stage::Routes, "Discovering routes");
  let tree = discover_routes(&*app).await?;
  let RoutePaths { paths, path_to_entry } = tree.collect_paths();
  let entry_override = if build.include_all_routes {
    None
  } else {
    app
      .included_routes(&paths)
      .await
      .map_err(|cause| BuildError::Discovery { route: "(includedRoutes)".to_string(), cause })?
  };
  let discovered = paths.len();
  let paths = select_paths(
    paths,
    PathFilter { include_all: build.include_all_routes, entry_override, exclude: &build.exclude_routes },
  );
  ui::detail_ok(&format!("{} of {discovered} paths selected", paths.len()));

  let manifests = load_manifests(&plan.out_dir)?;
  let shell = rewrite_scripts(&manifests.index_html, build.script);
  let critical = build.critters.options().map(|options| CriticalCss {
    critters: Arc::new(Critters::new(plan.out_dir.clone(), &build.base, options)),
    queue: WorkQueue::new("critical", 1),
  });
  if critical.is_some() {
    ui::detail("critical CSS enabled");
  }

  ui::stage(Stage::Render, &format!("Rendering {} pages", paths.len()));
  let ctx = Arc::new(RenderContext {
    app,
    hooks: Arc::clone(&pipeline.hooks),
    manifests: Arc::new(manifests),
    shell,
    path_to_entry,
    critical,
    out_dir: plan.out_dir.clone(),
    out_label: build.out_dir.clone(),
    base: build.base.clone(),
    root_id: build.root_container_id.clone(),
    formatting: build.formatting,
    dir_style: build.dir_style,
  });

  let queue = WorkQueue::new("render", build.concurrency);
  let pending: Vec<_> = paths
    .into_iter()
    .map(|path| {
      let done = queue.add(render_page(Arc::clone(&ctx), path.clone()));
      (path, done)
    })
    .collect();
  let render_peak = queue.on_idle().await;
  tracing::debug!(pages = pending.len(), peak = render_peak, "all pages settled");
  let critical_peak = ctx.critical.as_ref().map(|critical| {
    tracing::debug!(peak = critical.queue.peak(), active = critical.queue.active(), "critical CSS queue");
    critical.queue.peak()
  });
  drop(ctx);

  let total = pending.len();
  let mut pages = Vec::with_capacity(total);
  let mut failures = Vec::new();
  for (path, done) in pending {
    match done.await {
      Ok(Ok(Ok(page))) => pages.push(page),
      Ok(Ok(Err(failure))) => failures.push(failure),
      Ok(Err(panic)) => failures.push(RenderError {
        path,
        cause: anyhow!("render task panicked: {}", panic_message(&*panic)),
      }),
      Err(_) => failures.push(RenderError { path, cause: anyhow!("render task was dropped") }),
    }
  }

  if failures.is_empty() {
    Ok(Rendered { pages, render_peak, critical_peak })
  } else {
    for failure in &failures {
      ui::page_failed(&failure.path);
    }
    Err(BuildError::Render { failures, total })
  }
}
