/* src/cli/core/src/build/tests.rs */

// Whole builds against an in-memory bundler and application.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, bail, ensure};
use async_trait::async_trait;

use super::error::BuildError;
use super::*;
use crate::app::{AppContext, EntryLoader, LoaderOutput, PageRequest, RenderResult, RouteSpec, ServerApp};
use crate::bundler::{Bundler, ClientJob, ServerJob};
use crate::config::{BuildSection, CrittersOptions, CrittersSetting, DirStyle, ModuleFormat};

const SHELL: &str = concat!(
  "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><title>app</title></head>",
  "<body><div id=\"root\"></div>",
  "<script type=\"module\" crossorigin src=\"/assets/app.js\"></script></body></html>"
);

const MANIFEST: &str = r#"{
  "app": { "file": "assets/app.js", "isEntry": true, "dynamicImports": ["about"] },
  "about": { "file": "assets/about.js" }
}"#;

#[derive(Default)]
struct FakeBundler {
  extra_head: &'static str,
  server_out: Mutex<Option<PathBuf>>,
  skip_server_bundle: bool,
}

fn write(path: &Path, content: &str) -> Result<()> {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, content)?;
  Ok(())
}

#[async_trait]
impl Bundler for FakeBundler {
  async fn build_client(&self, job: ClientJob<'_>) -> Result<()> {
    let shell = SHELL.replace("</head>", &format!("{}</head>", self.extra_head));
    write(&job.out_dir.join("index.html"), &shell)?;
    write(&job.out_dir.join("manifest.json"), MANIFEST)?;
    write(&job.out_dir.join("ssr-manifest.json"), "{}")?;
    write(&job.out_dir.join("assets/style.css"), ".used { color: red; }\n.unused { color: blue; }\n")?;
    Ok(())
  }

  async fn build_server(&self, job: ServerJob<'_>) -> Result<()> {
    *self.server_out.lock().unwrap() = Some(job.out_dir.to_path_buf());
    if !self.skip_server_bundle {
      write(&job.bundle_path(), "export {}")?;
    }
    Ok(())
  }
}

#[derive(Default)]
struct FakeApp {
  routes: Vec<RouteSpec>,
  included: Option<Vec<String>>,
  fail_on: Option<&'static str>,
  in_flight: AtomicUsize,
  peak: AtomicUsize,
  /// Contexts created and not yet freed.
  live: AtomicUsize,
}

#[async_trait]
impl ServerApp for FakeApp {
  async fn routes(&self) -> Result<Vec<RouteSpec>> {
    Ok(self.routes.clone())
  }

  async fn load(&self, key: &str) -> Result<LoaderOutput> {
    bail!("no loader registered for {key}")
  }

  async fn included_routes(&self, _paths: &[String]) -> Result<Option<Vec<String>>> {
    Ok(self.included.clone())
  }

  async fn create_root(&self, path: &str) -> Result<AppContext> {
    self.live.fetch_add(1, Ordering::SeqCst);
    Ok(AppContext { handle: path.len() as u64, collects_styles: false })
  }

  async fn app_rendered(&self, _ctx: &AppContext, _path: &str, _app_html: &str) -> Result<()> {
    self.live.fetch_sub(1, Ordering::SeqCst);
    Ok(())
  }

  async fn release(&self, _ctx: &AppContext) -> Result<()> {
    self.live.fetch_sub(1, Ordering::SeqCst);
    Ok(())
  }

  async fn render(&self, _ctx: &AppContext, request: &PageRequest) -> Result<RenderResult> {
    let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    self.peak.fetch_max(now, Ordering::SeqCst);
    for _ in 0..3 {
      tokio::task::yield_now().await;
    }
    self.in_flight.fetch_sub(1, Ordering::SeqCst);

    if self.fail_on == Some(request.path.as_str()) {
      bail!("window is not defined");
    }
    Ok(RenderResult {
      app_html: format!(r#"<h1 class="used">{}</h1>"#, request.path),
      head_tags: vec![format!("<title>{}</title>", request.path)],
      ..Default::default()
    })
  }
}

struct FakeLoader {
  app: Arc<FakeApp>,
}

#[async_trait]
impl EntryLoader for FakeLoader {
  async fn load(&self, bundle: &Path, format: ModuleFormat) -> Result<Arc<dyn ServerApp>> {
    ensure!(bundle.is_file(), "{} missing", bundle.display());
    ensure!(bundle.extension().and_then(|e| e.to_str()) == Some(format.extension()), "wrong extension");
    Ok(Arc::clone(&self.app) as Arc<dyn ServerApp>)
  }
}

#[derive(Default)]
struct RecordingHooks {
  finished: AtomicBool,
  reject_shell_for: Option<&'static str>,
}

#[async_trait]
impl RenderHooks for RecordingHooks {
  async fn before_page_render(&self, path: &str, _index_html: &str) -> Result<Option<String>> {
    if self.reject_shell_for == Some(path) {
      bail!("no template for {path}");
    }
    Ok(None)
  }

  async fn page_rendered(&self, path: &str, html: &str) -> Result<Option<String>> {
    Ok(Some(html.replace("</body>", &format!("<!-- {path} --></body>"))))
  }

  async fn finished(&self) -> Result<()> {
    self.finished.store(true, Ordering::SeqCst);
    Ok(())
  }
}

fn route(path: &str, entry: Option<&str>) -> RouteSpec {
  RouteSpec { path: Some(path.to_string()), entry: entry.map(str::to_string), ..Default::default() }
}

fn home_and_about() -> FakeApp {
  FakeApp { routes: vec![route("/", Some("app")), route("/about", None)], ..Default::default() }
}

fn settings() -> BuildSection {
  BuildSection { critters: CrittersSetting::Toggle(false), ..Default::default() }
}

fn plan(root: &Path, build: BuildSection) -> BuildPlan {
  BuildPlan { root: root.to_path_buf(), out_dir: root.join("dist"), mode: "production".to_string(), build }
}

fn pipeline(bundler: Arc<FakeBundler>, app: Arc<FakeApp>, hooks: Arc<dyn RenderHooks>) -> Pipeline {
  Pipeline { bundler, loader: Arc::new(FakeLoader { app }), hooks, watchdog: None }
}

async fn build(root: &Path, app: FakeApp, build: BuildSection) -> Result<BuildReport, BuildError> {
  let pipeline = pipeline(Arc::default(), Arc::new(app), Arc::new(NoopHooks));
  run_build(&plan(root, build), &pipeline).await
}

fn read(root: &Path, file: &str) -> String {
  std::fs::read_to_string(root.join("dist").join(file)).unwrap()
}

fn page_paths(report: &BuildReport) -> Vec<&str> {
  report.pages.iter().map(|p| p.path.as_str()).collect()
}

#[tokio::test]
async fn home_preloads_lazy_about_chunk() {
  let dir = tempfile::tempdir().unwrap();
  let report = build(dir.path(), home_and_about(), settings()).await.unwrap();
  assert_eq!(page_paths(&report), vec!["/", "/about"]);

  let home = read(dir.path(), "index.html");
  assert!(home.contains(r#"<link rel="modulepreload" crossorigin href="/assets/about.js">"#), "{home}");
  assert!(home.contains(r#"<link rel="modulepreload" crossorigin href="/assets/app.js">"#));
  assert!(home.contains(r#"<div id="root" data-server-rendered="true"><h1 class="used">/</h1></div>"#));
  assert!(home.contains("<head><title>/</title>"));

  let about = read(dir.path(), "about.html");
  assert!(!about.contains(r#"href="/assets/about.js""#), "{about}");
  assert!(about.contains("<h1 class=\"used\">/about</h1>"));
}

#[tokio::test]
async fn nested_dir_style() {
  let dir = tempfile::tempdir().unwrap();
  let build_section = BuildSection { dir_style: DirStyle::Nested, ..settings() };
  let report = build(dir.path(), home_and_about(), build_section).await.unwrap();

  let files: Vec<&str> = report.pages.iter().map(|p| p.file.as_str()).collect();
  assert_eq!(files, vec!["index.html", "about/index.html"]);
  assert!(dir.path().join("dist/about/index.html").is_file());
  assert!(!dir.path().join("dist/about.html").exists());
}

#[tokio::test]
async fn rebuilding_is_byte_identical() {
  let dir = tempfile::tempdir().unwrap();
  build(dir.path(), home_and_about(), settings()).await.unwrap();
  let first = (read(dir.path(), "index.html"), read(dir.path(), "about.html"));
  build(dir.path(), home_and_about(), settings()).await.unwrap();
  let second = (read(dir.path(), "index.html"), read(dir.path(), "about.html"));
  assert_eq!(first, second);
}

#[tokio::test]
async fn dynamic_routes_are_never_written() {
  let dir = tempfile::tempdir().unwrap();
  let app = FakeApp {
    routes: vec![route("/", None), route("/users/:id", None), route("/files/*", None), route("/", None)],
    ..Default::default()
  };
  let build_section = BuildSection { include_all_routes: true, ..settings() };
  let report = build(dir.path(), app, build_section).await.unwrap();
  assert_eq!(page_paths(&report), vec!["/"]);
  let written: Vec<_> = std::fs::read_dir(dir.path().join("dist"))
    .unwrap()
    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
    .collect();
  assert!(written.iter().all(|name| !name.contains(':') && !name.contains('*')), "{written:?}");
}

#[tokio::test]
async fn entry_route_list_and_exclusions() {
  let dir = tempfile::tempdir().unwrap();
  let app = FakeApp { included: Some(vec!["/about".to_string()]), ..home_and_about() };
  let report = build(dir.path(), app, settings()).await.unwrap();
  assert_eq!(page_paths(&report), vec!["/about"]);

  let dir = tempfile::tempdir().unwrap();
  let build_section = BuildSection { exclude_routes: vec!["/about".to_string()], ..settings() };
  let report = build(dir.path(), home_and_about(), build_section).await.unwrap();
  assert_eq!(page_paths(&report), vec!["/"]);
}

#[tokio::test]
async fn failed_page_fails_build_after_all_pages() {
  let dir = tempfile::tempdir().unwrap();
  let app = Arc::new(FakeApp { fail_on: Some("/about"), ..home_and_about() });
  let bundler = Arc::new(FakeBundler::default());
  let pipeline = pipeline(Arc::clone(&bundler), Arc::clone(&app), Arc::new(NoopHooks));

  let err = run_build(&plan(dir.path(), settings()), &pipeline).await.unwrap_err();
  let BuildError::Render { failures, total } = &err else {
    panic!("unexpected error: {err}");
  };
  assert_eq!(*total, 2);
  assert_eq!(failures.len(), 1);
  let msg = err.to_string();
  assert!(msg.contains("Error on page: /about"), "{msg}");
  assert!(msg.contains("window is not defined"), "{msg}");

  assert!(read(dir.path(), "index.html").contains("data-server-rendered"));
  assert_eq!(app.live.load(Ordering::SeqCst), 0);
  let server_out = bundler.server_out.lock().unwrap().clone().unwrap();
  assert!(!server_out.exists());
  assert!(!dir.path().join(TEMP_DIR).exists());
}

#[tokio::test]
async fn render_queue_respects_concurrency() {
  let dir = tempfile::tempdir().unwrap();
  let routes = (0..6).map(|i| route(&format!("/p{i}"), None)).collect();
  let app = Arc::new(FakeApp { routes, ..Default::default() });
  let pipeline = pipeline(Arc::default(), Arc::clone(&app), Arc::new(NoopHooks));
  let build_section = BuildSection { concurrency: 2, ..settings() };

  let report = run_build(&plan(dir.path(), build_section), &pipeline).await.unwrap();
  assert_eq!(report.pages.len(), 6);
  let peak = app.peak.load(Ordering::SeqCst);
  assert!((1..=2).contains(&peak), "peak {peak}");
}

#[tokio::test]
async fn failed_shell_hook_frees_app_context() {
  let dir = tempfile::tempdir().unwrap();
  let app = Arc::new(home_and_about());
  let hooks = Arc::new(RecordingHooks { reject_shell_for: Some("/about"), ..Default::default() });
  let pipeline = pipeline(Arc::default(), Arc::clone(&app), hooks);

  let err = run_build(&plan(dir.path(), settings()), &pipeline).await.unwrap_err();
  assert!(err.to_string().contains("no template for /about"), "{err}");
  assert_eq!(app.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn hooks_rewrite_pages_and_finish() {
  let dir = tempfile::tempdir().unwrap();
  let hooks = Arc::new(RecordingHooks::default());
  let pipeline = pipeline(Arc::default(), Arc::new(home_and_about()), Arc::clone(&hooks) as Arc<dyn RenderHooks>);

  run_build(&plan(dir.path(), settings()), &pipeline).await.unwrap();
  assert!(read(dir.path(), "about.html").contains("<!-- /about --></body>"));
  assert!(hooks.finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn critical_css_is_inlined() {
  let dir = tempfile::tempdir().unwrap();
  let bundler = Arc::new(FakeBundler {
    extra_head: r#"<link rel="stylesheet" href="/assets/style.css">"#,
    ..Default::default()
  });
  let pipeline = pipeline(bundler, Arc::new(home_and_about()), Arc::new(NoopHooks));
  let build_section = BuildSection { critters: CrittersSetting::Options(CrittersOptions::default()), ..settings() };

  run_build(&plan(dir.path(), build_section), &pipeline).await.unwrap();
  let home = read(dir.path(), "index.html");
  assert!(home.contains("<style>"), "{home}");
  assert!(home.contains(".used"));
  assert!(!home.contains(".unused"));
}

#[tokio::test]
async fn critical_css_stays_serial_under_parallel_renders() {
  let dir = tempfile::tempdir().unwrap();
  let bundler = Arc::new(FakeBundler {
    extra_head: r#"<link rel="stylesheet" href="/assets/style.css">"#,
    ..Default::default()
  });
  let routes = (0..40).map(|i| route(&format!("/p{i}"), None)).collect();
  let app = Arc::new(FakeApp { routes, ..Default::default() });
  let pipeline = pipeline(bundler, Arc::clone(&app), Arc::new(NoopHooks));
  let build_section = BuildSection {
    concurrency: 20,
    critters: CrittersSetting::Options(CrittersOptions::default()),
    ..settings()
  };

  let report = run_build(&plan(dir.path(), build_section), &pipeline).await.unwrap();
  assert_eq!(report.pages.len(), 40);
  assert!(app.peak.load(Ordering::SeqCst) > 1, "renders never overlapped");
  assert_eq!(report.critical_peak, Some(1));
  assert!(read(dir.path(), "p7.html").contains("<style>"));
}

#[tokio::test]
async fn missing_server_bundle_is_an_entry_error() {
  let dir = tempfile::tempdir().unwrap();
  let bundler = Arc::new(FakeBundler { skip_server_bundle: true, ..Default::default() });
  let pipeline = pipeline(bundler, Arc::new(home_and_about()), Arc::new(NoopHooks));

  let err = run_build(&plan(dir.path(), settings()), &pipeline).await.unwrap_err();
  assert!(matches!(err, BuildError::ServerEntry { .. }), "{err}");
  assert!(!dir.path().join(TEMP_DIR).exists());
}

#[tokio::test]
async fn missing_manifest_is_fatal() {
  struct NoManifest;

  #[async_trait]
  impl Bundler for NoManifest {
    async fn build_client(&self, job: ClientJob<'_>) -> Result<()> {
      write(&job.out_dir.join("index.html"), SHELL)
    }

    async fn build_server(&self, job: ServerJob<'_>) -> Result<()> {
      write(&job.bundle_path(), "export {}")
    }
  }

  let dir = tempfile::tempdir().unwrap();
  let pipeline = Pipeline {
    bundler: Arc::new(NoManifest),
    loader: Arc::new(FakeLoader { app: Arc::new(home_and_about()) }),
    hooks: Arc::new(NoopHooks),
    watchdog: None,
  };
  let err = run_build(&plan(dir.path(), settings()), &pipeline).await.unwrap_err();
  assert!(matches!(err, BuildError::Manifest { .. }), "{err}");
  assert!(err.to_string().contains("manifest.json"));
}
