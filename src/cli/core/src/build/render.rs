/* src/cli/core/src/build/render.rs */

// One page: render through the application, assemble the document, add
// preload hints, run hooks and critical CSS, format, write.

use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ssg_document::{Formatting, PageParts, format_html, inject_style_tag, render_html, render_preload_links, serialize_state};

use super::critical::Critters;
use super::error::RenderError;
use super::graph::collect_modules;
use super::hooks::RenderHooks;
use super::manifest::ManifestBundle;
use super::output::page_file;
use super::queue::WorkQueue;
use crate::app::{PageRequest, ServerApp};
use crate::config::DirStyle;
use crate::ui;

/// Critical CSS processor plus the serial queue every page goes through.
pub struct CriticalCss {
  pub critters: Arc<Critters>,
  pub queue: WorkQueue,
}

/// Everything shared read-only by the render tasks of one build.
pub struct RenderContext {
  pub app: Arc<dyn ServerApp>,
  pub hooks: Arc<dyn RenderHooks>,
  pub manifests: Arc<ManifestBundle>,
  /// Shell template after script rewriting.
  pub shell: String,
  pub path_to_entry: HashMap<String, BTreeSet<String>>,
  pub critical: Option<CriticalCss>,
  pub out_dir: PathBuf,
  /// Output directory as shown in page log lines.
  pub out_label: String,
  pub base: String,
  pub root_id: String,
  pub formatting: Formatting,
  pub dir_style: DirStyle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageReport {
  pub path: String,
  pub file: String,
  pub bytes: u64,
}

pub async fn render_page(ctx: Arc<RenderContext>, path: String) -> Result<PageReport, RenderError> {
  match render_inner(&ctx, &path).await {
    Ok(report) => Ok(report),
    Err(cause) => Err(RenderError { path, cause }),
  }
}

async fn render_inner(ctx: &RenderContext, path: &str) -> Result<PageReport> {
  let app_ctx = ctx.app.create_root(path).await.context("createRoot failed")?;
  tracing::debug!(%path, handle = app_ctx.handle, styles = app_ctx.collects_styles, "rendering");

  let staged = async {
    let shell = match ctx.hooks.before_page_render(path, &ctx.shell).await.context("onBeforePageRender failed")? {
      Some(custom) if !custom.is_empty() => Cow::Owned(custom),
      _ => Cow::Borrowed(ctx.shell.as_str()),
    };
    let request = PageRequest::new(path)?;
    let rendered = ctx.app.render(&app_ctx, &request).await.context("render failed")?;
    anyhow::Ok((shell, rendered))
  };
  let (shell, rendered) = match staged.await {
    Ok(staged) => staged,
    Err(e) => {
      // `app_rendered` frees the instance on success; free it here otherwise.
      if let Err(release) = ctx.app.release(&app_ctx).await {
        tracing::debug!(%path, handle = app_ctx.handle, error = %release, "failed to release app context");
      }
      return Err(e);
    }
  };
  ctx.app.app_rendered(&app_ctx, path, &rendered.app_html).await.context("onSSRAppRendered failed")?;

  let state = rendered.initial_state.as_deref().map(serialize_state);
  let html = render_html(
    &shell,
    &PageParts {
      root_id: &ctx.root_id,
      app_html: &rendered.app_html,
      html_attrs: &rendered.html_attrs,
      body_attrs: &rendered.body_attrs,
      head_tags: &rendered.head_tags,
      initial_state: state.as_deref(),
    },
  )?;

  let entries = ctx.path_to_entry.get(path).into_iter().flatten().map(String::as_str);
  let modules = collect_modules(&ctx.manifests.modules, entries);
  let files = ctx.manifests.files_for(&modules, &ctx.base);
  let html = render_preload_links(&html, files.iter().map(String::as_str));

  let mut html = match ctx.hooks.page_rendered(path, &html).await.context("onPageRendered failed")? {
    Some(custom) if !custom.is_empty() => custom,
    _ => html,
  };

  if let Some(critical) = &ctx.critical {
    let critters = Arc::clone(&critical.critters);
    html = critical.queue.run(async move { critters.process(&html) }).await??;
  }

  if let Some(style) = rendered.style_tag.as_deref().filter(|s| !s.is_empty()) {
    html = inject_style_tag(&html, style);
  }

  let formatted = format_html(&html, ctx.formatting);

  let file = page_file(path, ctx.dir_style);
  let target = ctx.out_dir.join(&file);
  if let Some(parent) = target.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  tokio::fs::write(&target, &formatted)
    .await
    .with_context(|| format!("failed to write {}", target.display()))?;

  let bytes = formatted.len() as u64;
  ui::page(&ctx.out_label, &file, bytes);
  Ok(PageReport { path: path.to_string(), file, bytes })
}
