/* src/cli/core/src/main.rs */

mod app;
mod build;
mod bundler;
mod clean;
mod config;
mod logging;
mod shell;
mod ui;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ssg_document::Formatting;

use app::NodeLoader;
use build::{BuildPlan, BuildReport, CommandHooks, NoopHooks, Pipeline, RenderHooks, WATCHDOG_AFTER, run_build};
use bundler::CommandBundler;
use config::{DirStyle, SsgConfig, find_ssg_config, load_ssg_config};

#[derive(Parser)]
#[command(name = "ssg", about = "Static pre-rendering for client-routed single-page apps", version)]
struct Cli {
  /// Debug logging for ssg itself (RUST_LOG is honored otherwise)
  #[arg(short, long, global = true)]
  verbose: bool,
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Bundle the app and pre-render every static route
  Build {
    /// Path to ssg.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Pages rendered at the same time
    #[arg(long)]
    concurrency: Option<usize>,
    /// none, minify or prettify
    #[arg(long, value_parser = parse_formatting)]
    formatting: Option<Formatting>,
    /// flat (about.html) or nested (about/index.html)
    #[arg(long, value_parser = parse_dir_style)]
    dir_style: Option<DirStyle>,
  },
  /// Remove the pre-rendered output and temporary server builds
  Clean {
    /// Path to ssg.toml (auto-detected if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,
  },
}

fn parse_formatting(s: &str) -> Result<Formatting, String> {
  match s.to_ascii_lowercase().as_str() {
    "none" => Ok(Formatting::None),
    "minify" => Ok(Formatting::Minify),
    "prettify" => Ok(Formatting::Prettify),
    other => Err(format!("unknown formatting \"{other}\" (expected none, minify or prettify)")),
  }
}

fn parse_dir_style(s: &str) -> Result<DirStyle, String> {
  match s.to_ascii_lowercase().as_str() {
    "flat" => Ok(DirStyle::Flat),
    "nested" => Ok(DirStyle::Nested),
    other => Err(format!("unknown dir style \"{other}\" (expected flat or nested)")),
  }
}

/// Resolve config path (explicit or auto-detected) and parse it
fn resolve_config(explicit: Option<PathBuf>) -> Result<(PathBuf, SsgConfig)> {
  let path = match explicit {
    Some(p) => p,
    None => {
      let cwd = std::env::current_dir().context("failed to get cwd")?;
      find_ssg_config(&cwd)?
    }
  };
  let config = load_ssg_config(&path)?;
  Ok((path, config))
}

fn base_dir_of(config_path: &Path) -> &Path {
  match config_path.parent() {
    Some(dir) if !dir.as_os_str().is_empty() => dir,
    _ => Path::new("."),
  }
}

fn print_summary(report: &BuildReport) {
  tracing::debug!(render_peak = report.render_peak, critical_peak = ?report.critical_peak, "queue peaks");
  let bytes: u64 = report.pages.iter().map(|page| page.bytes).sum();
  ui::summary(report.pages.len(), bytes, report.elapsed);
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  logging::init(cli.verbose);

  match cli.command {
    Command::Build { config, concurrency, formatting, dir_style } => {
      let (config_path, mut ssg_config) = resolve_config(config)?;
      let base_dir = base_dir_of(&config_path);
      if let Some(concurrency) = concurrency {
        ssg_config.build.concurrency = concurrency;
      }
      if let Some(formatting) = formatting {
        ssg_config.build.formatting = formatting;
      }
      if let Some(dir_style) = dir_style {
        ssg_config.build.dir_style = dir_style;
      }
      ssg_config.validate()?;

      ui::banner("build");
      let plan = BuildPlan::new(base_dir, ssg_config.build);
      tracing::debug!(root = %plan.root.display(), out_dir = %plan.out_dir.display(), mode = %plan.mode, "build plan");
      let hooks: Arc<dyn RenderHooks> = if ssg_config.hooks.is_empty() {
        Arc::new(NoopHooks)
      } else {
        Arc::new(CommandHooks::new(plan.root.clone(), ssg_config.hooks))
      };
      let pipeline = Pipeline {
        bundler: Arc::new(CommandBundler::new(ssg_config.bundler.clone())),
        loader: Arc::new(NodeLoader::new(ssg_config.bundler.node, plan.build.mock, plan.root.clone())),
        hooks,
        watchdog: Some(WATCHDOG_AFTER),
      };

      let report = run_build(&plan, &pipeline).await?;
      print_summary(&report);
    }
    Command::Clean { config } => {
      let (config_path, ssg_config) = resolve_config(config)?;
      let plan = BuildPlan::new(base_dir_of(&config_path), ssg_config.build);
      clean::run_clean(&plan.root, &plan.out_dir)?;
    }
  }

  Ok(())
}
