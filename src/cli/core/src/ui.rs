/* src/cli/core/src/ui.rs */

// Console output for humans. Diagnostics go through `tracing` instead.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Indent of lines that belong to the current stage.
const NEST: &str = "        ";

/// The stages of `ssg build`, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Client,
  Server,
  Routes,
  Render,
}

impl Stage {
  const ALL: [Stage; 4] = [Stage::Client, Stage::Server, Stage::Routes, Stage::Render];

  fn number(self) -> usize {
    Self::ALL.iter().position(|s| *s == self).map_or(0, |i| i + 1)
  }
}

/// Colors only when stdout is a terminal and `NO_COLOR` is unset.
fn colors() -> bool {
  static COLORS: OnceLock<bool> = OnceLock::new();
  *COLORS.get_or_init(|| std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal())
}

fn paint(style: &str, text: &str) -> String {
  if colors() {
    format!("{style}{text}{RESET}")
  } else {
    text.to_string()
  }
}

pub fn banner(cmd: &str) {
  println!();
  println!("  {} {cmd} {}", paint(BOLD, "ssg"), paint(DIM, &format!("v{VERSION}")));
  println!();
}

pub fn stage(stage: Stage, msg: &str) {
  let counter = format!("[{}/{}]", stage.number(), Stage::ALL.len());
  println!("  {} {msg}...", paint(BOLD, &counter));
}

pub fn ok(msg: &str) {
  println!("  {} {msg}", paint(GREEN, "\u{2713}"));
}

pub fn warn(msg: &str) {
  eprintln!("  {} {msg}", paint(YELLOW, "!"));
}

pub fn arrow(msg: &str) {
  println!("  {} {msg}", paint(GREEN, "\u{2192}"));
}

pub fn detail(msg: &str) {
  println!("{NEST}{msg}");
}

pub fn detail_ok(msg: &str) {
  println!("{NEST}{} {msg}", paint(GREEN, "\u{2713}"));
}

/// Echo of a shell command about to run.
pub fn command(cmd: &str) {
  println!("{NEST}{}", paint(DIM, cmd));
}

/// One line per written page: `dist/about.html   1.2 kB`.
pub fn page(out_dir: &str, file: &str, bytes: u64) {
  println!(
    "{NEST}{}{}  {}",
    paint(DIM, &format!("{out_dir}/")),
    paint(CYAN, &format!("{file:<15}")),
    paint(DIM, &format_size(bytes))
  );
}

pub fn page_failed(path: &str) {
  eprintln!("{NEST}{} Error on page: {path}", paint(RED, "\u{2717}"));
}

pub fn summary(pages: usize, bytes: u64, elapsed: Duration) {
  let noun = if pages == 1 { "page" } else { "pages" };
  arrow(&format!("{pages} {noun}, {} in {:.1}s", format_size(bytes), elapsed.as_secs_f64()));
  blank();
}

#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
  match bytes {
    1_000_000.. => format!("{:.1} MB", bytes as f64 / 1_000_000.0),
    1_000.. => format!("{:.1} kB", bytes as f64 / 1_000.0),
    _ => format!("{bytes} B"),
  }
}

pub fn blank() {
  println!();
}
