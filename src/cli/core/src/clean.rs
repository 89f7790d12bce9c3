/* src/cli/core/src/clean.rs */

// `ssg clean` command: removes the pre-rendered output and any temporary
// server build left behind by an interrupted run.

use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::build::TEMP_DIR;
use crate::ui;

pub fn run_clean(root: &Path, out_dir: &Path) -> Result<()> {
  ui::arrow("cleaning project");
  guard_out_dir(root, out_dir)?;
  delete_dir_if_exists(out_dir)?;
  delete_dir_if_exists(&root.join(TEMP_DIR))?;
  ui::ok("clean complete");
  Ok(())
}

/// Refuse to delete an output directory that contains the project itself.
fn guard_out_dir(root: &Path, out_dir: &Path) -> Result<()> {
  let (Ok(root), Ok(out)) = (root.canonicalize(), out_dir.canonicalize()) else {
    return Ok(());
  };
  if root.starts_with(&out) {
    bail!("refusing to delete {}: it contains the project root", out.display());
  }
  Ok(())
}

fn delete_dir_if_exists(path: &Path) -> Result<()> {
  if path.exists() {
    std::fs::remove_dir_all(path).with_context(|| format!("failed to remove {}", path.display()))?;
    ui::detail(&format!("deleted {}", path.display()));
  }
  Ok(())
}
