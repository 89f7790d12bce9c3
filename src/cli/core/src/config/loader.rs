/* src/cli/core/src/config/loader.rs */

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::SsgConfig;

pub const CONFIG_FILE: &str = "ssg.toml";

/// Walk upward from `start` to find `ssg.toml`, like Cargo.toml discovery
pub fn find_ssg_config(start: &Path) -> Result<PathBuf> {
  let mut dir =
    start.canonicalize().with_context(|| format!("failed to canonicalize {}", start.display()))?;
  loop {
    let candidate = dir.join(CONFIG_FILE);
    if candidate.is_file() {
      return Ok(candidate);
    }
    if !dir.pop() {
      bail!("{CONFIG_FILE} not found (searched upward from {})", start.display());
    }
  }
}

pub fn load_ssg_config(path: &Path) -> Result<SsgConfig> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  parse_ssg_config(&content).with_context(|| format!("failed to parse {}", path.display()))
}

pub fn parse_ssg_config(content: &str) -> Result<SsgConfig> {
  let config: SsgConfig = toml::from_str(content)?;
  config.validate()?;
  Ok(config)
}
