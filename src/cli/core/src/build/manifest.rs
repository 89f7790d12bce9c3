/* src/cli/core/src/build/manifest.rs */

// Client build outputs read once per build: the module manifest, the SSR
// manifest and the shell `index.html`.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use super::error::BuildError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestChunk {
  #[serde(default)]
  pub file: String,
  #[serde(default)]
  pub css: Vec<String>,
  #[serde(default)]
  pub assets: Vec<String>,
  #[serde(default)]
  pub dynamic_imports: Vec<String>,
  #[serde(default)]
  pub is_entry: bool,
}

/// Entry id -> emitted chunk.
pub type ModuleManifest = BTreeMap<String, ManifestChunk>;

/// Module id -> public URLs of the files it needs at runtime.
pub type SsrManifest = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone)]
pub struct ManifestBundle {
  pub modules: ModuleManifest,
  pub ssr: SsrManifest,
  pub index_html: String,
}

impl ManifestBundle {
  /// Public URLs for `modules`, in module order. The SSR manifest is preferred;
  /// modules it does not know fall back to the chunk's file and CSS under `base`.
  pub fn files_for(&self, modules: &BTreeSet<String>, base: &str) -> Vec<String> {
    let mut files = Vec::new();
    for id in modules {
      if let Some(urls) = self.ssr.get(id) {
        files.extend(urls.iter().cloned());
      } else if let Some(chunk) = self.modules.get(id) {
        if !chunk.file.is_empty() {
          files.push(with_base(base, &chunk.file));
        }
        files.extend(chunk.css.iter().map(|css| with_base(base, css)));
      }
    }
    files
  }
}

pub fn with_base(base: &str, file: &str) -> String {
  let base = base.trim_end_matches('/');
  format!("{base}/{}", file.trim_start_matches('/'))
}

/// `name` directly in the output directory, or under `.vite/` where newer
/// bundlers put their manifests.
fn locate(out_dir: &Path, name: &str) -> PathBuf {
  let direct = out_dir.join(name);
  if direct.is_file() {
    return direct;
  }
  let nested = out_dir.join(".vite").join(name);
  if nested.is_file() { nested } else { direct }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
  let content =
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
  serde_json::from_str(&content).context("invalid JSON")
}

pub fn load_manifests(out_dir: &Path) -> Result<ManifestBundle, BuildError> {
  let manifest_path = locate(out_dir, "manifest.json");
  let modules: ModuleManifest = read_json(&manifest_path)
    .map_err(|cause| BuildError::Manifest { path: manifest_path.clone(), cause })?;

  let ssr_path = locate(out_dir, "ssr-manifest.json");
  let ssr: SsrManifest =
    read_json(&ssr_path).map_err(|cause| BuildError::Manifest { path: ssr_path.clone(), cause })?;

  let index_path = out_dir.join("index.html");
  let index_html = std::fs::read_to_string(&index_path)
    .map_err(|e| BuildError::Manifest { path: index_path.clone(), cause: e.into() })?;

  let entries = modules.values().filter(|chunk| chunk.is_entry).count();
  let assets: usize = modules.values().map(|chunk| chunk.assets.len()).sum();
  tracing::debug!(modules = modules.len(), entries, assets, ssr_modules = ssr.len(), "manifests loaded");
  Ok(ManifestBundle { modules, ssr, index_html })
}
