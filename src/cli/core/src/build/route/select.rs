/* src/cli/core/src/build/route/select.rs */

use std::collections::HashSet;

/// Which of the discovered paths get rendered.
#[derive(Debug, Clone, Default)]
pub struct PathFilter<'a> {
  /// Render every discovered path, bypassing both filters below.
  pub include_all: bool,
  /// The server entry's own route list, when it exports one.
  pub entry_override: Option<Vec<String>>,
  /// Configured exclusions; a trailing `*` matches a prefix.
  pub exclude: &'a [String],
}

pub fn is_dynamic(path: &str) -> bool {
  path.contains(':') || path.contains('*')
}

fn excluded(path: &str, patterns: &[String]) -> bool {
  patterns.iter().any(|pattern| match pattern.strip_suffix('*') {
    Some(prefix) => path.starts_with(prefix),
    None => path == pattern,
  })
}

/// Route paths are absolute; entries listed without a leading `/` get one.
fn absolute(path: String) -> String {
  if path.starts_with('/') {
    path
  } else {
    format!("/{path}")
  }
}

/// Narrow `paths` with the filter, then drop dynamic patterns and duplicates.
/// The dynamic exclusion runs last so no filter can bring a pattern back.
pub fn select_paths(paths: Vec<String>, filter: PathFilter<'_>) -> Vec<String> {
  let narrowed = if filter.include_all {
    paths
  } else if let Some(list) = filter.entry_override {
    list.into_iter().map(absolute).collect()
  } else {
    paths.into_iter().filter(|p| !excluded(p, filter.exclude)).collect()
  };

  let mut seen = HashSet::new();
  narrowed.into_iter().filter(|p| !is_dynamic(p)).filter(|p| seen.insert(p.clone())).collect()
}
