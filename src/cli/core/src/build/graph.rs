/* src/cli/core/src/build/graph.rs */

use std::collections::BTreeSet;

use super::manifest::ModuleManifest;

/// Every module reachable from `entries` through `dynamicImports`, the entries
/// themselves included. Cycles terminate on the visited set.
pub fn collect_modules<'a, I>(manifest: &ModuleManifest, entries: I) -> BTreeSet<String>
where
  I: IntoIterator<Item = &'a str>,
{
  let mut visited = BTreeSet::new();
  let mut stack: Vec<&str> = entries.into_iter().collect();
  stack.reverse();

  while let Some(id) = stack.pop() {
    if !visited.insert(id.to_string()) {
      continue;
    }
    if let Some(chunk) = manifest.get(id) {
      stack.extend(chunk.dynamic_imports.iter().rev().map(String::as_str));
    }
  }
  visited
}
