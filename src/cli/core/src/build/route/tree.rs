/* src/cli/core/src/build/route/tree.rs */

// Route tree kept as an arena: nodes are addressed by index and loader
// results are appended as new children of the node that produced them.

use std::collections::{BTreeSet, HashMap};

use crate::app::{LoaderOutput, RouteSpec};

pub type NodeId = usize;

#[derive(Debug, Clone, Default)]
pub struct RouteNode {
  pub path: Option<String>,
  pub index: bool,
  pub entry: Option<String>,
  pub loader: Option<String>,
  pub static_paths: Vec<String>,
  pub children: Vec<NodeId>,
  /// The loader has run; it never runs twice.
  pub loaded: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RouteTree {
  nodes: Vec<RouteNode>,
  roots: Vec<NodeId>,
}

/// Every static path a tree yields, in discovery order, with the chunks each one touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutePaths {
  pub paths: Vec<String>,
  pub path_to_entry: HashMap<String, BTreeSet<String>>,
}

impl RoutePaths {
  fn add(&mut self, path: String, entries: &BTreeSet<String>) {
    match self.path_to_entry.get_mut(&path) {
      Some(existing) => existing.extend(entries.iter().cloned()),
      None => {
        self.path_to_entry.insert(path.clone(), entries.clone());
        self.paths.push(path);
      }
    }
  }
}

impl RouteTree {
  pub fn from_specs(specs: &[RouteSpec]) -> Self {
    let mut tree = Self::default();
    for spec in specs {
      let id = tree.push(spec);
      tree.roots.push(id);
    }
    tree
  }

  fn push(&mut self, spec: &RouteSpec) -> NodeId {
    let id = self.nodes.len();
    self.nodes.push(RouteNode {
      path: spec.path.clone(),
      index: spec.index,
      entry: spec.entry.clone(),
      loader: spec.loader.clone(),
      static_paths: spec.static_paths.clone(),
      children: Vec::new(),
      loaded: false,
    });
    for child in &spec.children {
      let child_id = self.push(child);
      self.nodes[id].children.push(child_id);
    }
    id
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn node(&self, id: NodeId) -> &RouteNode {
    &self.nodes[id]
  }

  /// Nodes whose loader has not run yet, in depth-first declaration order.
  pub fn pending_loaders(&self) -> Vec<NodeId> {
    let mut pending = Vec::new();
    let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
      let node = &self.nodes[id];
      if node.loader.is_some() && !node.loaded {
        pending.push(id);
      }
      stack.extend(node.children.iter().rev().copied());
    }
    pending
  }

  /// Record a loader's result on `id` and mark it loaded.
  pub fn apply_loader(&mut self, id: NodeId, output: &LoaderOutput) {
    for child in &output.children {
      let child_id = self.push(child);
      self.nodes[id].children.push(child_id);
    }
    let node = &mut self.nodes[id];
    node.static_paths.extend(output.static_paths.iter().cloned());
    if node.entry.is_none() {
      node.entry.clone_from(&output.entry);
    }
    node.loaded = true;
  }

  /// Flatten the tree into static paths. An empty tree still yields `/`.
  pub fn collect_paths(&self) -> RoutePaths {
    let mut out = RoutePaths::default();
    if self.roots.is_empty() {
      out.add("/".to_string(), &BTreeSet::new());
      return out;
    }
    for &id in &self.roots {
      self.walk(id, "", &BTreeSet::new(), &mut out);
    }
    out
  }

  fn walk(&self, id: NodeId, prefix: &str, inherited: &BTreeSet<String>, out: &mut RoutePaths) {
    let node = &self.nodes[id];
    let mut entries = inherited.clone();
    if let Some(entry) = &node.entry {
      entries.insert(entry.clone());
    }

    let own_path = node.path.as_deref().map(|p| join_path(prefix, p));
    if let Some(path) = &own_path {
      out.add(normalize(path), &entries);
    }
    if node.index {
      out.add(normalize(prefix), &entries);
    }
    // Relative static paths resolve against the parent, like sibling routes.
    for static_path in &node.static_paths {
      out.add(normalize(&join_path(prefix, static_path)), &entries);
    }

    let child_prefix = own_path.as_deref().unwrap_or(prefix);
    for &child in &node.children {
      self.walk(child, child_prefix, &entries, out);
    }
  }
}

/// Child paths are relative to their parent unless they start with `/`.
fn join_path(prefix: &str, path: &str) -> String {
  let prefix = prefix.trim_end_matches('/');
  if path.starts_with('/') || prefix.is_empty() {
    return path.to_string();
  }
  if path.is_empty() { prefix.to_string() } else { format!("{prefix}/{path}") }
}

fn normalize(path: &str) -> String {
  if path.is_empty() {
    "/".to_string()
  } else if path.starts_with('/') {
    path.to_string()
  } else {
    format!("/{path}")
  }
}
