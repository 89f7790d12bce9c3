/* src/cli/core/src/build/route/discover.rs */

use crate::app::ServerApp;
use crate::build::error::BuildError;

use super::tree::RouteTree;

/// Build the route tree and run every loader exactly once, including loaders of
/// routes that earlier loaders revealed. Any loader failure aborts discovery.
pub async fn discover_routes(app: &dyn ServerApp) -> Result<RouteTree, BuildError> {
  let specs = app
    .routes()
    .await
    .map_err(|cause| BuildError::Discovery { route: "(routes)".to_string(), cause })?;
  let mut tree = RouteTree::from_specs(&specs);

  loop {
    let pending = tree.pending_loaders();
    if pending.is_empty() {
      break;
    }
    for id in pending {
      let node = tree.node(id);
      let key = node.loader.clone().unwrap_or_default();
      let route = node.path.clone().unwrap_or_else(|| format!("(loader {key})"));
      tracing::debug!(%route, %key, "running route loader");
      let output = app.load(&key).await.map_err(|cause| BuildError::Discovery { route, cause })?;
      tree.apply_loader(id, &output);
    }
  }

  tracing::debug!(nodes = tree.len(), "route tree resolved");
  Ok(tree)
}
