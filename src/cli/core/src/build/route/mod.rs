/* src/cli/core/src/build/route/mod.rs */

mod discover;
mod select;
mod tree;


pub use discover::discover_routes;
pub use select::{PathFilter, select_paths};
pub use tree::RoutePaths;
#[cfg(test)]
pub use tree::RouteTree;
