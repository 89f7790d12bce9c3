/* src/cli/core/src/build/output.rs */

use crate::config::DirStyle;

/// Output file for a route, relative to the output directory and `/`-separated.
///
/// `flat`: `/` -> `index.html`, `/about` -> `about.html`, `/blog/` -> `blog/index.html`.
/// `nested`: every route gets its own directory, `/about` -> `about/index.html`.
pub fn page_file(path: &str, style: DirStyle) -> String {
  match style {
    DirStyle::Flat => {
      let route = if path.ends_with('/') { format!("{path}index") } else { path.to_string() };
      format!("{}.html", route.trim_start_matches('/'))
    }
    DirStyle::Nested => {
      let dir = path.trim_matches('/');
      if dir.is_empty() { "index.html".to_string() } else { format!("{dir}/index.html") }
    }
  }
}
