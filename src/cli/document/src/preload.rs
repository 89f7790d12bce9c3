/* src/cli/document/src/preload.rs */

use std::collections::HashSet;

use crate::document::find_tag_at;

/// Link element for one emitted file: module scripts are preloaded, stylesheets
/// linked. Other asset kinds get no hint.
pub fn preload_link(file: &str) -> Option<String> {
  if file.ends_with(".js") || file.ends_with(".mjs") {
    Some(format!(r#"<link rel="modulepreload" crossorigin href="{file}">"#))
  } else if file.ends_with(".css") {
    Some(format!(r#"<link rel="stylesheet" href="{file}">"#))
  } else {
    None
  }
}

/// Append preload links for `files` to the document head, in order.
///
/// Files already referenced from the head (by an existing `href`) and repeated
/// files are skipped, so applying the same set twice is a no-op.
pub fn render_preload_links<'a, I>(html: &str, files: I) -> String
where
  I: IntoIterator<Item = &'a str>,
{
  let lower = html.to_ascii_lowercase();
  let head_close = lower.find("</head>");
  let head = match (find_tag_at(&lower, "<head", 0), head_close) {
    (Some(open), Some(close)) if open < close => &html[open..close],
    _ => "",
  };

  let mut seen = HashSet::new();
  let mut links = String::new();
  for file in files {
    if !seen.insert(file) || head_links_to(head, file) {
      continue;
    }
    if let Some(link) = preload_link(file) {
      links.push_str(&link);
    }
  }
  if links.is_empty() {
    return html.to_string();
  }

  match head_close {
    Some(at) => format!("{}{links}{}", &html[..at], &html[at..]),
    None => {
      // Headless fragment: open a head right after `<html ...>` or at the very start.
      let insert_at = find_tag_at(&lower, "<html", 0)
        .and_then(|at| html[at..].find('>').map(|close| at + close + 1))
        .unwrap_or(0);
      format!("{}<head>{links}</head>{}", &html[..insert_at], &html[insert_at..])
    }
  }
}

fn head_links_to(head: &str, file: &str) -> bool {
  head.contains(&format!(r#"href="{file}""#)) || head.contains(&format!("href='{file}'"))
}

#[cfg(test)]
mod tests {
  use super::*;

  const DOC: &str = "<html><head><title>t</title></head><body></body></html>";

  #[test]
  fn js_and_css_links() {
    let html = render_preload_links(DOC, ["/assets/a.js", "/assets/a.css"]);
    assert_eq!(
      html,
      concat!(
        "<html><head><title>t</title>",
        r#"<link rel="modulepreload" crossorigin href="/assets/a.js">"#,
        r#"<link rel="stylesheet" href="/assets/a.css">"#,
        "</head><body></body></html>"
      )
    );
  }

  #[test]
  fn other_assets_are_skipped() {
    assert_eq!(render_preload_links(DOC, ["/assets/logo.svg"]), DOC);
  }

  #[test]
  fn existing_links_are_not_duplicated() {
    let doc = r#"<html><head><link rel="stylesheet" href="/assets/a.css"></head><body></body></html>"#;
    assert_eq!(render_preload_links(doc, ["/assets/a.css"]), doc);
  }

  #[test]
  fn repeated_files_once() {
    let html = render_preload_links(DOC, ["/a.js", "/a.js"]);
    assert_eq!(html.matches("modulepreload").count(), 1);
  }

  #[test]
  fn idempotent() {
    let once = render_preload_links(DOC, ["/a.js", "/b.css"]);
    let twice = render_preload_links(&once, ["/a.js", "/b.css"]);
    assert_eq!(once, twice);
  }

  #[test]
  fn body_links_do_not_count_as_present() {
    let doc = r#"<html><head></head><body><a href="/a.js"></a></body></html>"#;
    assert!(render_preload_links(doc, ["/a.js"]).contains("modulepreload"));
  }

  #[test]
  fn headless_document_gets_a_head() {
    let html = render_preload_links("<html><body></body></html>", ["/a.js"]);
    assert_eq!(
      html,
      r#"<html><head><link rel="modulepreload" crossorigin href="/a.js"></head><body></body></html>"#
    );
  }
}
