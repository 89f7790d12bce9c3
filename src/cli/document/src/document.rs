/* src/cli/document/src/document.rs */

use anyhow::{Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// How the shell's module script tags are annotated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
  #[default]
  Sync,
  Defer,
  Async,
}

impl ScriptMode {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Sync => "sync",
      Self::Defer => "defer",
      Self::Async => "async",
    }
  }
}

/// Annotate every `<script type="module" ...>` in the shell with `defer` or `async`.
/// `sync` leaves the template untouched.
pub fn rewrite_scripts(index_html: &str, mode: ScriptMode) -> String {
  match mode {
    ScriptMode::Sync => index_html.to_string(),
    ScriptMode::Defer | ScriptMode::Async => index_html.replace(
      r#"<script type="module" "#,
      &format!(r#"<script type="module" {} "#, mode.as_str()),
    ),
  }
}

/// Rendered pieces of one page, merged into the shell template by [`render_html`].
#[derive(Debug, Clone, Copy)]
pub struct PageParts<'a> {
  pub root_id: &'a str,
  pub app_html: &'a str,
  pub html_attrs: &'a str,
  pub body_attrs: &'a str,
  pub head_tags: &'a [String],
  /// Already-serialized state, see [`serialize_state`].
  pub initial_state: Option<&'a str>,
}

/// Merge a rendered page into the shell template.
///
/// Attributes land on the first `<html` / `<body` tags, head fragments right after
/// the opening `<head>`. The empty container `<div id="{root_id}"></div>` is replaced
/// directly; otherwise the element carrying that id is located and its content
/// replaced. A template without such an element is an error.
pub fn render_html(index_html: &str, page: &PageParts<'_>) -> Result<String> {
  let state_script = page
    .initial_state
    .map(|state| format!("\n<script>window.__INITIAL_STATE__={state}</script>"))
    .unwrap_or_default();

  let html = with_attrs(index_html, "html", page.html_attrs);
  let html = insert_after_open_tag(&html, "head", &page.head_tags.concat());
  let html = with_attrs(&html, "body", page.body_attrs);

  let container = format!(r#"<div id="{}"></div>"#, page.root_id);
  if let Some(start) = html.find(&container) {
    let rendered = format!(
      r#"<div id="{}" data-server-rendered="true">{}</div>{state_script}"#,
      page.root_id, page.app_html
    );
    return Ok(splice(&html, start, start + container.len(), &rendered));
  }

  let Some(el) = find_element_by_id(&html, page.root_id) else {
    bail!(
      "could not find a tag with id=\"{}\" to replace with the server-rendered HTML",
      page.root_id
    );
  };
  let open_tag = html[el.start..el.open_end].trim_end_matches('>').trim_end_matches('/').trim_end();
  let rendered = format!(
    r#"{open_tag} data-server-rendered="true">{}</{}>{state_script}"#,
    page.app_html, el.name
  );
  Ok(splice(&html, el.start, el.end, &rendered))
}

/// Splice a collected style block right after the opening `<head>` tag.
pub fn inject_style_tag(html: &str, style_tag: &str) -> String {
  insert_after_open_tag(html, "head", style_tag)
}

/// Escape serialized JSON so it can be embedded inside an inline `<script>`.
pub fn serialize_state(json: &str) -> String {
  json.replace('<', "\\u003C").replace('\u{2028}', "\\u2028").replace('\u{2029}', "\\u2029")
}

// -- Tag scanning helpers --

fn splice(html: &str, start: usize, end: usize, replacement: &str) -> String {
  let mut out = String::with_capacity(html.len() + replacement.len());
  out.push_str(&html[..start]);
  out.push_str(replacement);
  out.push_str(&html[end..]);
  out
}

/// Byte offset of the first `<{name}` that is a whole tag name (not `<header` for `head`).
pub(crate) fn find_open_tag(html: &str, name: &str) -> Option<usize> {
  let lower = html.to_ascii_lowercase();
  find_tag_at(&lower, &format!("<{name}"), 0)
}

/// Like `str::find`, but only accepts a match followed by whitespace, `>` or `/`.
/// `haystack` must already be lowercased.
pub(crate) fn find_tag_at(haystack: &str, needle: &str, from: usize) -> Option<usize> {
  let mut pos = from;
  while let Some(found) = haystack.get(pos..)?.find(needle) {
    let at = pos + found;
    let next = haystack.as_bytes().get(at + needle.len()).copied();
    if matches!(next, None | Some(b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')) {
      return Some(at);
    }
    pos = at + needle.len();
  }
  None
}

fn with_attrs(html: &str, tag: &str, attrs: &str) -> String {
  let attrs = attrs.trim();
  if attrs.is_empty() {
    return html.to_string();
  }
  match find_open_tag(html, tag) {
    Some(at) => {
      let insert_at = at + tag.len() + 1;
      splice(html, insert_at, insert_at, &format!(" {attrs}"))
    }
    None => html.to_string(),
  }
}

fn insert_after_open_tag(html: &str, tag: &str, content: &str) -> String {
  if content.is_empty() {
    return html.to_string();
  }
  let Some(at) = find_open_tag(html, tag) else {
    return html.to_string();
  };
  match html[at..].find('>') {
    Some(close) => {
      let insert_at = at + close + 1;
      splice(html, insert_at, insert_at, content)
    }
    None => html.to_string(),
  }
}

const VOID_ELEMENTS: &[&str] = &[
  "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
  "wbr",
];

pub(crate) fn is_void_element(name: &str) -> bool {
  VOID_ELEMENTS.contains(&name)
}

struct ElementSpan {
  name: String,
  start: usize,
  open_end: usize,
  end: usize,
}

/// Locate the first element whose `id` attribute equals `id`, including its
/// matching closing tag (nested same-name elements are balanced).
fn find_element_by_id(html: &str, id: &str) -> Option<ElementSpan> {
  let pattern =
    format!(r#"<([A-Za-z][A-Za-z0-9-]*)\b[^>]*?\sid\s*=\s*["']{}["'][^>]*>"#, regex::escape(id));
  let re = Regex::new(&pattern).ok()?;
  let caps = re.captures(html)?;
  let whole = caps.get(0)?;
  let name = caps.get(1)?.as_str().to_ascii_lowercase();

  if whole.as_str().ends_with("/>") || is_void_element(&name) {
    return Some(ElementSpan { name, start: whole.start(), open_end: whole.end(), end: whole.end() });
  }

  let lower = html.to_ascii_lowercase();
  let open = format!("<{name}");
  let close = format!("</{name}");
  let mut depth = 1usize;
  let mut pos = whole.end();
  loop {
    let next_close = find_tag_at(&lower, &close, pos)?;
    match find_tag_at(&lower, &open, pos) {
      Some(next_open) if next_open < next_close => {
        depth += 1;
        pos = next_open + open.len();
      }
      _ => {
        depth -= 1;
        pos = next_close + close.len();
        if depth == 0 {
          let end = pos + lower[pos..].find('>')? + 1;
          return Some(ElementSpan { name, start: whole.start(), open_end: whole.end(), end });
        }
      }
    }
  }
}
