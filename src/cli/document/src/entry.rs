/* src/cli/document/src/entry.rs */

use std::sync::OnceLock;

use regex::Regex;

pub const DEFAULT_ENTRY: &str = "src/main.ts";

fn script_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?is)<script\b([^>]*)>").unwrap())
}

fn src_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#"\ssrc\s*=\s*["']([^"']+)["']"#).unwrap())
}

/// Client entry referenced by the project's `index.html`: the `src` of the first
/// `<script type="module">`, relative to the project root.
pub fn detect_entry(index_html: &str) -> String {
  script_re()
    .captures_iter(index_html)
    .filter_map(|caps| caps.get(1))
    .map(|attrs| attrs.as_str())
    .filter(|attrs| is_module_script(attrs))
    .find_map(|attrs| src_re().captures(attrs).and_then(|c| c.get(1)))
    .map(|m| m.as_str().trim_start_matches('/').to_string())
    .unwrap_or_else(|| DEFAULT_ENTRY.to_string())
}

fn is_module_script(attrs: &str) -> bool {
  let lower = attrs.to_ascii_lowercase();
  lower.contains(r#"type="module""#) || lower.contains("type='module'")
}
