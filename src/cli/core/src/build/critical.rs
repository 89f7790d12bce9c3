/* src/cli/core/src/build/critical.rs */

// Critical CSS: stylesheets linked from the head are pruned to the rules the
// page can use, inlined, and their links deferred so they stop blocking render.

use std::collections::HashSet;
use std::path::{Component as PathComponent, Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use lightningcss::rules::CssRule;
use lightningcss::selector::Component;
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use regex::Regex;

use crate::config::{CrittersOptions, PreloadStrategy};

fn link_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r"(?is)<link\b[^>]*>").unwrap())
}

fn attr_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#"(?is)\s([a-z-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

fn class_re() -> &'static Regex {
  static RE: OnceLock<Regex> = OnceLock::new();
  RE.get_or_init(|| Regex::new(r#"(?is)\sclass\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap())
}

#[derive(Debug)]
struct StylesheetLink {
  start: usize,
  end: usize,
  href: String,
}

fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
  attr_re().captures_iter(tag).find_map(|caps| {
    let key = caps.get(1)?.as_str();
    if !key.eq_ignore_ascii_case(name) {
      return None;
    }
    caps.get(2).or_else(|| caps.get(3)).map(|m| m.as_str())
  })
}

/// Byte ranges of `<noscript>` elements; links inside them are fallbacks.
fn noscript_spans(lower: &str) -> Vec<(usize, usize)> {
  let mut spans = Vec::new();
  let mut pos = 0;
  while let Some(found) = lower[pos..].find("<noscript") {
    let start = pos + found;
    let end = lower[start..].find("</noscript>").map_or(lower.len(), |e| start + e);
    spans.push((start, end));
    pos = end.max(start + 1);
  }
  spans
}

/// Render-blocking stylesheet links in the head. Links already deferred
/// (carrying `media` or `onload`, or sitting in `<noscript>`) are left alone.
fn head_stylesheets(html: &str) -> Vec<StylesheetLink> {
  let lower = html.to_ascii_lowercase();
  let head_end = lower.find("</head>").unwrap_or(html.len());
  let fallbacks = noscript_spans(&lower[..head_end]);
  link_re()
    .find_iter(&html[..head_end])
    .filter(|m| !fallbacks.iter().any(|&(start, end)| m.start() > start && m.start() < end))
    .filter_map(|m| {
      let tag = m.as_str();
      let rel = attr(tag, "rel")?;
      if !rel.eq_ignore_ascii_case("stylesheet") || attr(tag, "media").is_some() || attr(tag, "onload").is_some() {
        return None;
      }
      let href = attr(tag, "href")?.to_string();
      Some(StylesheetLink { start: m.start(), end: m.end(), href })
    })
    .collect()
}

fn used_classes(html: &str) -> HashSet<String> {
  class_re()
    .captures_iter(html)
    .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
    .flat_map(|m| m.as_str().split_whitespace().map(str::to_string).collect::<Vec<_>>())
    .collect()
}

pub struct Critters {
  out_dir: PathBuf,
  base: String,
  options: CrittersOptions,
}

impl Critters {
  pub fn new(out_dir: PathBuf, base: &str, options: CrittersOptions) -> Self {
    Self { out_dir, base: base.to_string(), options }
  }

  /// Local file behind a stylesheet `href`; `None` for remote or unsafe URLs.
  fn sheet_path(&self, href: &str) -> Option<PathBuf> {
    if href.contains("://") || href.starts_with("//") || href.starts_with("data:") {
      return None;
    }
    let href = href.split(['?', '#']).next().unwrap_or(href);
    let base = self.base.trim_end_matches('/');
    let rel = if base.is_empty() { href } else { href.strip_prefix(base).unwrap_or(href) };
    let rel = Path::new(rel.trim_start_matches('/'));
    if rel.components().any(|c| !matches!(c, PathComponent::Normal(_))) {
      return None;
    }
    Some(self.out_dir.join(rel))
  }

  pub fn process(&self, html: &str) -> Result<String> {
    if !self.options.external {
      return Ok(html.to_string());
    }
    let links = head_stylesheets(html);
    if links.is_empty() {
      return Ok(html.to_string());
    }

    let used = used_classes(html);
    let used: HashSet<&str> = used.iter().map(String::as_str).collect();
    let mut out = html.to_string();
    let mut body_links = Vec::new();

    // Back to front so earlier offsets stay valid.
    for link in links.iter().rev() {
      let Some(file) = self.sheet_path(&link.href) else {
        tracing::debug!(href = %link.href, "skipping non-local stylesheet");
        continue;
      };
      let css = match std::fs::read_to_string(&file) {
        Ok(css) => css,
        Err(e) => {
          tracing::warn!(href = %link.href, file = %file.display(), error = %e, "stylesheet not readable, skipping");
          continue;
        }
      };

      let inline_whole = self.options.inline_threshold > 0 && css.len() as u64 <= self.options.inline_threshold;
      let replacement = if inline_whole {
        let inlined = if self.options.compress { minify_css(&css) } else { Ok(css) };
        format!("<style>{}</style>", inlined.with_context(|| format!("failed to inline {}", link.href))?)
      } else {
        let critical = prune_css(&css, &used, self.options.compress)
          .with_context(|| format!("failed to extract critical CSS from {}", link.href))?;
        let style = if critical.is_empty() { String::new() } else { format!("<style>{critical}</style>") };
        let href = &link.href;
        match self.options.preload {
          PreloadStrategy::Media => format!(
            r#"{style}<link rel="stylesheet" href="{href}" media="print" onload="this.media='all'"><noscript><link rel="stylesheet" href="{href}"></noscript>"#
          ),
          PreloadStrategy::Swap => format!(
            r#"{style}<link rel="preload" href="{href}" as="style" onload="this.rel='stylesheet'"><noscript><link rel="stylesheet" href="{href}"></noscript>"#
          ),
          PreloadStrategy::Body => {
            body_links.push(format!(r#"<link rel="stylesheet" href="{href}">"#));
            style
          }
        }
      };
      out.replace_range(link.start..link.end, &replacement);
    }

    if !body_links.is_empty() {
      body_links.reverse();
      let links = body_links.concat();
      match out.to_ascii_lowercase().rfind("</body>") {
        Some(at) => out.insert_str(at, &links),
        None => out.push_str(&links),
      }
    }
    Ok(out)
  }
}

/// Parse, optionally minify, and print a stylesheet.
fn print_css(css: &str, minify: bool, used: Option<&HashSet<&str>>) -> Result<String> {
  let mut sheet = StyleSheet::parse(css, ParserOptions::default())
    .map_err(|e| anyhow!("CSS parse error: {e:?}"))?;
  if let Some(used) = used {
    prune_rules(&mut sheet.rules.0, used);
  }
  if minify {
    sheet.minify(MinifyOptions::default()).map_err(|e| anyhow!("CSS minify error: {e:?}"))?;
  }
  let printed = sheet
    .to_css(PrinterOptions { minify, ..PrinterOptions::default() })
    .map_err(|e| anyhow!("CSS print error: {e:?}"))?;
  Ok(printed.code.trim().to_string())
}

fn minify_css(css: &str) -> Result<String> {
  print_css(css, true, None)
}

/// Rules whose selectors can match the page. Selectors without classes are kept.
pub fn prune_css(css: &str, used: &HashSet<&str>, minify: bool) -> Result<String> {
  print_css(css, minify, Some(used))
}

fn prune_rules(rules: &mut Vec<CssRule<'_>>, used: &HashSet<&str>) {
  rules.retain_mut(|rule| match rule {
    CssRule::Style(style) => {
      style.selectors.0.retain(|selector| is_selector_used(selector, used));
      !style.selectors.0.is_empty()
    }
    CssRule::Media(media) => {
      prune_rules(&mut media.rules.0, used);
      !media.rules.0.is_empty()
    }
    CssRule::Supports(supports) => {
      prune_rules(&mut supports.rules.0, used);
      !supports.rules.0.is_empty()
    }
    // Keyframes, font faces and other at-rules are kept.
    _ => true,
  });
}

/// Kept when it names no class, or at least one used class.
fn is_selector_used(selector: &lightningcss::selector::Selector<'_>, used: &HashSet<&str>) -> bool {
  let mut has_classes = false;
  for component in selector.iter() {
    if let Component::Class(ident) = component {
      has_classes = true;
      if used.contains(ident.as_ref()) {
        return true;
      }
    }
  }
  !has_classes
}
