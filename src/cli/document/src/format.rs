/* src/cli/document/src/format.rs */

// Output formatting for rendered pages: passthrough, whitespace-collapsing minifier,
// and an indenting pretty-printer. Both rewriters share one tolerant tokenizer and
// never touch the contents of raw-text elements.

use serde::{Deserialize, Serialize};

use crate::document::is_void_element;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Formatting {
  #[default]
  None,
  Minify,
  Prettify,
}

pub fn format_html(html: &str, formatting: Formatting) -> String {
  match formatting {
    Formatting::None => html.to_string(),
    Formatting::Minify => minify(html),
    Formatting::Prettify => prettify(html),
  }
}

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "pre", "textarea"];

const INLINE_ELEMENTS: &[&str] = &[
  "a", "abbr", "b", "bdi", "bdo", "button", "cite", "code", "data", "dfn", "em", "i", "img",
  "input", "kbd", "label", "mark", "q", "s", "samp", "select", "small", "span", "strong", "sub",
  "sup", "time", "u", "var",
];

#[derive(Debug, PartialEq)]
enum Token<'a> {
  /// `<!DOCTYPE ...>` and other `<!...>` declarations.
  Decl(&'a str),
  Comment(&'a str),
  Open { raw: &'a str, name: String, self_closing: bool },
  Close { raw: &'a str, name: String },
  Text(&'a str),
  /// Verbatim body of a raw-text element.
  Raw(&'a str),
}

impl Token<'_> {
  fn is_inline(&self) -> bool {
    match self {
      Token::Open { name, .. } | Token::Close { name, .. } => INLINE_ELEMENTS.contains(&name.as_str()),
      Token::Text(_) => true,
      _ => false,
    }
  }
}

fn tag_name(s: &str) -> String {
  s.chars()
    .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == ':')
    .collect::<String>()
    .to_ascii_lowercase()
}

/// End offset (exclusive) of the tag starting at `start`, skipping quoted attribute values.
fn tag_end(html: &str, start: usize) -> Option<usize> {
  let mut quote: Option<u8> = None;
  for (i, b) in html.as_bytes()[start + 1..].iter().copied().enumerate() {
    match (quote, b) {
      (Some(q), _) if b == q => quote = None,
      (Some(_), _) => {}
      (None, b'"' | b'\'') => quote = Some(b),
      (None, b'>') => return Some(start + 1 + i + 1),
      (None, _) => {}
    }
  }
  None
}

fn tokenize(html: &str) -> Vec<Token<'_>> {
  let bytes = html.as_bytes();
  let len = bytes.len();
  let lower = html.to_ascii_lowercase();
  let mut tokens = Vec::new();
  let mut pos = 0;

  while pos < len {
    if bytes[pos] != b'<' {
      let next = html[pos..].find('<').map_or(len, |i| pos + i);
      tokens.push(Token::Text(&html[pos..next]));
      pos = next;
      continue;
    }

    let rest = &html[pos..];
    if rest.starts_with("<!--") {
      let end = rest.find("-->").map_or(len, |e| pos + e + 3);
      tokens.push(Token::Comment(&html[pos..end]));
      pos = end;
      continue;
    }

    let next = bytes.get(pos + 1).copied().unwrap_or(b' ');
    let is_tag = next.is_ascii_alphabetic() || next == b'/' || next == b'!';
    let end = if is_tag { tag_end(html, pos) } else { None };
    let Some(end) = end else {
      // A lone `<` is text.
      tokens.push(Token::Text(&html[pos..pos + 1]));
      pos += 1;
      continue;
    };

    let raw = &html[pos..end];
    if next == b'!' {
      tokens.push(Token::Decl(raw));
      pos = end;
      continue;
    }
    if next == b'/' {
      tokens.push(Token::Close { raw, name: tag_name(&raw[2..]) });
      pos = end;
      continue;
    }

    let name = tag_name(&raw[1..]);
    let self_closing = raw.ends_with("/>") || is_void_element(&name);
    let raw_text = !self_closing && RAW_TEXT_ELEMENTS.contains(&name.as_str());
    tokens.push(Token::Open { raw, name: name.clone(), self_closing });
    pos = end;

    if raw_text {
      let close = format!("</{name}");
      let body_end = lower[pos..].find(&close).map_or(len, |i| pos + i);
      if body_end > pos {
        tokens.push(Token::Raw(&html[pos..body_end]));
      }
      pos = body_end;
    }
  }
  tokens
}

fn collapse_whitespace(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  let mut in_space = false;
  for c in text.chars() {
    if c.is_whitespace() {
      if !in_space {
        out.push(' ');
      }
      in_space = true;
    } else {
      out.push(c);
      in_space = false;
    }
  }
  out
}

/// Whether the nearest token in `tokens` that is not a comment or declaration
/// is inline content. Comments sit between text nodes without separating them.
fn nearest_is_inline<'t, 'a: 't>(mut tokens: impl Iterator<Item = &'t Token<'a>>) -> bool {
  tokens.find(|t| !matches!(t, Token::Comment(_) | Token::Decl(_))).is_some_and(Token::is_inline)
}

/// Collapse whitespace runs to a single space; drop whitespace that only separates
/// block-level tags. Raw-text element bodies are left untouched.
pub fn minify(html: &str) -> String {
  let tokens = tokenize(html);
  let mut out = String::with_capacity(html.len());

  for (i, token) in tokens.iter().enumerate() {
    match token {
      Token::Text(text) => {
        let prev_inline = nearest_is_inline(tokens[..i].iter().rev());
        let next_inline = nearest_is_inline(tokens[i + 1..].iter());
        let mut collapsed = collapse_whitespace(text);
        if collapsed == " " {
          if prev_inline && next_inline {
            out.push(' ');
          }
          continue;
        }
        if !prev_inline {
          collapsed = collapsed.trim_start().to_string();
        }
        if !next_inline {
          collapsed = collapsed.trim_end().to_string();
        }
        out.push_str(&collapsed);
      }
      Token::Decl(raw) | Token::Comment(raw) | Token::Raw(raw) => out.push_str(raw),
      Token::Open { raw, .. } | Token::Close { raw, .. } => out.push_str(raw),
    }
  }
  out.trim().to_string()
}

fn closing_raw<'a>(tokens: &[Token<'a>], at: usize, name: &str) -> Option<&'a str> {
  match tokens.get(at) {
    Some(Token::Close { raw, name: close }) if close == name => Some(raw),
    _ => None,
  }
}

/// End (exclusive) of the run of inline tokens and comments starting at `start`.
fn inline_run_end(tokens: &[Token<'_>], start: usize) -> usize {
  tokens[start..]
    .iter()
    .position(|t| !(t.is_inline() || matches!(t, Token::Comment(_))))
    .map_or(tokens.len(), |n| start + n)
}

/// Inline run joined as written, whitespace collapsed and trimmed at the edges only.
fn join_run(run: &[Token<'_>]) -> String {
  let mut line = String::new();
  for token in run {
    match token {
      Token::Text(text) => line.push_str(&collapse_whitespace(text)),
      Token::Comment(raw) | Token::Open { raw, .. } | Token::Close { raw, .. } => line.push_str(raw),
      Token::Decl(raw) | Token::Raw(raw) => line.push_str(raw),
    }
  }
  line.trim().to_string()
}

/// Block-level tags get their own line with two-space indentation. Runs of inline
/// content stay on one line exactly as joined in the source, so no whitespace is
/// added between inline nodes. A block element whose whole body is one inline run
/// stays on one line, and raw-text elements are emitted verbatim.
pub fn prettify(html: &str) -> String {
  let tokens = tokenize(html);
  let mut lines: Vec<String> = Vec::new();
  let mut depth = 0usize;
  let mut i = 0;

  while i < tokens.len() {
    let indent = "  ".repeat(depth);
    match &tokens[i] {
      token if token.is_inline() || matches!(token, Token::Comment(_)) => {
        let end = inline_run_end(&tokens, i);
        let line = join_run(&tokens[i..end]);
        if !line.is_empty() {
          lines.push(format!("{indent}{line}"));
        }
        i = end;
        continue;
      }
      Token::Decl(raw) | Token::Comment(raw) => lines.push(format!("{indent}{raw}")),
      Token::Open { raw, self_closing: true, .. } => lines.push(format!("{indent}{raw}")),
      Token::Open { raw, name, .. } => {
        if let (Some(Token::Raw(body)), Some(close)) = (tokens.get(i + 1), closing_raw(&tokens, i + 2, name)) {
          lines.push(format!("{indent}{raw}{body}{close}"));
          i += 3;
          continue;
        }
        // `<tag></tag>` and `<tag>inline run</tag>` stay on one line.
        let end = inline_run_end(&tokens, i + 1);
        if let Some(close) = closing_raw(&tokens, end, name) {
          let body = join_run(&tokens[i + 1..end]);
          lines.push(format!("{indent}{raw}{body}{close}"));
          i = end + 1;
          continue;
        }
        lines.push(format!("{indent}{raw}"));
        depth += 1;
      }
      Token::Close { raw, .. } => {
        depth = depth.saturating_sub(1);
        lines.push(format!("{}{raw}", "  ".repeat(depth)));
      }
      Token::Text(text) => lines.push(format!("{indent}{}", collapse_whitespace(text.trim()))),
      Token::Raw(raw) => lines.push((*raw).to_string()),
    }
    i += 1;
  }

  let mut out = lines.join("\n");
  out.push('\n');
  out
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE: &str = "<!DOCTYPE html>\n<html>\n  <head>\n    <title>  Home  </title>\n  </head>\n  <body>\n    <div id=\"root\">\n      <p>Hello   <b>big</b>   world</p>\n    </div>\n    <pre>  keep\n   this  </pre>\n    <script>  if (a  <  b) {}  </script>\n  </body>\n</html>\n";

  fn has_repeated_whitespace_between_tags(html: &str) -> bool {
    html.split('>').any(|chunk| {
      let between = chunk.split('<').next().unwrap_or("");
      between.contains("  ") || between.contains("\n\n") || between.contains(" \n") || between.contains("\n ")
    })
  }

  #[test]
  fn none_is_byte_identical() {
    assert_eq!(format_html(PAGE, Formatting::None), PAGE);
  }

  #[test]
  fn minify_collapses_whitespace_between_tags() {
    let out = format_html(PAGE, Formatting::Minify);
    assert!(out.starts_with("<!DOCTYPE html><html><head><title>Home</title></head><body>"));
    assert!(out.contains("<p>Hello <b>big</b> world</p>"));
    let outside_raw = out.replace("<pre>  keep\n   this  </pre>", "").replace("<script>  if (a  <  b) {}  </script>", "");
    assert!(!has_repeated_whitespace_between_tags(&outside_raw), "{out}");
  }

  #[test]
  fn minify_keeps_raw_text_bodies() {
    let out = minify(PAGE);
    assert!(out.contains("<pre>  keep\n   this  </pre>"));
    assert!(out.contains("<script>  if (a  <  b) {}  </script>"));
  }

  #[test]
  fn minify_keeps_space_between_inline_elements() {
    assert_eq!(minify("<p><b>a</b> <i>b</i></p>"), "<p><b>a</b> <i>b</i></p>");
    assert_eq!(minify("<div></div>\n  <div></div>"), "<div></div><div></div>");
  }

  #[test]
  fn quoted_gt_does_not_end_tag() {
    let html = r#"<div title="a > b">x</div>"#;
    assert_eq!(minify(html), html);
  }

  #[test]
  fn lone_lt_is_text() {
    assert_eq!(minify("<p>1 < 2</p>"), "<p>1 < 2</p>");
  }

  #[test]
  fn prettify_indents() {
    let out = prettify("<html><head><title>T</title></head><body><div><p>Hi</p><br></div></body></html>");
    assert_eq!(
      out,
      "<html>\n  <head>\n    <title>T</title>\n  </head>\n  <body>\n    <div>\n      <p>Hi</p>\n      <br>\n    </div>\n  </body>\n</html>\n"
    );
  }

  #[test]
  fn minify_keeps_text_around_comments() {
    assert_eq!(minify("<p>Hello <!-- -->World</p>"), "<p>Hello <!-- -->World</p>");
    assert_eq!(minify("<p>x  <!-- c -->  y</p>"), "<p>x <!-- c --> y</p>");
    assert_eq!(minify("<div></div> <!-- c --> <div></div>"), "<div></div><!-- c --><div></div>");
  }

  #[test]
  fn prettify_adds_no_whitespace_inside_inline_runs() {
    assert_eq!(prettify("<p><b>big</b>world</p>"), "<p><b>big</b>world</p>\n");
    assert_eq!(
      prettify("<div><span>a</span><!-- -->b<p>c</p></div>"),
      "<div>\n  <span>a</span><!-- -->b\n  <p>c</p>\n</div>\n"
    );
  }

  #[test]
  fn prettify_keeps_scripts_verbatim() {
    let out = prettify(r#"<body><script type="module">const a = 1;  </script></body>"#);
    assert!(out.contains(r#"  <script type="module">const a = 1;  </script>"#));
  }
}
