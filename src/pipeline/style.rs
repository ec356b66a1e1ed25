//! Styling for PDF output: CSS injection and the built-in templates.
//!
//! The engine's HTML carries no styling of its own. A template, or any CSS
//! the caller supplies, is injected as a single `<style>` block before the
//! document is rendered.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Clean template: sans-serif, generous whitespace, light tables.
pub const CLEAN_CSS: &str = r#"body {
  font-family: -apple-system, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
  font-size: 11pt;
  line-height: 1.6;
  color: #222;
  max-width: 42em;
  margin: 2em auto;
  padding: 0 1.5em;
}
h1, h2, h3, h4 { line-height: 1.25; margin-top: 1.6em; }
h1 { font-size: 1.9em; border-bottom: 1px solid #ddd; padding-bottom: 0.2em; }
h2 { font-size: 1.45em; }
a { color: #0b5cad; text-decoration: none; }
code, pre { font-family: "SFMono-Regular", Menlo, Consolas, monospace; font-size: 0.9em; }
pre { background: #f6f8fa; padding: 0.8em 1em; border-radius: 4px; overflow-x: auto; }
blockquote { margin: 1em 0; padding-left: 1em; border-left: 3px solid #ccc; color: #555; }
table { border-collapse: collapse; margin: 1em 0; }
th, td { border: 1px solid #ddd; padding: 0.35em 0.7em; }
th { background: #f3f3f3; }
img { max-width: 100%; }"#;

/// Academic template: serif body, numbered-paper look, compact tables.
pub const ACADEMIC_CSS: &str = r#"body {
  font-family: "Latin Modern Roman", "Computer Modern", Georgia, "Times New Roman", serif;
  font-size: 12pt;
  line-height: 1.5;
  color: #000;
  max-width: 38em;
  margin: 2.5em auto;
  padding: 0 1em;
  text-align: justify;
  hyphens: auto;
}
h1 { font-size: 1.6em; text-align: center; margin-bottom: 0.2em; }
h2 { font-size: 1.25em; margin-top: 1.8em; }
h3 { font-size: 1.1em; font-style: italic; }
p { text-indent: 1.5em; margin: 0; }
h1 + p, h2 + p, h3 + p { text-indent: 0; }
blockquote { margin: 1em 2em; font-size: 0.95em; }
code, pre { font-family: "Latin Modern Mono", "Courier New", monospace; font-size: 0.9em; }
pre { margin: 1em 0; padding: 0.5em; border: 1px solid #999; }
table { border-collapse: collapse; margin: 1em auto; border-top: 2px solid #000; border-bottom: 2px solid #000; }
th { border-bottom: 1px solid #000; }
th, td { padding: 0.25em 0.8em; }
figure, img { display: block; margin: 1em auto; max-width: 100%; }
.footnotes { font-size: 0.85em; border-top: 1px solid #000; margin-top: 2em; }"#;

/// A built-in visual template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Template {
    /// No styling; the engine's HTML is rendered as-is. (default)
    #[default]
    Default,
    Clean,
    Academic,
}

impl Template {
    /// All built-in templates in display order.
    pub const ALL: [Template; 3] = [Template::Default, Template::Clean, Template::Academic];

    /// Stable identifier used for persistence and on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Template::Default => "default",
            Template::Clean => "clean",
            Template::Academic => "academic",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Template::Default => "Default",
            Template::Clean => "Clean",
            Template::Academic => "Academic",
        }
    }

    pub fn css(self) -> Option<&'static str> {
        match self {
            Template::Default => None,
            Template::Clean => Some(CLEAN_CSS),
            Template::Academic => Some(ACADEMIC_CSS),
        }
    }

    /// Look up by id. Unknown ids fall back to [`Template::Default`].
    pub fn from_id(id: &str) -> Template {
        Self::ALL
            .into_iter()
            .find(|t| t.id() == id)
            .unwrap_or_default()
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Insert `css` as one `<style>` block.
///
/// Goes immediately before the first closing head tag (matched
/// case-insensitively); without one, the block is prepended and the original
/// HTML follows byte-for-byte.
pub fn inject_css(html: &str, css: &str) -> String {
    let style = format!("<style>\n{css}\n</style>");
    match find_ascii_case_insensitive(html, "</head>") {
        Some(at) => {
            let mut out = String::with_capacity(html.len() + style.len() + 1);
            out.push_str(&html[..at]);
            out.push_str(&style);
            out.push('\n');
            out.push_str(&html[at..]);
            out
        }
        None => format!("{style}\n{html}"),
    }
}

// Byte offsets from the ASCII-lowercased copy are valid in `haystack`:
// ASCII lowercasing never changes byte lengths.
fn find_ascii_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    haystack.to_ascii_lowercase().find(needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserts_before_closing_head() {
        let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
        let out = inject_css(html, "body { color: red; }");
        assert!(out.contains("<style>\nbody { color: red; }\n</style>\n</head>"));
        assert!(out.contains("<title>Test</title>"));
        assert!(out.contains("<body><p>Hello</p></body>"));
    }

    #[test]
    fn uppercase_head_is_matched_and_preserved() {
        let html = "<html><HEAD></HEAD><body></body></html>";
        let out = inject_css(html, "p { margin: 0; }");
        assert_eq!(out, "<html><HEAD><style>\np { margin: 0; }\n</style>\n</HEAD><body></body></html>");
    }

    #[test]
    fn only_first_head_gets_the_block() {
        let html = "<head></head><iframe><head></head></iframe>";
        let out = inject_css(html, "x");
        assert_eq!(out.matches("<style>").count(), 1);
        assert!(out.starts_with("<head><style>"));
    }

    #[test]
    fn fragment_gets_prepended_block() {
        let html = "<p>No head tag here</p>";
        let out = inject_css(html, "p { font-size: 14px; }");
        assert_eq!(out, "<style>\np { font-size: 14px; }\n</style>\n<p>No head tag here</p>");
    }

    #[test]
    fn non_ascii_before_head_keeps_offsets() {
        let html = "<html><head><title>Ünïcødé ✓</title></head><body>é</body></html>";
        let out = inject_css(html, "a{}");
        assert!(out.contains("<title>Ünïcødé ✓</title><style>\na{}\n</style>\n</head>"));
    }

    #[test]
    fn template_lookup() {
        assert_eq!(Template::from_id("clean"), Template::Clean);
        assert_eq!(Template::from_id("academic"), Template::Academic);
        assert_eq!(Template::from_id("fancy"), Template::Default);
        assert!(Template::Default.css().is_none());
        assert!(Template::Academic.css().unwrap().contains("serif"));
    }
}
