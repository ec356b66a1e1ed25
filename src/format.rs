//! Format catalog: every input and output format docshift understands.
//!
//! Pure lookup tables. The reader/writer flags are the identifiers passed to
//! the conversion engine's `-f` / `-t` options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A format a document can be read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Plain,
    Markdown,
    Org,
    Html,
    Docx,
    Odt,
    Epub,
    Latex,
    /// Converted to HTML by pdftohtml before reaching the engine.
    Pdf,
    /// Raster image; only convertible to PDF.
    Image,
}

impl InputFormat {
    pub const ALL: [InputFormat; 10] = [
        InputFormat::Plain,
        InputFormat::Markdown,
        InputFormat::Org,
        InputFormat::Html,
        InputFormat::Docx,
        InputFormat::Odt,
        InputFormat::Epub,
        InputFormat::Latex,
        InputFormat::Pdf,
        InputFormat::Image,
    ];

    /// The engine's `-f` value, or `None` when the engine cannot read this
    /// format directly.
    ///
    /// Plain text is read as Markdown, which is a superset for practical
    /// purposes. PDF reaches the engine as HTML.
    pub fn reader_flag(self) -> Option<&'static str> {
        match self {
            InputFormat::Plain | InputFormat::Markdown => Some("markdown"),
            InputFormat::Org => Some("org"),
            InputFormat::Html | InputFormat::Pdf => Some("html"),
            InputFormat::Docx => Some("docx"),
            InputFormat::Odt => Some("odt"),
            InputFormat::Epub => Some("epub"),
            InputFormat::Latex => Some("latex"),
            InputFormat::Image => None,
        }
    }

    /// MIME types recognised for this format.
    ///
    /// Plain has none on purpose: `text/plain` is too often a lie, so plain
    /// text is only ever reached through the extension or the default.
    pub fn mime_types(self) -> &'static [&'static str] {
        match self {
            InputFormat::Plain => &[],
            InputFormat::Markdown => &["text/markdown", "text/x-markdown"],
            InputFormat::Org => &["text/org", "text/x-org"],
            InputFormat::Html => &["text/html"],
            InputFormat::Docx => {
                &["application/vnd.openxmlformats-officedocument.wordprocessingml.document"]
            }
            InputFormat::Odt => &["application/vnd.oasis.opendocument.text"],
            InputFormat::Epub => &["application/epub+zip"],
            InputFormat::Latex => &["application/x-latex", "application/x-tex"],
            InputFormat::Pdf => &["application/pdf"],
            InputFormat::Image => &[
                "image/png",
                "image/jpeg",
                "image/gif",
                "image/webp",
                "image/bmp",
            ],
        }
    }

    /// First format whose MIME set contains `mime` exactly.
    pub fn from_mime_type(mime: &str) -> Option<InputFormat> {
        Self::ALL
            .into_iter()
            .find(|f| f.mime_types().contains(&mime))
    }

    /// Short lowercase name, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            InputFormat::Plain => "plain",
            InputFormat::Markdown => "markdown",
            InputFormat::Org => "org",
            InputFormat::Html => "html",
            InputFormat::Docx => "docx",
            InputFormat::Odt => "odt",
            InputFormat::Epub => "epub",
            InputFormat::Latex => "latex",
            InputFormat::Pdf => "pdf",
            InputFormat::Image => "image",
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for InputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "txt" | "text" => return Ok(InputFormat::Plain),
            "md" => return Ok(InputFormat::Markdown),
            "htm" => return Ok(InputFormat::Html),
            "tex" => return Ok(InputFormat::Latex),
            _ => {}
        }
        Self::ALL
            .into_iter()
            .find(|f| f.name() == lower)
            .ok_or_else(|| format!("unknown input format '{s}'"))
    }
}

/// A format a document can be converted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    Docx,
    Html,
    Markdown,
    Plain,
    Latex,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 6] = [
        OutputFormat::Pdf,
        OutputFormat::Docx,
        OutputFormat::Html,
        OutputFormat::Markdown,
        OutputFormat::Plain,
        OutputFormat::Latex,
    ];

    /// The engine's `-t` value. PDF is produced from the engine's HTML.
    pub fn writer_flag(self) -> &'static str {
        match self {
            OutputFormat::Pdf | OutputFormat::Html => "html",
            OutputFormat::Docx => "docx",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Plain => "plain",
            OutputFormat::Latex => "latex",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
            OutputFormat::Plain => "txt",
            OutputFormat::Latex => "tex",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputFormat::Html => "text/html",
            OutputFormat::Markdown => "text/markdown",
            OutputFormat::Plain => "text/plain",
            OutputFormat::Latex => "application/x-latex",
        }
    }

    /// Whether the produced file is human-readable text.
    pub fn is_text_based(self) -> bool {
        matches!(
            self,
            OutputFormat::Html | OutputFormat::Markdown | OutputFormat::Plain | OutputFormat::Latex
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Docx => "docx",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Plain => "plain",
            OutputFormat::Latex => "latex",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.name() == lower || f.extension() == lower)
            .ok_or_else(|| format!("unknown output format '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_lookup_hits_first_owner() {
        assert_eq!(InputFormat::from_mime_type("text/html"), Some(InputFormat::Html));
        assert_eq!(
            InputFormat::from_mime_type("text/x-markdown"),
            Some(InputFormat::Markdown)
        );
        assert_eq!(InputFormat::from_mime_type("image/webp"), Some(InputFormat::Image));
        assert_eq!(InputFormat::from_mime_type("application/pdf"), Some(InputFormat::Pdf));
    }

    #[test]
    fn plain_has_no_mime() {
        assert!(InputFormat::Plain.mime_types().is_empty());
        assert_eq!(InputFormat::from_mime_type("text/plain"), None);
    }

    #[test]
    fn reader_flags() {
        assert_eq!(InputFormat::Plain.reader_flag(), Some("markdown"));
        assert_eq!(InputFormat::Pdf.reader_flag(), Some("html"));
        assert_eq!(InputFormat::Image.reader_flag(), None);
    }

    #[test]
    fn output_attributes() {
        assert_eq!(OutputFormat::Pdf.writer_flag(), "html");
        assert_eq!(OutputFormat::Markdown.extension(), "md");
        assert_eq!(OutputFormat::Plain.mime_type(), "text/plain");
        assert!(!OutputFormat::Pdf.is_text_based());
        assert!(!OutputFormat::Docx.is_text_based());
        assert!(OutputFormat::Latex.is_text_based());
    }

    #[test]
    fn parse_names_and_aliases() {
        assert_eq!("MD".parse::<InputFormat>().unwrap(), InputFormat::Markdown);
        assert_eq!("docx".parse::<InputFormat>().unwrap(), InputFormat::Docx);
        assert_eq!("txt".parse::<OutputFormat>().unwrap(), OutputFormat::Plain);
        assert_eq!("tex".parse::<OutputFormat>().unwrap(), OutputFormat::Latex);
        assert!("rtf".parse::<OutputFormat>().is_err());
    }
}
