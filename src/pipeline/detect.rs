//! Format detection from MIME type, file name and content.
//!
//! Signals are consulted in a fixed order and the first one that resolves
//! wins:
//!
//! 1. MIME type, matched exactly against the format catalog
//! 2. File-name extension (case-insensitive, text after the last `.`)
//! 3. Content sniffing: binary magic, then ZIP containers, then text markers
//! 4. [`InputFormat::Plain`]
//!
//! Sniffing runs most-specific first. A ZIP archive is never handed to the
//! text heuristics, even when its entries cannot be classified.

use crate::format::InputFormat;
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::debug;

/// How much of a source is read for sniffing.
pub const SNIFF_PREFIX_BYTES: usize = 8192;

/// How much of the prefix the text heuristics look at.
pub const TEXT_HEURISTIC_BYTES: usize = 1000;

static ORG_HEADLINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\*+\s").unwrap());
static ORG_KEYWORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#\+[A-Z]+:").unwrap());
static ORG_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\[.+\]\]").unwrap());
static MD_HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s").unwrap());
static MD_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[.+\]\(.+\)").unwrap());

/// Resolve an input format from whatever evidence is available.
///
/// Never fails: with no usable signal the result is [`InputFormat::Plain`].
pub fn detect(mime_type: Option<&str>, file_name: Option<&str>, content: Option<&[u8]>) -> InputFormat {
    if let Some(format) = mime_type.and_then(InputFormat::from_mime_type) {
        debug!(%format, mime = mime_type, "format from MIME type");
        return format;
    }

    if let Some(format) = file_name.and_then(detect_from_extension) {
        debug!(%format, file_name, "format from extension");
        return format;
    }

    if let Some(format) = content.and_then(sniff_content) {
        debug!(%format, "format from content");
        return format;
    }

    debug!("no format signal, defaulting to plain");
    InputFormat::Plain
}

/// Detect the format of a file on disk, reading at most
/// [`SNIFF_PREFIX_BYTES`] for sniffing. An unreadable file just means the
/// content signal is absent.
pub fn detect_path(path: &Path, mime_type: Option<&str>) -> InputFormat {
    let prefix = read_prefix(path).ok();
    let name = path.file_name().and_then(|n| n.to_str());
    detect(mime_type, name, prefix.as_deref())
}

/// Read up to [`SNIFF_PREFIX_BYTES`] from the start of `path`.
pub fn read_prefix(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::with_capacity(SNIFF_PREFIX_BYTES);
    file.take(SNIFF_PREFIX_BYTES as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Look up a file name's extension.
///
/// Only the formats below are recognised by extension; notably `.pdf` is not,
/// so PDF inputs are identified by MIME type or by their `%PDF` magic.
pub fn detect_from_extension(file_name: &str) -> Option<InputFormat> {
    let (_, ext) = file_name.rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "txt" => Some(InputFormat::Plain),
        "md" | "markdown" => Some(InputFormat::Markdown),
        "org" => Some(InputFormat::Org),
        "html" | "htm" => Some(InputFormat::Html),
        "docx" => Some(InputFormat::Docx),
        "odt" => Some(InputFormat::Odt),
        "epub" => Some(InputFormat::Epub),
        "tex" => Some(InputFormat::Latex),
        _ => None,
    }
}

/// Infer a format from raw bytes. `None` means unresolved.
pub fn sniff_content(content: &[u8]) -> Option<InputFormat> {
    if content.is_empty() {
        return None;
    }

    if content.starts_with(b"%PDF") {
        return Some(InputFormat::Pdf);
    }
    if is_image(content) {
        return Some(InputFormat::Image);
    }

    if content.len() >= 4 && content.starts_with(b"PK") {
        return sniff_zip(content);
    }

    let end = content.len().min(TEXT_HEURISTIC_BYTES);
    let text = String::from_utf8_lossy(&content[..end]);
    sniff_text(&text)
}

fn is_image(content: &[u8]) -> bool {
    use image::ImageFormat;
    matches!(
        image::guess_format(content),
        Ok(ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Gif | ImageFormat::WebP | ImageFormat::Bmp)
    )
}

fn sniff_text(text: &str) -> Option<InputFormat> {
    let lower = text.to_ascii_lowercase();
    if lower.contains("<!doctype html") || lower.contains("<html") {
        return Some(InputFormat::Html);
    }

    if text.contains(r"\documentclass") || text.contains(r"\begin{document}") {
        return Some(InputFormat::Latex);
    }

    if ORG_HEADLINE.is_match(text) || ORG_KEYWORD.is_match(text) || ORG_LINK.is_match(text) {
        return Some(InputFormat::Org);
    }

    if MD_HEADING.is_match(text) || MD_LINK.is_match(text) || text.contains("```") {
        return Some(InputFormat::Markdown);
    }

    None
}

/// Classify a ZIP container by its entry names.
fn sniff_zip(content: &[u8]) -> Option<InputFormat> {
    let names = zip_entry_names(content);
    if names.iter().any(|n| n.starts_with("word/") && n.ends_with(".xml")) {
        Some(InputFormat::Docx)
    } else if names.iter().any(|n| n == "META-INF/container.xml") {
        Some(InputFormat::Epub)
    } else if names.iter().any(|n| n == "content.xml") {
        Some(InputFormat::Odt)
    } else {
        None
    }
}

/// List entry names without decompressing anything we keep.
///
/// A complete archive is read through its central directory. A prefix (the
/// usual case, since only the first 8 KB are sniffed) has no central
/// directory, so local file headers are walked instead until the data runs
/// out. Whatever was listed before an error still counts.
fn zip_entry_names(content: &[u8]) -> Vec<String> {
    if let Ok(archive) = zip::ZipArchive::new(Cursor::new(content)) {
        return archive.file_names().map(str::to_string).collect();
    }

    let mut names = Vec::new();
    let mut cursor = Cursor::new(content);
    loop {
        match zip::read::read_zipfile_from_stream(&mut cursor) {
            Ok(Some(mut entry)) => {
                names.push(entry.name().to_string());
                if std::io::copy(&mut entry, &mut std::io::sink()).is_err() {
                    break;
                }
            }
            Ok(None) => return names,
            Err(_) => break,
        }
    }

    // The stream reader stops at entries whose sizes live in a trailing data
    // descriptor. The headers themselves still carry every name.
    let walked = local_header_names(content);
    if walked.len() > names.len() {
        walked
    } else {
        names
    }
}

const LOCAL_HEADER_SIG: &[u8; 4] = b"PK\x03\x04";
const LOCAL_HEADER_LEN: usize = 30;
const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;

/// Walk local file headers directly, stopping at the first incomplete one.
///
/// Entries flagged with a data descriptor (general-purpose bit 3) record no
/// size up front, so the next header is found by scanning for its signature.
fn local_header_names(content: &[u8]) -> Vec<String> {
    let mut names = Vec::new();
    let mut pos = 0;

    while let Some(header) = content.get(pos..pos + LOCAL_HEADER_LEN) {
        if &header[..4] != LOCAL_HEADER_SIG {
            break;
        }
        let flags = u16::from_le_bytes([header[6], header[7]]);
        let compressed = u32::from_le_bytes([header[18], header[19], header[20], header[21]]);
        let name_len = u16::from_le_bytes([header[26], header[27]]) as usize;
        let extra_len = u16::from_le_bytes([header[28], header[29]]) as usize;

        let name_start = pos + LOCAL_HEADER_LEN;
        let Some(name) = content.get(name_start..name_start + name_len) else {
            break;
        };
        names.push(String::from_utf8_lossy(name).into_owned());

        let data_start = name_start + name_len + extra_len;
        pos = if flags & FLAG_DATA_DESCRIPTOR != 0 || compressed == u32::MAX {
            match find_local_header(content, data_start) {
                Some(next) => next,
                None => break,
            }
        } else {
            data_start + compressed as usize
        };
    }
    names
}

fn find_local_header(content: &[u8], from: usize) -> Option<usize> {
    content
        .get(from..)?
        .windows(LOCAL_HEADER_SIG.len())
        .position(|w| w == LOCAL_HEADER_SIG)
        .map(|offset| from + offset)
}
