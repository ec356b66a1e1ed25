//! Conversion requests and input resolution.
//!
//! A [`ConversionInput`] carries exactly one source: an in-memory buffer or a
//! [`ContentRef`] (local path or URL). Buffers go to the engine on stdin.
//! References are first copied into a scratch file, which is both how their
//! size is measured and the path handed to the engine. The copy is a
//! [`NamedTempFile`], so it is removed when the resolved input is dropped,
//! on success and failure alike.

use crate::config::ConversionConfig;
use crate::error::ConversionError;
use crate::format::InputFormat;
use crate::pipeline::detect;
use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<>"{}|\\^`\[\]]+"#).unwrap());

const USER_AGENT: &str = concat!("docshift/", env!("CARGO_PKG_VERSION"));

/// Where a referenced document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentRef {
    Path(PathBuf),
    Url(String),
}

impl ContentRef {
    /// Last path segment, used as a file-name hint for detection.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            ContentRef::Path(p) => p.file_name().and_then(|n| n.to_str()),
            ContentRef::Url(u) => {
                let path = u.split(['?', '#']).next().unwrap_or(u);
                path.rsplit('/').next().filter(|s| !s.is_empty() && !s.contains(':'))
            }
        }
    }
}

/// The payload of a conversion request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Bytes(Vec<u8>),
    Reference(ContentRef),
}

/// One conversion request: a source plus its declared or detected format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionInput {
    source: InputSource,
    format: InputFormat,
}

impl ConversionInput {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, format: InputFormat) -> Self {
        Self {
            source: InputSource::Bytes(bytes.into()),
            format,
        }
    }

    pub fn from_path(path: impl Into<PathBuf>, format: InputFormat) -> Self {
        Self {
            source: InputSource::Reference(ContentRef::Path(path.into())),
            format,
        }
    }

    pub fn from_url(url: impl Into<String>, format: InputFormat) -> Self {
        Self {
            source: InputSource::Reference(ContentRef::Url(url.into())),
            format,
        }
    }

    /// Build from optional parts, as received from an external caller.
    ///
    /// Exactly one of `bytes` and `reference` must be present.
    pub fn try_from_parts(
        bytes: Option<Vec<u8>>,
        reference: Option<ContentRef>,
        format: InputFormat,
    ) -> Result<Self, ConversionError> {
        let source = match (bytes, reference) {
            (Some(b), None) => InputSource::Bytes(b),
            (None, Some(r)) => InputSource::Reference(r),
            (Some(_), Some(_)) => {
                return Err(ConversionError::input(
                    "Conversion input must have either bytes or a reference, not both",
                ))
            }
            (None, None) => {
                return Err(ConversionError::input(
                    "Conversion input must have either bytes or a reference",
                ))
            }
        };
        Ok(Self { source, format })
    }

    /// Buffer input whose format is detected from the bytes and optional hints.
    pub fn detect_bytes(bytes: impl Into<Vec<u8>>, file_name: Option<&str>, mime_type: Option<&str>) -> Self {
        let bytes = bytes.into();
        let end = bytes.len().min(detect::SNIFF_PREFIX_BYTES);
        let format = detect::detect(mime_type, file_name, Some(&bytes[..end]));
        Self::from_bytes(bytes, format)
    }

    /// Path input whose format is detected from the name and first bytes.
    pub fn detect_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = detect::detect_path(&path, None);
        Self::from_path(path, format)
    }

    pub fn source(&self) -> &InputSource {
        &self.source
    }

    pub fn into_source(self) -> InputSource {
        self.source
    }

    pub fn format(&self) -> InputFormat {
        self.format
    }

    pub fn with_format(mut self, format: InputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.source {
            InputSource::Bytes(b) => Some(b),
            InputSource::Reference(_) => None,
        }
    }

    pub fn reference(&self) -> Option<&ContentRef> {
        match &self.source {
            InputSource::Reference(r) => Some(r),
            InputSource::Bytes(_) => None,
        }
    }

    /// Short description for logs.
    pub fn describe(&self) -> String {
        match &self.source {
            InputSource::Bytes(b) => format!("<{} bytes>", b.len()),
            InputSource::Reference(ContentRef::Path(p)) => p.display().to_string(),
            InputSource::Reference(ContentRef::Url(u)) => u.clone(),
        }
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

/// An input ready to hand to an engine.
#[derive(Debug)]
pub enum ResolvedInput {
    /// Written to the engine's stdin.
    Buffer(Vec<u8>),
    /// A private scratch copy, deleted on drop.
    File(NamedTempFile),
}

impl ResolvedInput {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedInput::Buffer(_) => None,
            ResolvedInput::File(f) => Some(f.path()),
        }
    }

    /// Put the content on disk, writing a buffer to a scratch file if needed.
    pub async fn into_file(self, config: &ConversionConfig) -> Result<NamedTempFile, ConversionError> {
        match self {
            ResolvedInput::File(f) => Ok(f),
            ResolvedInput::Buffer(bytes) => {
                let temp = scratch_file(config).await?;
                tokio::fs::write(temp.path(), &bytes)
                    .await
                    .map_err(|e| ConversionError::input(format!("Failed to stage input: {e}")))?;
                Ok(temp)
            }
        }
    }

    /// Load the content into memory.
    pub async fn into_bytes(self) -> Result<Vec<u8>, ConversionError> {
        match self {
            ResolvedInput::Buffer(b) => Ok(b),
            ResolvedInput::File(f) => tokio::fs::read(f.path())
                .await
                .map_err(|e| ConversionError::input(format!("Cannot read input copy: {e}"))),
        }
    }
}

/// Enforce the size limit and stage reference inputs in the scratch dir.
pub async fn resolve(source: InputSource, config: &ConversionConfig) -> Result<ResolvedInput, ConversionError> {
    let max = config.max_input_bytes;
    match source {
        InputSource::Bytes(bytes) => {
            check_size(bytes.len() as u64, max)?;
            Ok(ResolvedInput::Buffer(bytes))
        }
        InputSource::Reference(ContentRef::Path(path)) => {
            let meta = tokio::fs::metadata(&path)
                .await
                .map_err(|e| ConversionError::input(format!("Cannot read '{}': {e}", path.display())))?;
            check_size(meta.len(), max)?;

            let temp = scratch_file(config).await?;
            tokio::fs::copy(&path, temp.path()).await.map_err(|e| {
                ConversionError::input(format!("Failed to copy '{}' to scratch: {e}", path.display()))
            })?;
            check_staged_size(&temp, max).await?;
            debug!(src = %path.display(), copy = %temp.path().display(), "staged local input");
            Ok(ResolvedInput::File(temp))
        }
        InputSource::Reference(ContentRef::Url(url)) => {
            let fetched = fetch_url(&url, config).await?;
            let temp = scratch_file(config).await?;
            tokio::fs::write(temp.path(), &fetched.bytes)
                .await
                .map_err(|e| ConversionError::input(format!("Failed to stage download: {e}")))?;
            Ok(ResolvedInput::File(temp))
        }
    }
}

fn check_size(size: u64, max: u64) -> Result<(), ConversionError> {
    if size > max {
        return Err(ConversionError::FileTooLarge {
            size_bytes: size,
            max_bytes: max,
        });
    }
    Ok(())
}

// The source may have grown between the metadata check and the copy.
async fn check_staged_size(temp: &NamedTempFile, max: u64) -> Result<(), ConversionError> {
    let size = tokio::fs::metadata(temp.path())
        .await
        .map_err(|e| ConversionError::input(format!("Cannot stat input copy: {e}")))?
        .len();
    check_size(size, max)
}

async fn scratch_file(config: &ConversionConfig) -> Result<NamedTempFile, ConversionError> {
    tokio::fs::create_dir_all(&config.scratch_dir)
        .await
        .map_err(|e| ConversionError::input(format!("Cannot create scratch dir: {e}")))?;
    tempfile::Builder::new()
        .prefix("input_")
        .suffix(".tmp")
        .tempfile_in(&config.scratch_dir)
        .map_err(|e| ConversionError::input(format!("Cannot create scratch file: {e}")))
}

// ── URLs ─────────────────────────────────────────────────────────────────

/// Returns `true` if `text` contains an http(s) URL anywhere.
pub fn is_url(text: &str) -> bool {
    URL_PATTERN.is_match(text)
}

/// Returns `true` if all of `text` is a single http(s) URL.
pub fn is_bare_url(text: &str) -> bool {
    extract_url(text) == Some(text)
}

/// The first http(s) URL in free text, e.g. a shared message body.
pub fn extract_url(text: &str) -> Option<&str> {
    URL_PATTERN.find(text).map(|m| m.as_str())
}

/// A downloaded document.
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub bytes: Vec<u8>,
    /// `Content-Type` without parameters, lowercased.
    pub content_type: Option<String>,
    pub url: String,
}

impl FetchedContent {
    /// Turn the download into a buffer input, detecting its format from the
    /// content type, the URL's last segment and the bytes.
    pub fn into_input(self) -> ConversionInput {
        let name = ContentRef::Url(self.url.clone()).file_name().map(str::to_string);
        ConversionInput::detect_bytes(self.bytes, name.as_deref(), self.content_type.as_deref())
    }
}

/// Download `url`, aborting once more than `max_input_bytes` have arrived.
pub async fn fetch_url(url: &str, config: &ConversionConfig) -> Result<FetchedContent, ConversionError> {
    let max = config.max_input_bytes;
    let secs = config.download_timeout_secs;
    info!("Downloading {}", url);

    let fail = |reason: String| ConversionError::input(format!("Failed to download '{url}': {reason}"));
    let map_reqwest = |e: reqwest::Error| {
        if e.is_timeout() {
            ConversionError::input(format!("Download timed out after {secs}s for '{url}'"))
        } else {
            fail(e.to_string())
        }
    };

    let client = reqwest::Client::builder()
        .timeout(config.download_timeout())
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| fail(e.to_string()))?;

    let response = client.get(url).send().await.map_err(map_reqwest)?;
    if !response.status().is_success() {
        return Err(fail(format!("HTTP {}", response.status())));
    }

    if let Some(len) = response.content_length() {
        check_size(len, max)?;
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase());

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(map_reqwest)?;
        check_size((bytes.len() + chunk.len()) as u64, max)?;
        bytes.extend_from_slice(&chunk);
    }

    info!(bytes = bytes.len(), content_type = ?content_type, "Downloaded {}", url);
    Ok(FetchedContent {
        bytes,
        content_type,
        url: url.to_string(),
    })
}
