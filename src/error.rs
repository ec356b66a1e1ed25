//! Error type for the docshift library.
//!
//! [`ConversionError`] is the only failure that crosses the library boundary.
//! It is a closed sum of five kinds; every I/O, process-launch or rendering
//! failure inside the pipeline is normalised into one of them before it is
//! returned, so a `match` at the call site is always exhaustive.
//!
//! The engine's exit codes are mapped to readable labels by
//! [`describe_exit_code`]. The label is diagnostic metadata only; control flow
//! never branches on it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors returned by the docshift library.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ConversionError {
    // ── Engine errors ─────────────────────────────────────────────────────
    /// A subprocess exceeded its time budget and was killed.
    #[error("Conversion timed out\nThe engine was stopped; retrying may succeed.")]
    Timeout,

    /// An engine ran and reported failure, or produced no output.
    ///
    /// `exit_code` is `-1` when the process could not be launched or was
    /// killed by a signal.
    #[error("Engine failed ({}, exit code {exit_code}): {stderr}", describe_exit_code(*exit_code))]
    ProcessFailed { exit_code: i32, stderr: String },

    // ── Input errors ──────────────────────────────────────────────────────
    /// Input exceeded the configured size limit. Raised before any engine runs.
    #[error("Input is {size_bytes} bytes, over the {max_bytes} byte limit")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    /// The format was recognised but the active configuration cannot convert it.
    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },

    /// Reading the source failed, the request was malformed, or the input was
    /// rejected for a user-actionable reason (encrypted or image-only PDF).
    #[error("Input error: {message}")]
    InputError { message: String },
}

impl ConversionError {
    pub fn process_failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        ConversionError::ProcessFailed {
            exit_code,
            stderr: stderr.into(),
        }
    }

    pub fn input(message: impl Into<String>) -> Self {
        ConversionError::InputError {
            message: message.into(),
        }
    }

    pub fn unsupported(format: impl Into<String>) -> Self {
        ConversionError::UnsupportedFormat {
            format: format.into(),
        }
    }

    /// Best-effort exit-code label for [`ConversionError::ProcessFailed`],
    /// `None` for every other kind.
    pub fn label(&self) -> Option<&'static str> {
        match self {
            ConversionError::ProcessFailed { exit_code, .. } => Some(describe_exit_code(*exit_code)),
            _ => None,
        }
    }

    /// Whether the same request could succeed on a later attempt.
    ///
    /// Nothing inside the library retries; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ConversionError::Timeout)
    }

    /// Stable short name of the kind, used for JSON output and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::Timeout => "Timeout",
            ConversionError::ProcessFailed { .. } => "ProcessFailed",
            ConversionError::FileTooLarge { .. } => "FileTooLarge",
            ConversionError::UnsupportedFormat { .. } => "UnsupportedFormat",
            ConversionError::InputError { .. } => "InputError",
        }
    }
}

impl From<engine_locate::LocateError> for ConversionError {
    fn from(e: engine_locate::LocateError) -> Self {
        ConversionError::process_failed(-1, e.to_string())
    }
}

/// Human-readable category for a conversion-engine exit code.
pub fn describe_exit_code(code: i32) -> &'static str {
    match code {
        0 => "Success",
        1 => "PandocIOError",
        3 => "PandocFailOnWarningError",
        4 => "PandocAppError",
        5 => "PandocTemplateError",
        6 => "PandocOptionError",
        21 => "PandocUnknownReaderError",
        22 => "PandocUnknownWriterError",
        23 => "PandocUnsupportedExtensionError",
        24 => "PandocCiteprocError",
        25 => "PandocBibliographyError",
        31 => "PandocEpubSubdirectoryError",
        43 => "PandocPDFError",
        44 => "PandocXMLError",
        47 => "PandocPDFProgramNotFoundError",
        61 => "PandocHttpError",
        62 => "PandocShouldNeverHappenError",
        63 => "PandocSomeError",
        64 => "PandocParseError",
        65 => "PandocParsecError",
        66 => "PandocMakePDFError",
        67 => "PandocSyntaxMapError",
        83 => "PandocFilterError",
        84 => "PandocLuaError",
        91 => "PandocNoScriptingEngine",
        92 => "PandocMacroLoop",
        97 => "PandocCouldNotFindDataFileError",
        98 => "PandocCouldNotFindMetadataFileError",
        99 => "PandocResourceNotFound",
        _ => "Unknown Pandoc error",
    }
}
